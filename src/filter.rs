// Copyright (c) The casecore Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User-supplied test filters.
//!
//! A filter string is one of `dir/` (a prefix), `program` (a whole program), or `program:case` (a
//! single case). An empty [`FilterSet`] matches everything. Construction rejects any pair of
//! filters where one subsumes the other, since that's almost always a copy-paste mistake rather
//! than an intentional overlap.

use crate::errors::UsageError;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Clone, Debug, Eq, PartialEq)]
enum Spec {
    Prefix(Utf8PathBuf),
    Program(Utf8PathBuf),
    Case(Utf8PathBuf, String),
}

impl Spec {
    fn program_part(&self) -> &Utf8Path {
        match self {
            Self::Prefix(p) | Self::Program(p) | Self::Case(p, _) => p,
        }
    }

    fn parse(raw: &str) -> Result<Self, UsageError> {
        if raw.is_empty() {
            return Err(UsageError::new("empty test filter"));
        }
        if let Some(dir) = raw.strip_suffix('/') {
            if dir.is_empty() {
                return Err(UsageError::new("filter `/` has no directory component"));
            }
            return Ok(Self::Prefix(Utf8PathBuf::from(dir)));
        }
        match raw.split_once(':') {
            Some((program, case)) => {
                if program.is_empty() || case.is_empty() {
                    return Err(UsageError::new(format!("invalid test filter `{raw}`")));
                }
                Ok(Self::Case(Utf8PathBuf::from(program), case.to_owned()))
            }
            None => Ok(Self::Program(Utf8PathBuf::from(raw))),
        }
    }
}

impl std::fmt::Display for Spec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prefix(p) => write!(f, "{p}/"),
            Self::Program(p) => write!(f, "{p}"),
            Self::Case(p, c) => write!(f, "{p}:{c}"),
        }
    }
}

/// `ancestor` is a path-component prefix of (or equal to) `path`.
fn is_ancestor_or_equal(ancestor: &Utf8Path, path: &Utf8Path) -> bool {
    let mut a = ancestor.components();
    let mut p = path.components();
    loop {
        match (a.next(), p.next()) {
            (None, _) => return true,
            (Some(ac), Some(pc)) if ac == pc => continue,
            _ => return false,
        }
    }
}

/// True if everything `narrower` matches is also matched by `broader`, and they aren't the same
/// filter (the disjointness check treats an exact duplicate as a subsumption violation too).
fn subsumes(broader: &Spec, narrower: &Spec) -> bool {
    if broader == narrower {
        return true;
    }
    match broader {
        Spec::Prefix(bp) => is_ancestor_or_equal(bp, narrower.program_part()),
        Spec::Program(bp) => match narrower {
            Spec::Program(np) | Spec::Case(np, _) => bp == np,
            Spec::Prefix(_) => false,
        },
        Spec::Case(..) => false,
    }
}

/// A compact, disjoint set of user-supplied test filters.
///
/// Tracks which filters have matched at least once, so a front-end can report unused filters at
/// shutdown (an all-green run with an unused filter is still reported as a failure).
#[derive(Debug)]
pub struct FilterSet {
    specs: Vec<Spec>,
    used: Vec<AtomicBool>,
}

impl FilterSet {
    /// Parses `raw` filter strings. An empty iterator produces a set that matches everything.
    ///
    /// # Errors
    /// Fails if any filter string is malformed, or if any two filters are not disjoint (one
    /// subsumes the other).
    pub fn new<I, S>(raw: I) -> Result<Self, UsageError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let specs = raw
            .into_iter()
            .map(|s| Spec::parse(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        for i in 0..specs.len() {
            for j in 0..specs.len() {
                if i != j && subsumes(&specs[i], &specs[j]) {
                    return Err(UsageError::new(format!(
                        "test filters are not disjoint: `{}` subsumes `{}`",
                        specs[i], specs[j]
                    )));
                }
            }
        }

        let used = specs.iter().map(|_| AtomicBool::new(false)).collect();
        Ok(Self { specs, used })
    }

    /// True if this set matches every program and case (i.e. it was built from no filters).
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Whether `program` should be considered at all. Marks any matching filter as used.
    pub fn matches_program(&self, program: &Utf8Path) -> bool {
        if self.specs.is_empty() {
            return true;
        }
        let mut matched = false;
        for (spec, used) in self.specs.iter().zip(&self.used) {
            let hit = match spec {
                Spec::Prefix(p) => is_ancestor_or_equal(p, program),
                Spec::Program(p) => p == program,
                Spec::Case(p, _) => p == program,
            };
            if hit {
                used.store(true, Ordering::Relaxed);
                matched = true;
            }
        }
        matched
    }

    /// Whether `(program, case)` should run. Marks any matching filter as used.
    pub fn matches_case(&self, program: &Utf8Path, case: &str) -> bool {
        if self.specs.is_empty() {
            return true;
        }
        let mut matched = false;
        for (spec, used) in self.specs.iter().zip(&self.used) {
            let hit = match spec {
                Spec::Prefix(p) => is_ancestor_or_equal(p, program),
                Spec::Program(p) => p == program,
                Spec::Case(p, c) => p == program && c == case,
            };
            if hit {
                used.store(true, Ordering::Relaxed);
                matched = true;
            }
        }
        matched
    }

    /// Filter strings that never matched anything, in the order they were given.
    pub fn unused(&self) -> Vec<String> {
        self.specs
            .iter()
            .zip(&self.used)
            .filter(|(_, used)| !used.load(Ordering::Relaxed))
            .map(|(spec, _)| spec.to_string())
            .collect()
    }
}
