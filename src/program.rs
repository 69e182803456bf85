// Copyright (c) The casecore Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identifies a test program and a single case within it.

use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;

/// Which test-interface protocol a test program speaks.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum InterfaceTag {
    Atf,
    GoogleTest,
}

/// A reference to a test program as produced by the (external) manifest loader.
///
/// `binary_path` must be relative and non-empty; the absolute path is derived by joining it onto
/// `root`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestProgramRef {
    binary_path: Utf8PathBuf,
    root: Utf8PathBuf,
    suite_name: String,
    interface: InterfaceTag,
}

impl TestProgramRef {
    /// # Panics
    /// Panics if `binary_path` is absolute or empty.
    pub fn new(
        root: impl Into<Utf8PathBuf>,
        binary_path: impl Into<Utf8PathBuf>,
        suite_name: impl Into<String>,
        interface: InterfaceTag,
    ) -> Self {
        let binary_path = binary_path.into();
        assert!(!binary_path.as_str().is_empty(), "binary_path must not be empty");
        assert!(binary_path.is_relative(), "binary_path must be relative, got {binary_path}");
        Self {
            binary_path,
            root: root.into(),
            suite_name: suite_name.into(),
            interface,
        }
    }

    pub fn binary_path(&self) -> &Utf8Path {
        &self.binary_path
    }

    pub fn absolute_path(&self) -> Utf8PathBuf {
        self.root.join(&self.binary_path)
    }

    pub fn suite_name(&self) -> &str {
        &self.suite_name
    }

    pub fn interface(&self) -> InterfaceTag {
        self.interface
    }
}

/// Identifies a single test case within a program.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TestCaseId {
    pub program: Utf8PathBuf,
    pub name: String,
}

impl TestCaseId {
    pub fn new(program: impl Into<Utf8PathBuf>, name: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TestCaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.program, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_path_joins_root_and_binary() {
        let prog = TestProgramRef::new("/srv/tests", "bin/checks", "suite", InterfaceTag::Atf);
        assert_eq!(prog.absolute_path(), Utf8Path::new("/srv/tests/bin/checks"));
    }

    #[test]
    #[should_panic]
    fn absolute_binary_path_panics() {
        TestProgramRef::new("/srv/tests", "/bin/checks", "suite", InterfaceTag::Atf);
    }

    #[test]
    fn case_id_ordering_is_lexicographic_on_tuple() {
        let a = TestCaseId::new("a", "z");
        let b = TestCaseId::new("b", "a");
        assert!(a < b);
    }

    #[test]
    fn case_id_display() {
        let id = TestCaseId::new("dir/prog", "case1");
        assert_eq!(id.to_string(), "dir/prog:case1");
    }
}
