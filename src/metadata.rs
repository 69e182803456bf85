// Copyright (c) The casecore Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-case requirements, parsed from the property lines an adapter's listing protocol hands us.
//!
//! A [`Metadata`] is immutable once built: [`Metadata::from_properties`] validates every
//! recognized key up front (unknown keys are rejected) and only ever returns a fully-formed
//! value.

use crate::errors::UsageError;
use bytesize::ByteSize;
use camino::Utf8PathBuf;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::time::Duration;

/// The `required_user` requirement.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RequiredUser {
    #[default]
    Any,
    Root,
    Unprivileged,
}

/// A validated, immutable property map for a single test case.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Metadata {
    description: String,
    has_cleanup: bool,
    timeout: Duration,
    allowed_architectures: BTreeSet<String>,
    allowed_platforms: BTreeSet<String>,
    required_configs: BTreeSet<String>,
    required_files: BTreeSet<Utf8PathBuf>,
    required_programs: BTreeSet<Utf8PathBuf>,
    required_memory: ByteSize,
    required_user: RequiredUser,
    custom: IndexMap<String, String>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            has_cleanup: false,
            timeout: Duration::from_secs(300),
            allowed_architectures: BTreeSet::new(),
            allowed_platforms: BTreeSet::new(),
            required_configs: BTreeSet::new(),
            required_files: BTreeSet::new(),
            required_programs: BTreeSet::new(),
            required_memory: ByteSize::b(0),
            required_user: RequiredUser::Any,
            custom: IndexMap::new(),
        }
    }
}

impl Metadata {
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn has_cleanup(&self) -> bool {
        self.has_cleanup
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn allowed_architectures(&self) -> &BTreeSet<String> {
        &self.allowed_architectures
    }

    pub fn allowed_platforms(&self) -> &BTreeSet<String> {
        &self.allowed_platforms
    }

    pub fn required_configs(&self) -> &BTreeSet<String> {
        &self.required_configs
    }

    pub fn required_files(&self) -> &BTreeSet<Utf8PathBuf> {
        &self.required_files
    }

    pub fn required_programs(&self) -> &BTreeSet<Utf8PathBuf> {
        &self.required_programs
    }

    pub fn required_memory(&self) -> ByteSize {
        self.required_memory
    }

    pub fn required_user(&self) -> RequiredUser {
        self.required_user
    }

    /// Custom `X-`-prefixed properties, in the order they were declared.
    pub fn custom(&self) -> &IndexMap<String, String> {
        &self.custom
    }

    /// Parses a property map as produced by an adapter's listing protocol (e.g. the `key: value`
    /// lines of an ATF entry) into a validated `Metadata`.
    ///
    /// Keys not in the table below, and not prefixed with `X-`, are a [`UsageError`].
    pub fn from_properties<'a>(
        props: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, UsageError> {
        let mut meta = Self::default();
        let mut seen = BTreeSet::new();

        for (key, value) in props {
            if !seen.insert(key.to_owned()) {
                return Err(UsageError::new(format!("duplicate metadata property `{key}`")));
            }

            match key {
                "description" => meta.description = value.to_owned(),
                "has_cleanup" => meta.has_cleanup = parse_bool(value)?,
                "timeout" => meta.timeout = parse_timeout(value)?,
                "allowed_architectures" => {
                    meta.allowed_architectures = parse_word_set(value)?;
                }
                "allowed_platforms" => meta.allowed_platforms = parse_word_set(value)?,
                "required_configs" => meta.required_configs = parse_word_set(value)?,
                "required_files" => {
                    meta.required_files = parse_path_set(value, "required_files")?;
                }
                "required_programs" => {
                    meta.required_programs = parse_path_set(value, "required_programs")?;
                }
                "required_memory" => {
                    meta.required_memory = value
                        .parse::<ByteSize>()
                        .map_err(|e| UsageError::new(format!("invalid required_memory `{value}`: {e}")))?;
                }
                "required_user" => meta.required_user = parse_required_user(value)?,
                other if other.starts_with("X-") => {
                    meta.custom.insert(other.to_owned(), value.to_owned());
                }
                other => return Err(UsageError::new(format!("unknown metadata property `{other}`"))),
            }
        }

        Ok(meta)
    }
}

fn parse_bool(value: &str) -> Result<bool, UsageError> {
    match value {
        "true" | "yes" => Ok(true),
        "false" | "no" => Ok(false),
        other => Err(UsageError::new(format!("invalid boolean `{other}`"))),
    }
}

fn parse_timeout(value: &str) -> Result<Duration, UsageError> {
    if !value.bytes().all(|b| b.is_ascii_digit()) || value.is_empty() {
        return Err(UsageError::new(format!("invalid timeout `{value}`: must be an unsigned integer")));
    }
    let secs: u64 = value
        .parse()
        .map_err(|_| UsageError::new(format!("timeout `{value}` out of range")))?;
    Ok(Duration::from_secs(secs))
}

fn parse_word_set(value: &str) -> Result<BTreeSet<String>, UsageError> {
    let words: BTreeSet<String> = value.split_whitespace().map(str::to_owned).collect();
    if value.trim().is_empty() {
        return Ok(BTreeSet::new());
    }
    if words.iter().any(String::is_empty) {
        return Err(UsageError::new(format!("invalid word list `{value}`")));
    }
    Ok(words)
}

fn parse_path_set(value: &str, key: &str) -> Result<BTreeSet<Utf8PathBuf>, UsageError> {
    let mut paths = BTreeSet::new();
    for word in value.split_whitespace() {
        let path = Utf8PathBuf::from(word);
        let is_single_component = path.components().count() == 1;
        if !path.is_absolute() && !is_single_component {
            return Err(UsageError::new(format!(
                "invalid {key} entry `{word}`: must be absolute or a single path component"
            )));
        }
        paths.insert(path);
    }
    Ok(paths)
}

fn parse_required_user(value: &str) -> Result<RequiredUser, UsageError> {
    match value {
        "" => Ok(RequiredUser::Any),
        "root" => Ok(RequiredUser::Root),
        "unprivileged" => Ok(RequiredUser::Unprivileged),
        other => Err(UsageError::new(format!("invalid required_user `{other}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn defaults_match_spec_table() {
        let meta = Metadata::from_properties([]).unwrap();
        assert_eq!(meta.description(), "");
        assert!(!meta.has_cleanup());
        assert_eq!(meta.timeout(), Duration::from_secs(300));
        assert_eq!(meta.required_user(), RequiredUser::Any);
        assert_eq!(meta.required_memory(), ByteSize::b(0));
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!(Metadata::from_properties([("bogus", "1")]).is_err());
    }

    #[test]
    fn duplicate_key_is_rejected() {
        assert!(Metadata::from_properties([("description", "a"), ("description", "b")]).is_err());
    }

    #[test]
    fn custom_keys_preserve_order() {
        let meta = Metadata::from_properties([("X-b", "2"), ("X-a", "1")]).unwrap();
        let keys: Vec<&str> = meta.custom().keys().map(String::as_str).collect();
        assert_eq!(keys, ["X-b", "X-a"]);
    }

    #[test_case("true", true)]
    #[test_case("yes", true)]
    #[test_case("false", false)]
    #[test_case("no", false)]
    fn has_cleanup_accepts_atf_booleans(value: &str, expected: bool) {
        let meta = Metadata::from_properties([("has_cleanup", value)]).unwrap();
        assert_eq!(meta.has_cleanup(), expected);
    }

    #[test]
    fn timeout_rejects_signed_values() {
        assert!(Metadata::from_properties([("timeout", "-5")]).is_err());
        assert!(Metadata::from_properties([("timeout", "+5")]).is_err());
    }

    #[test]
    fn required_files_accepts_absolute_or_bare_name() {
        let meta = Metadata::from_properties([("required_files", "/etc/passwd data.txt")]).unwrap();
        assert!(meta.required_files().contains(Utf8PathBuf::from("/etc/passwd").as_path()));
        assert!(meta.required_files().contains(Utf8PathBuf::from("data.txt").as_path()));
    }

    #[test]
    fn required_files_rejects_relative_multi_component() {
        assert!(Metadata::from_properties([("required_files", "dir/data.txt")]).is_err());
    }

    #[test]
    fn required_memory_parses_unit_suffixes() {
        let meta = Metadata::from_properties([("required_memory", "10K")]).unwrap();
        assert_eq!(meta.required_memory(), ByteSize::kb(10));
    }

    use test_strategy::proptest;

    #[proptest]
    fn allowed_architectures_round_trips_nonempty_words(
        #[strategy(proptest::collection::vec("[a-z]{1,8}", 1..5))] words: Vec<String>,
    ) {
        let value = words.join(" ");
        let meta = Metadata::from_properties([("allowed_architectures", value.as_str())]).unwrap();
        let expected: BTreeSet<String> = words.into_iter().collect();
        proptest::prop_assert_eq!(meta.allowed_architectures().clone(), expected);
    }
}
