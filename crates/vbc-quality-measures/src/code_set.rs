//! Named, versioned sets of clinical codes
//!
//! Membership is a pure function of the code string. Matching is exact and
//! case-sensitive; `E11.9` and `E119` are different codes. Prefix families
//! must be declared per entry and are never inferred from exact entries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pinned reference to one version of a code set
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CodeSetRef {
    pub name: String,
    pub version: String,
}

impl CodeSetRef {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for CodeSetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// One entry of a code set
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "match", rename_all = "snake_case")]
pub enum CodeEntry {
    /// Matches exactly this code
    Exact { code: String },
    /// Matches every code beginning with `prefix`
    Prefix { prefix: String },
}

impl CodeEntry {
    pub fn matches(&self, code: &str) -> bool {
        match self {
            CodeEntry::Exact { code: expected } => code == expected,
            CodeEntry::Prefix { prefix } => code.starts_with(prefix.as_str()),
        }
    }

    fn pattern(&self) -> &str {
        match self {
            CodeEntry::Exact { code } => code,
            CodeEntry::Prefix { prefix } => prefix,
        }
    }
}

/// A named, versioned collection of codes
///
/// Entries are ordered: the index of the first matching entry is the code's
/// priority (0 is highest) and breaks ties between equally recent evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSet {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Vocabulary the codes are drawn from (ICD-10-CM, LOINC, CPT, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub entries: Vec<CodeEntry>,
}

impl CodeSet {
    /// Create an empty code set
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            system: None,
            entries: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Append an exact-match entry
    pub fn exact(mut self, code: impl Into<String>) -> Self {
        self.entries.push(CodeEntry::Exact { code: code.into() });
        self
    }

    /// Append a prefix-family entry
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.entries.push(CodeEntry::Prefix {
            prefix: prefix.into(),
        });
        self
    }

    pub fn reference(&self) -> CodeSetRef {
        CodeSetRef::new(&self.name, &self.version)
    }

    /// Priority of the first entry matching `code`, `None` when not a member
    pub fn match_code(&self, code: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.matches(code))
    }

    pub fn contains(&self, code: &str) -> bool {
        self.match_code(code).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Structural problems: empty name or version, no entries, blank codes
    /// or prefixes, duplicate entries
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("code set name is empty".to_string());
        }
        if self.version.trim().is_empty() {
            problems.push("code set version is empty".to_string());
        }
        if self.entries.is_empty() {
            problems.push("code set has no entries".to_string());
        }
        for (idx, entry) in self.entries.iter().enumerate() {
            if entry.pattern().trim().is_empty() {
                problems.push(format!("entry {} is blank", idx));
            }
            if self.entries[..idx].contains(entry) {
                problems.push(format!("entry {} duplicates '{}'", idx, entry.pattern()));
            }
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn diabetes() -> CodeSet {
        CodeSet::new("diabetes", "2025")
            .prefix("E10")
            .prefix("E11")
            .exact("R73.03")
    }

    #[rstest]
    #[case("E11.9", Some(1))]
    #[case("E10", Some(0))]
    #[case("R73.03", Some(2))]
    #[case("R73.0", None)]
    #[case("e11.9", None)]
    #[case("I10", None)]
    fn test_match_code(#[case] code: &str, #[case] expected: Option<usize>) {
        assert_eq!(diabetes().match_code(code), expected);
    }

    #[test]
    fn test_exact_entries_do_not_match_prefixes() {
        let set = CodeSet::new("mammography", "2025").exact("77067");
        assert!(set.contains("77067"));
        assert!(!set.contains("770671"));
    }

    #[test]
    fn test_first_matching_entry_wins() {
        let set = CodeSet::new("overlap", "1").prefix("E1").exact("E11.9");
        assert_eq!(set.match_code("E11.9"), Some(0));
    }

    #[test]
    fn test_problems() {
        assert!(diabetes().problems().is_empty());

        let bad = CodeSet::new("", "1").exact("A").exact("A").prefix(" ");
        let problems = bad.problems();
        assert_eq!(problems.len(), 3);
    }

    #[test]
    fn test_serde_shape() {
        let set: CodeSet = serde_json::from_str(
            r#"{"name":"a1c","version":"2025","entries":[{"match":"exact","code":"4548-4"}]}"#,
        )
        .unwrap();
        assert_eq!(set.reference().to_string(), "a1c@2025");
        assert!(set.contains("4548-4"));
    }
}
