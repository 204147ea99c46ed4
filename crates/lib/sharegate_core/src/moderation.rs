//! Sensitive-content gate.
//!
//! Matching is case-insensitive substring search everywhere, for both the
//! in-memory word list and the dictionary table.

use aho_corasick::AhoCorasick;
use async_trait::async_trait;

use crate::directory::StoreError;

/// Yes/no sensitive-content check over free text.
#[async_trait]
pub trait ModerationGate: Send + Sync {
    async fn contains_sensitive_word(&self, text: &str) -> Result<bool, StoreError>;
}

/// Fixed word list compiled into one automaton.
pub struct WordListGate {
    matcher: Option<AhoCorasick>,
    words: usize,
}

impl WordListGate {
    pub fn new<I, S>(words: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        let count = patterns.len();
        let matcher = if patterns.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::new(&patterns)
                    .map_err(|e| StoreError::Internal(format!("word list: {e}")))?,
            )
        };
        Ok(Self {
            matcher,
            words: count,
        })
    }

    /// Gate that never matches.
    pub fn empty() -> Self {
        Self {
            matcher: None,
            words: 0,
        }
    }

    /// Build from a comma-separated list (e.g. the `SENSITIVE_WORDS` env var).
    pub fn from_csv(csv: &str) -> Result<Self, StoreError> {
        Self::new(csv.split(','))
    }

    pub fn len(&self) -> usize {
        self.words
    }

    pub fn is_empty(&self) -> bool {
        self.words == 0
    }

    pub fn matches(&self, text: &str) -> bool {
        match &self.matcher {
            Some(m) => m.is_match(&text.to_lowercase()),
            None => false,
        }
    }
}

#[async_trait]
impl ModerationGate for WordListGate {
    async fn contains_sensitive_word(&self, text: &str) -> Result<bool, StoreError> {
        Ok(self.matches(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_substrings_case_insensitively() {
        let gate = WordListGate::new(["Forbidden", "违禁"]).unwrap();
        assert!(gate.matches("this is FORBIDDEN text"));
        assert!(gate.matches("unforbiddenly"));
        assert!(gate.matches("含有违禁词"));
        assert!(!gate.matches("perfectly fine"));
    }

    #[test]
    fn blank_entries_are_ignored() {
        let gate = WordListGate::from_csv(" , spam ,,").unwrap();
        assert_eq!(gate.len(), 1);
        assert!(gate.matches("SPAM!"));
        assert!(!gate.matches("anything else"));
    }

    #[test]
    fn empty_gate_never_matches() {
        let gate = WordListGate::empty();
        assert!(gate.is_empty());
        assert!(!gate.matches(""));
        assert!(!gate.matches("anything"));
    }

    #[tokio::test]
    async fn trait_object_delegates() {
        let gate: Box<dyn ModerationGate> = Box::new(WordListGate::new(["bad"]).unwrap());
        assert!(gate.contains_sensitive_word("Bad idea").await.unwrap());
        assert!(!gate.contains_sensitive_word("good idea").await.unwrap());
    }
}
