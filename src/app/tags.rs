//! Operator-assigned tag lists.
//!
//! Tags are free-form labels ("peak", "critical") exposed to rules as an
//! array variable (`UTL` on the unit, `MTL` on modules), so a condition
//! like `MTL == ["critical"] || UTL == ["shed"]` can target groups.

use serde::{Deserialize, Serialize};

/// Ordered, duplicate-free list of tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagList(Vec<String>);

impl TagList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `tag` unless already present or blank.  Returns whether it was added.
    pub fn add(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.contains(tag) {
            return false;
        }
        self.0.push(tag.to_string());
        true
    }

    pub fn remove(&mut self, tag: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|t| t != tag);
        self.0.len() != before
    }

    /// Replace the whole list, dropping blanks and duplicates.
    pub fn replace<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.0.clear();
        for t in tags {
            self.add(t.as_ref());
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&TagList> for Vec<String> {
    fn from(tags: &TagList) -> Self {
        tags.0.clone()
    }
}
