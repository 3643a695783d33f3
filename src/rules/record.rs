//! Persisted and remotely-pushed rule/tag formats.
//!
//! Rules travel as `{priority, expression, command}` records: JSON for
//! remote updates, postcard blobs in NVS.  Tag lists are plain string
//! arrays.  Neither format is interpreted here beyond (de)serialisation;
//! records are replayed through [`RuleEngine::add_rule`](super::RuleEngine::add_rule).

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{StorageError, StoragePort};
use crate::error::{Error, Result};

/// Largest blob read back from storage.
const MAX_BLOB_SIZE: usize = 4000;

const RULES_KEY: &str = "rules";
const TAGS_KEY: &str = "tags";

/// Source form of one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub priority: i32,
    pub expression: String,
    pub command: String,
}

/// Whether an update discards the current rule set first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    #[default]
    Replace,
    Append,
}

/// A remote rule update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleUpdate {
    #[serde(default)]
    pub mode: UpdateMode,
    pub rules: Vec<RuleRecord>,
}

impl RuleUpdate {
    pub fn from_json(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(|e| {
            warn!("RuleUpdate: rejected payload: {}", e);
            Error::Decode("rule update")
        })
    }
}

/// Outcome of applying a [`RuleUpdate`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateReport {
    pub loaded: usize,
    /// Index into the update's rule list, with the reason it was skipped.
    pub rejected: Vec<(usize, Error)>,
}

impl UpdateReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Storage helpers
// ---------------------------------------------------------------------------

pub fn save_rules(
    storage: &mut dyn StoragePort,
    namespace: &str,
    rules: &[RuleRecord],
) -> Result<()> {
    save_blob(storage, namespace, RULES_KEY, &rules)?;
    info!("Rules: saved {} rule(s) to '{}'", rules.len(), namespace);
    Ok(())
}

/// Load stored rules; an absent key is an empty list.
pub fn load_rules(storage: &dyn StoragePort, namespace: &str) -> Result<Vec<RuleRecord>> {
    load_blob(storage, namespace, RULES_KEY, "stored rules")
}

pub fn save_tags(storage: &mut dyn StoragePort, namespace: &str, tags: &[String]) -> Result<()> {
    save_blob(storage, namespace, TAGS_KEY, &tags)
}

pub fn load_tags(storage: &dyn StoragePort, namespace: &str) -> Result<Vec<String>> {
    load_blob(storage, namespace, TAGS_KEY, "stored tags")
}

fn save_blob<T: Serialize + ?Sized>(
    storage: &mut dyn StoragePort,
    namespace: &str,
    key: &str,
    value: &T,
) -> Result<()> {
    let bytes = postcard::to_allocvec(value).map_err(|_| Error::Storage("encode failed"))?;
    if bytes.len() > MAX_BLOB_SIZE {
        return Err(StorageError::Full.into());
    }
    storage.write(namespace, key, &bytes)?;
    Ok(())
}

fn load_blob<T>(
    storage: &dyn StoragePort,
    namespace: &str,
    key: &str,
    what: &'static str,
) -> Result<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
{
    let mut buf = vec![0u8; MAX_BLOB_SIZE];
    match storage.read(namespace, key, &mut buf) {
        Ok(len) => postcard::from_bytes(&buf[..len]).map_err(|_| {
            warn!("Rules: corrupted blob '{}::{}'", namespace, key);
            Error::Decode(what)
        }),
        Err(StorageError::NotFound) => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}
