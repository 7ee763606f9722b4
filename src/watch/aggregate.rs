use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::form::{FieldKey, FormResult, read_lock, write_lock};

/// Messages for the children of one repeated-group item.
pub type ItemErrors = BTreeMap<FieldKey, String>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ErrorEntry {
    Message(String),
    Items(Vec<ItemErrors>),
}

impl ErrorEntry {
    pub fn as_message(&self) -> Option<&str> {
        match self {
            ErrorEntry::Message(message) => Some(message),
            ErrorEntry::Items(_) => None,
        }
    }

    pub fn as_items(&self) -> Option<&[ItemErrors]> {
        match self {
            ErrorEntry::Items(items) => Some(items),
            ErrorEntry::Message(_) => None,
        }
    }
}

/// Caller-owned error messages, keyed by field.
///
/// Clones share the same storage, so the watch writes into the very map the
/// caller reads from. Entries are only ever replaced per field; the map itself
/// is never swapped out.
#[derive(Clone, Debug, Default)]
pub struct ErrorAggregate {
    entries: Arc<RwLock<BTreeMap<FieldKey, ErrorEntry>>>,
}

impl ErrorAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the message for a scalar field, returning what was there before.
    pub fn set(&self, key: FieldKey, message: impl Into<String>) -> FormResult<Option<ErrorEntry>> {
        let mut entries = write_lock(&self.entries, "writing field error")?;
        Ok(entries.insert(key, ErrorEntry::Message(message.into())))
    }

    /// Replaces the per-item messages of a repeated group.
    pub fn set_array(&self, key: FieldKey, items: Vec<ItemErrors>) -> FormResult<Option<ErrorEntry>> {
        let mut entries = write_lock(&self.entries, "writing group errors")?;
        Ok(entries.insert(key, ErrorEntry::Items(items)))
    }

    pub fn clear(&self, key: FieldKey) -> FormResult<Option<ErrorEntry>> {
        let mut entries = write_lock(&self.entries, "clearing field error")?;
        Ok(entries.remove(&key))
    }

    pub fn get(&self, key: FieldKey) -> FormResult<Option<ErrorEntry>> {
        Ok(read_lock(&self.entries, "reading field error")?
            .get(&key)
            .cloned())
    }

    pub fn message(&self, key: FieldKey) -> FormResult<Option<String>> {
        Ok(self
            .get(key)?
            .and_then(|entry| entry.as_message().map(str::to_string)))
    }

    pub fn items(&self, key: FieldKey) -> FormResult<Option<Vec<ItemErrors>>> {
        Ok(self.get(key)?.and_then(|entry| match entry {
            ErrorEntry::Items(items) => Some(items),
            ErrorEntry::Message(_) => None,
        }))
    }

    pub fn contains(&self, key: FieldKey) -> FormResult<bool> {
        Ok(read_lock(&self.entries, "checking field error")?.contains_key(&key))
    }

    pub fn len(&self) -> FormResult<usize> {
        Ok(read_lock(&self.entries, "counting field errors")?.len())
    }

    pub fn is_empty(&self) -> FormResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Point-in-time copy of every entry.
    pub fn snapshot(&self) -> FormResult<BTreeMap<FieldKey, ErrorEntry>> {
        Ok(read_lock(&self.entries, "copying field errors")?.clone())
    }
}
