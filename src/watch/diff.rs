use std::collections::BTreeSet;

use crate::form::{FieldKey, FormSnapshot};

/// Top-level field names whose value differs between two snapshots.
///
/// Repeated groups are compared as a whole: a change in any item reports the
/// group name. Names present in only one snapshot are skipped with a warning.
pub fn diff(previous: &FormSnapshot, current: &FormSnapshot) -> BTreeSet<FieldKey> {
    let mut changed = BTreeSet::new();
    for (key, value) in previous.iter() {
        match current.get(key) {
            Some(next) if next != value => {
                changed.insert(key);
            }
            Some(_) => {}
            None => tracing::warn!(field = %key, "field missing from current snapshot, skipping"),
        }
    }
    for key in current.keys().filter(|key| !previous.contains_key(*key)) {
        tracing::warn!(field = %key, "field missing from previous snapshot, skipping");
    }
    changed
}
