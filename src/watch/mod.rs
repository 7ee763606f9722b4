//! Settled-change watching and error aggregation for a [`crate::form::FormGroup`].
//!
//! Value changes flow through [`ChangeStream`] (debounce, dedupe, pairwise),
//! get [`diff`]ed against the previous settled snapshot, and only the changed
//! fields are inspected for errors. Messages land in a caller-owned
//! [`ErrorAggregate`].

mod aggregate;
mod aggregator;
mod diff;
mod extract;
mod message;
mod stream;

#[cfg(test)]
mod tests;

pub use aggregate::{ErrorAggregate, ErrorEntry, ItemErrors};
pub use aggregator::{
    AggregatorOptions, DEFAULT_DEBOUNCE, ErrorAggregator, ErrorSubscription, ErrorWatch,
    StaleErrorPolicy,
};
pub use diff::diff;
pub use extract::{extract_array, extract_control, has_error};
pub use message::{
    DefaultMessageMapper, EMAIL_MESSAGE, FALLBACK_MESSAGE, MessageMapper, REQUIRED_MESSAGE,
    default_message,
};
pub use stream::{ChangeStream, SnapshotPair, SnapshotPairer};
