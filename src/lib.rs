pub mod form;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_support;

pub use form::{FieldKey, FormError, FormGroup, FormResult, FormSnapshot};
pub use watch::{AggregatorOptions, ErrorAggregate, ErrorAggregator, StaleErrorPolicy};
