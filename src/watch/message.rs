use crate::form::ValidationFailureSet;
use crate::form::kind::{EMAIL, REQUIRED};

pub const EMAIL_MESSAGE: &str = "email required";
pub const REQUIRED_MESSAGE: &str = "this field is required";
pub const FALLBACK_MESSAGE: &str = "this field is invalid";

/// Turns a failure set into the one message shown for a control.
pub trait MessageMapper: Send + Sync {
    fn message(&self, failures: &ValidationFailureSet) -> String;
}

impl<F> MessageMapper for F
where
    F: Fn(&ValidationFailureSet) -> String + Send + Sync,
{
    fn message(&self, failures: &ValidationFailureSet) -> String {
        (self)(failures)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultMessageMapper;

impl MessageMapper for DefaultMessageMapper {
    fn message(&self, failures: &ValidationFailureSet) -> String {
        default_message(failures)
    }
}

/// Only the highest-priority failure is reported: `email`, then `required`,
/// then `minLength`. Anything else falls back to [`FALLBACK_MESSAGE`].
pub fn default_message(failures: &ValidationFailureSet) -> String {
    if failures.contains(EMAIL) {
        return EMAIL_MESSAGE.to_string();
    }
    if failures.contains(REQUIRED) {
        return REQUIRED_MESSAGE.to_string();
    }
    if let Some((required, actual)) = failures.min_length() {
        return format!("please input a value longer than {required}, you only input {actual}");
    }
    FALLBACK_MESSAGE.to_string()
}
