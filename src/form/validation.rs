use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use super::value::{FieldValue, FormSnapshot};

/// Failure kind names.
pub mod kind {
    pub const REQUIRED: &str = "required";
    pub const EMAIL: &str = "email";
    pub const MIN_LENGTH: &str = "minLength";
}

use kind::{EMAIL, MIN_LENGTH, REQUIRED};

/// One reason a control currently fails validation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ValidationFailure {
    Required,
    Email,
    MinLength { required: usize, actual: usize },
    Other { kind: String, detail: Option<String> },
}

impl ValidationFailure {
    pub fn other(kind: impl Into<String>) -> Self {
        Self::Other {
            kind: kind.into(),
            detail: None,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            ValidationFailure::Required => REQUIRED,
            ValidationFailure::Email => EMAIL,
            ValidationFailure::MinLength { .. } => MIN_LENGTH,
            ValidationFailure::Other { kind, .. } => kind.as_str(),
        }
    }
}

impl Display for ValidationFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationFailure::MinLength { required, actual } => {
                write!(f, "{MIN_LENGTH}(required {required}, actual {actual})")
            }
            ValidationFailure::Other {
                kind,
                detail: Some(detail),
            } => write!(f, "{kind}({detail})"),
            failure => f.write_str(failure.kind()),
        }
    }
}

/// Failures keyed by kind name. At most one failure per kind.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ValidationFailureSet {
    failures: BTreeMap<String, ValidationFailure>,
}

impl ValidationFailureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, failure: ValidationFailure) -> Self {
        self.insert(failure);
        self
    }

    pub fn insert(&mut self, failure: ValidationFailure) -> Option<ValidationFailure> {
        self.failures.insert(failure.kind().to_string(), failure)
    }

    pub fn remove(&mut self, kind: &str) -> Option<ValidationFailure> {
        self.failures.remove(kind)
    }

    pub fn get(&self, kind: &str) -> Option<&ValidationFailure> {
        self.failures.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.failures.contains_key(kind)
    }

    /// `(required, actual)` lengths when a `minLength` failure is present.
    pub fn min_length(&self) -> Option<(usize, usize)> {
        match self.failures.get(MIN_LENGTH) {
            Some(ValidationFailure::MinLength { required, actual }) => Some((*required, *actual)),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationFailure> + '_ {
        self.failures.values()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl FromIterator<ValidationFailure> for ValidationFailureSet {
    fn from_iter<I: IntoIterator<Item = ValidationFailure>>(iter: I) -> Self {
        let mut set = ValidationFailureSet::new();
        set.extend(iter);
        set
    }
}

impl Extend<ValidationFailure> for ValidationFailureSet {
    fn extend<I: IntoIterator<Item = ValidationFailure>>(&mut self, iter: I) {
        for failure in iter {
            self.insert(failure);
        }
    }
}

/// Produces a validation outcome for a single control value.
///
/// The crate ships no rules of its own; the schema layer registers these
/// through [`super::FormGroupBuilder`].
pub trait FieldValidator: Send + Sync {
    fn validate(&self, value: &FieldValue) -> Option<ValidationFailure>;
}

impl<F> FieldValidator for F
where
    F: Fn(&FieldValue) -> Option<ValidationFailure> + Send + Sync,
{
    fn validate(&self, value: &FieldValue) -> Option<ValidationFailure> {
        (self)(value)
    }
}

pub(super) fn run_validators<'a, I>(validators: I, value: &FieldValue) -> ValidationFailureSet
where
    I: IntoIterator<Item = &'a std::sync::Arc<dyn FieldValidator>>,
{
    validators
        .into_iter()
        .filter_map(|validator| validator.validate(value))
        .collect()
}

/// A typed model that can be pushed into a [`super::FormGroup`].
///
/// Usually derived with `#[derive(FormModel)]`.
pub trait FormModel: Clone + Send + Sync + 'static {
    type Fields;

    fn fields() -> Self::Fields;

    fn values(&self) -> FormSnapshot;
}
