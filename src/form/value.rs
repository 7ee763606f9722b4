use std::fmt::{Display, Formatter};

use super::controller::FieldKey;

/// A single form value. Repeated groups carry one [`GroupValue`] per item.
///
/// Equality is total: numbers compare by [`f64::total_cmp`], so `NaN` equals
/// itself and `0.0` differs from `-0.0`.
#[derive(Clone, Debug, Default)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Group(Vec<GroupValue>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&[GroupValue]> {
        match self {
            FieldValue::Group(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, FieldValue::Group(_))
    }

    /// `Null`, an empty string and an empty group count as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(value) => value.is_empty(),
            FieldValue::Group(items) => items.is_empty(),
            FieldValue::Bool(_) | FieldValue::Number(_) => false,
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => true,
            (FieldValue::Bool(left), FieldValue::Bool(right)) => left == right,
            (FieldValue::Number(left), FieldValue::Number(right)) => {
                left.total_cmp(right).is_eq()
            }
            (FieldValue::Text(left), FieldValue::Text(right)) => left == right,
            (FieldValue::Group(left), FieldValue::Group(right)) => left == right,
            _ => false,
        }
    }
}

impl Eq for FieldValue {}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(value) => write!(f, "{value}"),
            FieldValue::Number(value) => write!(f, "{value}"),
            FieldValue::Text(value) => write!(f, "{value:?}"),
            FieldValue::Group(items) => write!(f, "[{} items]", items.len()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// Magnitudes above 2^53 are rounded to the nearest representable `f64`.
impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<Vec<GroupValue>> for FieldValue {
    fn from(items: Vec<GroupValue>) -> Self {
        Self::Group(items)
    }
}

impl<T> From<Option<T>> for FieldValue
where
    T: Into<FieldValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

/// Ordered `field name -> value` mapping, kept in schema declaration order.
///
/// Equality is structural: two snapshots are equal when they hold the same
/// keys in the same order with equal values.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FormSnapshot {
    entries: Vec<(FieldKey, FieldValue)>,
}

/// The value of one repeated-group item.
pub type GroupValue = FormSnapshot;

impl FormSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: FieldKey, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value.into());
        self
    }

    /// Inserts or replaces `key`, keeping the original position on replace.
    pub fn insert(&mut self, key: FieldKey, value: FieldValue) -> Option<FieldValue> {
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: FieldKey) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find_map(|(existing, value)| (*existing == key).then_some(value))
    }

    pub fn contains_key(&self, key: FieldKey) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = FieldKey> + '_ {
        self.entries.iter().map(|(key, _)| *key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, &FieldValue)> + '_ {
        self.entries.iter().map(|(key, value)| (*key, value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(FieldKey, FieldValue)> for FormSnapshot {
    fn from_iter<I: IntoIterator<Item = (FieldKey, FieldValue)>>(iter: I) -> Self {
        let mut snapshot = FormSnapshot::new();
        for (key, value) in iter {
            snapshot.insert(key, value);
        }
        snapshot
    }
}

/// Conversion used by `#[derive(FormModel)]` to capture a model's values.
pub trait ToFieldValue {
    fn to_field_value(&self) -> FieldValue;
}

impl ToFieldValue for FieldValue {
    fn to_field_value(&self) -> FieldValue {
        self.clone()
    }
}

impl ToFieldValue for String {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Text(self.clone())
    }
}

impl ToFieldValue for &'static str {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::from(*self)
    }
}

impl ToFieldValue for bool {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Bool(*self)
    }
}

impl ToFieldValue for f64 {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Number(*self)
    }
}

impl ToFieldValue for i64 {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::from(*self)
    }
}

impl ToFieldValue for i32 {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::from(*self)
    }
}

impl ToFieldValue for u32 {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::from(*self)
    }
}

impl<T> ToFieldValue for Option<T>
where
    T: ToFieldValue,
{
    fn to_field_value(&self) -> FieldValue {
        self.as_ref()
            .map_or(FieldValue::Null, ToFieldValue::to_field_value)
    }
}

impl<T> ToFieldValue for Vec<T>
where
    T: super::validation::FormModel,
{
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Group(self.iter().map(|item| item.values()).collect())
    }
}
