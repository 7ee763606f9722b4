use crate::form::{ControlState, FieldKey, GroupControls};

use super::aggregate::ItemErrors;
use super::message::MessageMapper;

/// A control shows an error once it is invalid and the user has interacted
/// with it (touched) or its value moved away from the initial one (dirty).
pub fn has_error(state: &ControlState) -> bool {
    !state.failures.is_empty() && (state.touched || state.dirty)
}

pub fn extract_control<M>(field: FieldKey, state: &ControlState, mapper: &M) -> Option<String>
where
    M: MessageMapper + ?Sized,
{
    if !has_error(state) {
        return None;
    }
    let message = mapper.message(&state.failures);
    tracing::trace!(%field, %message, "control error extracted");
    Some(message)
}

/// One map per item, in item order. Valid items yield an empty map so the
/// output stays index-aligned with the group.
pub fn extract_array<M>(field: FieldKey, items: &[GroupControls], mapper: &M) -> Vec<ItemErrors>
where
    M: MessageMapper + ?Sized,
{
    let errors = items
        .iter()
        .map(|item| {
            item.iter()
                .filter(|(_, state)| has_error(state))
                .map(|(child, state)| (child, mapper.message(&state.failures)))
                .collect::<ItemErrors>()
        })
        .collect::<Vec<_>>();
    tracing::trace!(%field, items = errors.len(), "group errors extracted");
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::{ValidationFailure, ValidationFailureSet};
    use crate::watch::message::DefaultMessageMapper;

    const NAME: FieldKey = FieldKey::new("name");
    const CAL: FieldKey = FieldKey::new("cal");
    const FOODS: FieldKey = FieldKey::new("foods");

    fn required() -> ValidationFailureSet {
        ValidationFailureSet::new().with(ValidationFailure::Required)
    }

    #[test]
    fn invalid_but_untouched_and_clean_control_has_no_error() {
        let state = ControlState::new("").with_failures(required());
        assert_eq!(extract_control(NAME, &state, &DefaultMessageMapper), None);
    }

    #[test]
    fn touched_or_dirty_invalid_control_yields_one_message() {
        let touched = ControlState::new("").with_failures(required()).with_touched(true);
        let dirty = ControlState::new("").with_failures(required()).with_dirty(true);

        assert_eq!(
            extract_control(NAME, &touched, &DefaultMessageMapper),
            Some("this field is required".to_string())
        );
        assert_eq!(
            extract_control(NAME, &dirty, &DefaultMessageMapper),
            Some("this field is required".to_string())
        );
    }

    #[test]
    fn valid_touched_control_has_no_error() {
        let state = ControlState::new("ok").with_touched(true).with_dirty(true);
        assert_eq!(extract_control(NAME, &state, &DefaultMessageMapper), None);
    }

    #[test]
    fn array_output_is_index_aligned_with_items() {
        let invalid = || ControlState::new("").with_failures(required()).with_touched(true);
        let items = vec![
            GroupControls::new()
                .with(NAME, invalid())
                .with(CAL, ControlState::new("10")),
            GroupControls::new()
                .with(NAME, ControlState::new("soup"))
                .with(CAL, ControlState::new("20")),
            GroupControls::new()
                .with(NAME, ControlState::new("").with_failures(required()))
                .with(CAL, invalid()),
        ];

        let errors = extract_array(FOODS, &items, &DefaultMessageMapper);

        assert_eq!(errors.len(), 3);
        assert_eq!(
            errors[0],
            ItemErrors::from([(NAME, "this field is required".to_string())])
        );
        assert!(errors[1].is_empty());
        assert_eq!(
            errors[2],
            ItemErrors::from([(CAL, "this field is required".to_string())])
        );
    }

    #[test]
    fn empty_group_yields_empty_sequence() {
        assert!(extract_array(FOODS, &[], &DefaultMessageMapper).is_empty());
    }
}
