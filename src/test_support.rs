use crate::form::{
    FieldKey, FieldValue, FormGroup, GroupTemplate, ValidationFailure, ValidationFailureSet,
};

pub(crate) const FIRST_NAME: FieldKey = FieldKey::new("firstName");
pub(crate) const LAST_NAME: FieldKey = FieldKey::new("lastName");
pub(crate) const SSN: FieldKey = FieldKey::new("ssn");
pub(crate) const EMAIL: FieldKey = FieldKey::new("email");
pub(crate) const FAVORITE_FOODS: FieldKey = FieldKey::new("favoriteFoods");
pub(crate) const FOOD_CAL: FieldKey = FieldKey::new("foodCal");
pub(crate) const FOOD_NAME: FieldKey = FieldKey::new("foodName");

pub(crate) fn required(value: &FieldValue) -> Option<ValidationFailure> {
    value.is_empty().then_some(ValidationFailure::Required)
}

/// Empty values pass; `required` covers them.
pub(crate) fn min_length(
    required: usize,
) -> impl Fn(&FieldValue) -> Option<ValidationFailure> + Send + Sync {
    move |value: &FieldValue| {
        let actual = value.as_text()?.chars().count();
        (actual > 0 && actual < required)
            .then_some(ValidationFailure::MinLength { required, actual })
    }
}

pub(crate) fn email(value: &FieldValue) -> Option<ValidationFailure> {
    let text = value.as_text()?;
    if text.is_empty() {
        return None;
    }
    let valid = text
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    (!valid).then_some(ValidationFailure::Email)
}

pub(crate) fn failures(items: impl IntoIterator<Item = ValidationFailure>) -> ValidationFailureSet {
    items.into_iter().collect()
}

/// Profile form with two favourite-food items.
pub(crate) fn profile_form() -> FormGroup {
    FormGroup::builder()
        .scalar(FIRST_NAME, "")
        .scalar(LAST_NAME, "Doe")
        .scalar(SSN, "1")
        .scalar(EMAIL, "x")
        .group(
            FAVORITE_FOODS,
            GroupTemplate::new().field(FOOD_CAL, "").field(FOOD_NAME, ""),
            2,
        )
        .validator(FIRST_NAME, required)
        .validator(FIRST_NAME, min_length(5))
        .validator(LAST_NAME, required)
        .validator(LAST_NAME, min_length(3))
        .validator(SSN, required)
        .validator(EMAIL, email)
        .item_validator(FAVORITE_FOODS, FOOD_CAL, required)
        .item_validator(FAVORITE_FOODS, FOOD_NAME, required)
        .build()
}
