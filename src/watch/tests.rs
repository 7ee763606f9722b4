use super::*;
use crate::form::{
    ControlNode, ControlState, FieldKey, FormControls, FormError, GroupControls, GroupTemplate,
    RepeatedGroup, ValidationFailure, ValidationFailureSet,
};
use crate::test_support::*;
use futures::executor::block_on;
use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;

const WINDOW: Duration = Duration::from_millis(20);
const SETTLE: Duration = Duration::from_millis(250);

fn aggregator() -> ErrorAggregator {
    ErrorAggregator::new(AggregatorOptions::default().with_debounce(WINDOW))
}

fn changed(keys: &[FieldKey]) -> BTreeSet<FieldKey> {
    keys.iter().copied().collect()
}

#[test]
fn default_options_use_half_second_window_and_retain_policy() {
    let options = AggregatorOptions::default();
    assert_eq!(options.debounce, Duration::from_millis(500));
    assert_eq!(options.stale_errors, StaleErrorPolicy::Retain);
    let aggregator: ErrorAggregator = ErrorAggregator::default();
    assert_eq!(aggregator.options(), options);
}

#[test]
fn profile_scenario_writes_only_changed_failing_fields() {
    let form = profile_form();
    let errors = ErrorAggregate::new();
    let aggregator = aggregator();
    form.touch(EMAIL).expect("touch email");
    form.set_failures(
        FIRST_NAME,
        failures([
            ValidationFailure::Required,
            ValidationFailure::MinLength {
                required: 5,
                actual: 0,
            },
        ]),
    )
    .expect("seed first name failures");

    let controls = form.controls().expect("controls");
    let first_name = controls
        .get(FIRST_NAME)
        .and_then(ControlNode::as_scalar)
        .expect("first name");
    assert_eq!(first_name.failures.len(), 2);
    assert!(!first_name.touched && !first_name.dirty);
    aggregator
        .find_errors(&controls, &changed(&[FIRST_NAME, EMAIL]), &errors)
        .expect("first pass");

    assert_eq!(errors.get(FIRST_NAME).expect("read"), None);
    assert_eq!(
        errors.message(EMAIL).expect("read"),
        Some("email required".to_string())
    );

    let previous = form.snapshot().expect("previous");
    form.set_value(LAST_NAME, "Do").expect("set last name");
    form.touch(LAST_NAME).expect("touch last name");
    let current = form.snapshot().expect("current");
    let diffs = diff(&previous, &current);
    assert_eq!(diffs, changed(&[LAST_NAME]));

    aggregator
        .find_errors(&form.controls().expect("controls"), &diffs, &errors)
        .expect("second pass");

    assert_eq!(
        errors.message(LAST_NAME).expect("read"),
        Some("please input a value longer than 3, you only input 2".to_string())
    );
    assert_eq!(
        errors.message(EMAIL).expect("read"),
        Some("email required".to_string())
    );
    assert_eq!(errors.len().expect("len"), 2);
}

#[test]
fn clearing_an_edited_field_replaces_its_message() {
    let form = profile_form();
    let errors = ErrorAggregate::new();
    let aggregator = aggregator();

    let before = form.snapshot().expect("initial");
    form.set_value(FIRST_NAME, "A").expect("type");
    let typed = form.snapshot().expect("typed");
    aggregator
        .find_errors(
            &form.controls().expect("controls"),
            &diff(&before, &typed),
            &errors,
        )
        .expect("first settle");
    assert_eq!(
        errors.message(FIRST_NAME).expect("read"),
        Some("please input a value longer than 5, you only input 1".to_string())
    );

    form.set_value(FIRST_NAME, "").expect("erase");
    let erased = form.snapshot().expect("erased");
    let diffs = diff(&typed, &erased);
    assert_eq!(diffs, changed(&[FIRST_NAME]));
    aggregator
        .find_errors(&form.controls().expect("controls"), &diffs, &errors)
        .expect("second settle");

    assert_eq!(
        errors.message(FIRST_NAME).expect("read"),
        Some("this field is required".to_string())
    );
}

#[test]
fn unchanged_fields_keep_their_entries() {
    let form = profile_form();
    let errors = ErrorAggregate::new();
    errors.set(SSN, "stale message").expect("seed");
    form.set_value(SSN, "").expect("clear ssn");
    form.touch(SSN).expect("touch ssn");

    aggregator()
        .find_errors(
            &form.controls().expect("controls"),
            &changed(&[LAST_NAME]),
            &errors,
        )
        .expect("find errors");

    assert_eq!(
        errors.message(SSN).expect("read"),
        Some("stale message".to_string())
    );
    assert_eq!(errors.get(LAST_NAME).expect("read"), None);
}

#[test]
fn required_takes_priority_over_min_length_in_the_aggregate() {
    let name = FieldKey::new("name");
    let controls = FormControls::new().with(
        name,
        ControlNode::Scalar(
            ControlState::new("ab")
                .with_failures(failures([
                    ValidationFailure::Required,
                    ValidationFailure::MinLength {
                        required: 5,
                        actual: 2,
                    },
                ]))
                .with_touched(true),
        ),
    );
    let errors = ErrorAggregate::new();

    aggregator()
        .find_errors(&controls, &changed(&[name]), &errors)
        .expect("find errors");

    assert_eq!(
        errors.message(name).expect("read"),
        Some("this field is required".to_string())
    );
}

#[test]
fn group_entry_is_rebuilt_with_one_map_per_item() {
    let form = profile_form();
    let errors = ErrorAggregate::new();
    errors
        .set_array(FAVORITE_FOODS, vec![ItemErrors::new(); 5])
        .expect("seed stale entry");
    form.push_item(FAVORITE_FOODS).expect("third item");
    form.touch_item(FAVORITE_FOODS, 0, FOOD_NAME)
        .expect("touch item 0");
    form.set_item_value(FAVORITE_FOODS, 1, FOOD_NAME, "soup")
        .expect("fill item 1");
    form.set_item_value(FAVORITE_FOODS, 1, FOOD_CAL, "120")
        .expect("fill item 1");
    form.touch_item(FAVORITE_FOODS, 2, FOOD_CAL)
        .expect("touch item 2");

    aggregator()
        .find_errors(
            &form.controls().expect("controls"),
            &changed(&[FAVORITE_FOODS]),
            &errors,
        )
        .expect("find errors");

    let items = errors
        .items(FAVORITE_FOODS)
        .expect("read")
        .expect("group entry");
    assert_eq!(items.len(), 3);
    assert_eq!(
        items[0],
        ItemErrors::from([(FOOD_NAME, "this field is required".to_string())])
    );
    assert!(items[1].is_empty());
    assert_eq!(
        items[2],
        ItemErrors::from([(FOOD_CAL, "this field is required".to_string())])
    );
}

#[test]
fn group_with_no_items_stores_an_empty_sequence() {
    let foods = FieldKey::new("foods");
    let controls = FormControls::new().with(
        foods,
        ControlNode::RepeatedGroup(RepeatedGroup::from_items(
            GroupTemplate::new().field(FOOD_NAME, ""),
            Vec::new(),
        )),
    );
    let errors = ErrorAggregate::new();

    aggregator()
        .find_errors(&controls, &changed(&[foods]), &errors)
        .expect("find errors");

    assert_eq!(errors.items(foods).expect("read"), Some(Vec::new()));
}

#[test]
fn valid_again_field_is_retained_by_default_and_cleared_on_request() {
    let name = FieldKey::new("name");
    let valid = FormControls::new().with(
        name,
        ControlNode::Scalar(ControlState::new("Alice").with_touched(true)),
    );

    let retained = ErrorAggregate::new();
    retained.set(name, "this field is required").expect("seed");
    aggregator()
        .find_errors(&valid, &changed(&[name]), &retained)
        .expect("retain pass");
    assert!(retained.contains(name).expect("contains"));

    let cleared = ErrorAggregate::new();
    cleared.set(name, "this field is required").expect("seed");
    ErrorAggregator::new(
        AggregatorOptions::default().with_stale_errors(StaleErrorPolicy::ClearOnValid),
    )
    .find_errors(&valid, &changed(&[name]), &cleared)
    .expect("clear pass");
    assert!(!cleared.contains(name).expect("contains"));
}

#[test]
fn changed_names_missing_from_the_tree_are_skipped() {
    let form = profile_form();
    let errors = ErrorAggregate::new();
    form.touch(EMAIL).expect("touch");

    aggregator()
        .find_errors(
            &form.controls().expect("controls"),
            &changed(&[FieldKey::new("middleName"), EMAIL]),
            &errors,
        )
        .expect("unknown names do not fail extraction");

    assert_eq!(errors.len().expect("len"), 1);
    assert!(errors.contains(EMAIL).expect("contains"));
}

#[test]
fn custom_mapper_supplies_messages() {
    let name = FieldKey::new("name");
    let controls = FormControls::new().with(
        name,
        ControlNode::Scalar(
            ControlState::new("")
                .with_failures(ValidationFailureSet::new().with(ValidationFailure::Required))
                .with_dirty(true),
        ),
    );
    let errors = ErrorAggregate::new();
    let aggregator = ErrorAggregator::with_mapper(
        AggregatorOptions::default(),
        |failures: &ValidationFailureSet| {
            let kinds = failures
                .iter()
                .map(|failure| failure.kind().to_string())
                .collect::<Vec<_>>();
            format!("invalid: {}", kinds.join(", "))
        },
    );

    aggregator
        .find_errors(&controls, &changed(&[name]), &errors)
        .expect("find errors");

    assert_eq!(
        errors.message(name).expect("read"),
        Some("invalid: required".to_string())
    );
}

#[test]
fn handle_error_aggregates_settled_changes() {
    let form = profile_form();
    let errors = ErrorAggregate::new();
    let (subscription, watch) = aggregator()
        .handle_error(&form, &errors)
        .expect("subscribe");
    let driver = thread::spawn(move || block_on(watch));

    form.touch(EMAIL).expect("touch email");
    form.set_value(EMAIL, "y").expect("email burst");
    form.set_value(LAST_NAME, "D").expect("last name burst");
    form.set_value(LAST_NAME, "Do").expect("last name burst");
    thread::sleep(SETTLE);

    assert_eq!(
        errors.message(EMAIL).expect("read"),
        Some("email required".to_string())
    );
    assert_eq!(
        errors.message(LAST_NAME).expect("read"),
        Some("please input a value longer than 3, you only input 2".to_string())
    );
    assert_eq!(errors.get(FIRST_NAME).expect("read"), None);
    assert_eq!(errors.get(FAVORITE_FOODS).expect("read"), None);

    form.set_item_value(FAVORITE_FOODS, 1, FOOD_NAME, "x")
        .expect("item write");
    form.set_item_value(FAVORITE_FOODS, 1, FOOD_NAME, "")
        .expect("item write back");
    form.touch(FAVORITE_FOODS).expect("touch group");
    form.set_value(LAST_NAME, "Doe").expect("last name valid");
    thread::sleep(SETTLE);

    assert_eq!(
        errors.message(LAST_NAME).expect("read"),
        Some("please input a value longer than 3, you only input 2".to_string())
    );
    assert_eq!(errors.get(FAVORITE_FOODS).expect("read"), None);

    form.set_item_value(FAVORITE_FOODS, 0, FOOD_CAL, "250")
        .expect("item write");
    thread::sleep(SETTLE);

    let items = errors
        .items(FAVORITE_FOODS)
        .expect("read")
        .expect("group entry");
    assert_eq!(items.len(), 2);
    assert_eq!(
        items[0],
        ItemErrors::from([(FOOD_NAME, "this field is required".to_string())])
    );
    assert_eq!(items[1].len(), 2);

    subscription.unsubscribe();
    driver.join().expect("watch ends after unsubscribe");
}

#[test]
fn second_subscription_for_the_same_form_is_rejected() {
    let form = profile_form();
    let errors = ErrorAggregate::new();
    let aggregator = aggregator();

    let (first, _watch) = aggregator.handle_error(&form, &errors).expect("first");
    assert!(matches!(
        aggregator.handle_error(&form, &errors),
        Err(FormError::AlreadySubscribed(id)) if id == form.id()
    ));

    assert!(first.is_active());
    first.unsubscribe();
    let (second, _watch) = aggregator
        .handle_error(&form, &errors)
        .expect("resubscribe after cancel");
    assert_eq!(second.form_id(), form.id());
}

#[test]
fn unsubscribing_discards_a_pending_window() {
    let form = profile_form();
    let errors = ErrorAggregate::new();
    let aggregator =
        ErrorAggregator::new(AggregatorOptions::default().with_debounce(Duration::from_millis(150)));
    let (subscription, watch) = aggregator
        .handle_error(&form, &errors)
        .expect("subscribe");
    let driver = thread::spawn(move || block_on(watch));

    form.set_value(LAST_NAME, "Do").expect("set");
    drop(subscription);
    driver.join().expect("watch ends");
    thread::sleep(Duration::from_millis(300));

    assert!(errors.is_empty().expect("is empty"));
}

#[test]
fn pristine_group_child_shows_no_error() {
    let item = GroupControls::new().with(
        FOOD_NAME,
        ControlState::new("").with_failures(failures([ValidationFailure::Required])),
    );
    assert_eq!(item.len(), 1);
    assert!(!has_error(item.get(FOOD_NAME).expect("child")));
}
