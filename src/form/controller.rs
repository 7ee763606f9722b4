use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use thiserror::Error;

use super::validation::{FieldValidator, FormModel, ValidationFailureSet, run_validators};
use super::value::{FieldValue, FormSnapshot, GroupValue};

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

impl Display for FormId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "form-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldKey(&'static str);

impl FieldKey {
    pub const fn new(value: &'static str) -> Self {
        Self(value)
    }

    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ControlKind {
    Scalar,
    RepeatedGroup,
}

impl Display for ControlKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlKind::Scalar => f.write_str("scalar"),
            ControlKind::RepeatedGroup => f.write_str("repeated group"),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum FormError {
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("unknown field `{0}`")]
    UnknownField(FieldKey),
    #[error("field `{field}` holds a {actual} value, expected {expected}")]
    ShapeMismatch {
        field: FieldKey,
        expected: ControlKind,
        actual: ControlKind,
    },
    #[error("item {index} is out of range for `{field}` ({len} items)")]
    ItemOutOfRange {
        field: FieldKey,
        index: usize,
        len: usize,
    },
    #[error("{0} already has an active error subscription")]
    AlreadySubscribed(FormId),
}

pub type FormResult<T> = Result<T, FormError>;

/// Live state of one control: value, validation outcome and interaction flags.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlState {
    pub value: FieldValue,
    pub initial: FieldValue,
    pub failures: ValidationFailureSet,
    pub touched: bool,
    pub dirty: bool,
}

impl ControlState {
    pub fn new(initial: impl Into<FieldValue>) -> Self {
        let initial = initial.into();
        Self {
            value: initial.clone(),
            initial,
            failures: ValidationFailureSet::new(),
            touched: false,
            dirty: false,
        }
    }

    pub fn with_failures(mut self, failures: ValidationFailureSet) -> Self {
        self.failures = failures;
        self
    }

    pub fn with_touched(mut self, touched: bool) -> Self {
        self.touched = touched;
        self
    }

    pub fn with_dirty(mut self, dirty: bool) -> Self {
        self.dirty = dirty;
        self
    }

    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }

    /// Once a write moves the value off its initial one the control stays
    /// dirty, even if a later write restores it. Only `reset` clears it.
    fn write(&mut self, value: FieldValue) {
        self.value = value;
        self.dirty |= self.value != self.initial;
    }

    fn reset(&mut self) {
        self.value = self.initial.clone();
        self.touched = false;
        self.dirty = false;
    }
}

/// Child controls of one repeated-group item, in schema order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupControls {
    controls: Vec<(FieldKey, ControlState)>,
}

impl GroupControls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: FieldKey, state: ControlState) -> Self {
        self.insert(key, state);
        self
    }

    pub fn insert(&mut self, key: FieldKey, state: ControlState) {
        match self.get_mut(key) {
            Some(slot) => *slot = state,
            None => self.controls.push((key, state)),
        }
    }

    pub fn get(&self, key: FieldKey) -> Option<&ControlState> {
        self.controls
            .iter()
            .find_map(|(existing, state)| (*existing == key).then_some(state))
    }

    fn get_mut(&mut self, key: FieldKey) -> Option<&mut ControlState> {
        self.controls
            .iter_mut()
            .find_map(|(existing, state)| (*existing == key).then_some(state))
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, &ControlState)> + '_ {
        self.controls.iter().map(|(key, state)| (*key, state))
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn value(&self) -> GroupValue {
        self.controls
            .iter()
            .map(|(key, state)| (*key, state.value.clone()))
            .collect()
    }
}

/// Child field names and initial values shared by every item of a group.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupTemplate {
    fields: Vec<(FieldKey, FieldValue)>,
}

impl GroupTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: FieldKey, initial: impl Into<FieldValue>) -> Self {
        let initial = initial.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = initial,
            None => self.fields.push((key, initial)),
        }
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = FieldKey> + '_ {
        self.fields.iter().map(|(key, _)| *key)
    }

    fn instantiate(&self) -> GroupControls {
        self.fields
            .iter()
            .fold(GroupControls::new(), |item, (key, initial)| {
                item.with(*key, ControlState::new(initial.clone()))
            })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RepeatedGroup {
    template: GroupTemplate,
    items: Vec<GroupControls>,
}

impl RepeatedGroup {
    pub fn new(template: GroupTemplate, item_count: usize) -> Self {
        let items = (0..item_count).map(|_| template.instantiate()).collect();
        Self { template, items }
    }

    /// Builds a group from explicit item states.
    pub fn from_items(template: GroupTemplate, items: Vec<GroupControls>) -> Self {
        Self { template, items }
    }

    pub fn template(&self) -> &GroupTemplate {
        &self.template
    }

    pub fn items(&self) -> &[GroupControls] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn value(&self) -> FieldValue {
        FieldValue::Group(self.items.iter().map(GroupControls::value).collect())
    }

    fn item_mut(&mut self, field: FieldKey, index: usize) -> FormResult<&mut GroupControls> {
        let len = self.items.len();
        self.items
            .get_mut(index)
            .ok_or(FormError::ItemOutOfRange { field, index, len })
    }
}

/// A node of the live control tree. The variant is fixed when the schema is built.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlNode {
    Scalar(ControlState),
    RepeatedGroup(RepeatedGroup),
}

impl ControlNode {
    pub fn kind(&self) -> ControlKind {
        match self {
            ControlNode::Scalar(_) => ControlKind::Scalar,
            ControlNode::RepeatedGroup(_) => ControlKind::RepeatedGroup,
        }
    }

    pub fn value(&self) -> FieldValue {
        match self {
            ControlNode::Scalar(state) => state.value.clone(),
            ControlNode::RepeatedGroup(group) => group.value(),
        }
    }

    pub fn as_scalar(&self) -> Option<&ControlState> {
        match self {
            ControlNode::Scalar(state) => Some(state),
            ControlNode::RepeatedGroup(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&RepeatedGroup> {
        match self {
            ControlNode::RepeatedGroup(group) => Some(group),
            ControlNode::Scalar(_) => None,
        }
    }
}

/// Top-level controls of a form, in schema order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FormControls {
    nodes: Vec<(FieldKey, ControlNode)>,
}

impl FormControls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: FieldKey, node: ControlNode) -> Self {
        self.insert(key, node);
        self
    }

    pub fn insert(&mut self, key: FieldKey, node: ControlNode) {
        match self.get_mut(key) {
            Some(slot) => *slot = node,
            None => self.nodes.push((key, node)),
        }
    }

    pub fn get(&self, key: FieldKey) -> Option<&ControlNode> {
        self.nodes
            .iter()
            .find_map(|(existing, node)| (*existing == key).then_some(node))
    }

    fn get_mut(&mut self, key: FieldKey) -> Option<&mut ControlNode> {
        self.nodes
            .iter_mut()
            .find_map(|(existing, node)| (*existing == key).then_some(node))
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, &ControlNode)> + '_ {
        self.nodes.iter().map(|(key, node)| (*key, node))
    }

    pub fn keys(&self) -> impl Iterator<Item = FieldKey> + '_ {
        self.nodes.iter().map(|(key, _)| *key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn snapshot(&self) -> FormSnapshot {
        self.nodes
            .iter()
            .map(|(key, node)| (*key, node.value()))
            .collect()
    }

    fn scalar_mut(&mut self, key: FieldKey) -> FormResult<&mut ControlState> {
        match self.get_mut(key) {
            Some(ControlNode::Scalar(state)) => Ok(state),
            Some(ControlNode::RepeatedGroup(_)) => Err(FormError::ShapeMismatch {
                field: key,
                expected: ControlKind::Scalar,
                actual: ControlKind::RepeatedGroup,
            }),
            None => Err(FormError::UnknownField(key)),
        }
    }

    fn group_mut(&mut self, key: FieldKey) -> FormResult<&mut RepeatedGroup> {
        match self.get_mut(key) {
            Some(ControlNode::RepeatedGroup(group)) => Ok(group),
            Some(ControlNode::Scalar(_)) => Err(FormError::ShapeMismatch {
                field: key,
                expected: ControlKind::RepeatedGroup,
                actual: ControlKind::Scalar,
            }),
            None => Err(FormError::UnknownField(key)),
        }
    }

    fn item_control_mut(
        &mut self,
        group: FieldKey,
        index: usize,
        child: FieldKey,
    ) -> FormResult<&mut ControlState> {
        self.group_mut(group)?
            .item_mut(group, index)?
            .get_mut(child)
            .ok_or(FormError::UnknownField(child))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
struct ValidatorKey {
    field: FieldKey,
    child: Option<FieldKey>,
}

impl ValidatorKey {
    fn scalar(field: FieldKey) -> Self {
        Self { field, child: None }
    }

    fn item(field: FieldKey, child: FieldKey) -> Self {
        Self {
            field,
            child: Some(child),
        }
    }
}

type ValidatorMap = BTreeMap<ValidatorKey, Vec<Arc<dyn FieldValidator>>>;

fn validate_control(validators: &ValidatorMap, key: ValidatorKey, state: &mut ControlState) {
    state.failures = run_validators(validators.get(&key).into_iter().flatten(), &state.value);
}

fn validate_item(validators: &ValidatorMap, group: FieldKey, item: &mut GroupControls) {
    for (child, state) in item.controls.iter_mut() {
        validate_control(validators, ValidatorKey::item(group, *child), state);
    }
}

fn validate_node(validators: &ValidatorMap, key: FieldKey, node: &mut ControlNode) {
    match node {
        ControlNode::Scalar(state) => validate_control(validators, ValidatorKey::scalar(key), state),
        ControlNode::RepeatedGroup(group) => {
            for item in group.items.iter_mut() {
                validate_item(validators, key, item);
            }
        }
    }
}

fn ensure_scalar_value(field: FieldKey, value: &FieldValue) -> FormResult<()> {
    if value.is_group() {
        return Err(FormError::ShapeMismatch {
            field,
            expected: ControlKind::Scalar,
            actual: ControlKind::RepeatedGroup,
        });
    }
    Ok(())
}

#[derive(Default)]
pub struct FormGroupBuilder {
    controls: FormControls,
    validators: ValidatorMap,
}

impl FormGroupBuilder {
    pub fn scalar(mut self, key: FieldKey, initial: impl Into<FieldValue>) -> Self {
        self.controls
            .insert(key, ControlNode::Scalar(ControlState::new(initial)));
        self
    }

    pub fn group(mut self, key: FieldKey, template: GroupTemplate, item_count: usize) -> Self {
        self.controls.insert(
            key,
            ControlNode::RepeatedGroup(RepeatedGroup::new(template, item_count)),
        );
        self
    }

    pub fn validator<V>(mut self, key: FieldKey, validator: V) -> Self
    where
        V: FieldValidator + 'static,
    {
        self.validators
            .entry(ValidatorKey::scalar(key))
            .or_default()
            .push(Arc::new(validator));
        self
    }

    pub fn item_validator<V>(mut self, group: FieldKey, child: FieldKey, validator: V) -> Self
    where
        V: FieldValidator + 'static,
    {
        self.validators
            .entry(ValidatorKey::item(group, child))
            .or_default()
            .push(Arc::new(validator));
        self
    }

    pub fn build(self) -> FormGroup {
        let mut controls = self.controls;
        for (key, node) in controls.nodes.iter_mut() {
            validate_node(&self.validators, *key, node);
        }
        FormGroup {
            id: FormId::next(),
            state: Arc::new(RwLock::new(controls)),
            validators: Arc::new(self.validators),
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

/// The live control tree of a form.
///
/// Every value write re-runs the affected validators and broadcasts a fresh
/// [`FormSnapshot`] to all [`FormGroup::value_changes`] receivers. Touch,
/// dirty and failure updates change control state without broadcasting.
#[derive(Clone)]
pub struct FormGroup {
    id: FormId,
    state: Arc<RwLock<FormControls>>,
    validators: Arc<ValidatorMap>,
    listeners: Arc<RwLock<Vec<UnboundedSender<FormSnapshot>>>>,
}

impl FormGroup {
    pub fn builder() -> FormGroupBuilder {
        FormGroupBuilder::default()
    }

    pub fn id(&self) -> FormId {
        self.id
    }

    pub fn value_changes(&self) -> FormResult<UnboundedReceiver<FormSnapshot>> {
        let (sender, receiver) = unbounded();
        write_lock(&self.listeners, "registering value listener")?.push(sender);
        Ok(receiver)
    }

    pub fn snapshot(&self) -> FormResult<FormSnapshot> {
        Ok(read_lock(&self.state, "creating form snapshot")?.snapshot())
    }

    pub fn controls(&self) -> FormResult<FormControls> {
        Ok(read_lock(&self.state, "reading controls")?.clone())
    }

    pub fn control(&self, key: FieldKey) -> FormResult<Option<ControlNode>> {
        Ok(read_lock(&self.state, "reading control")?.get(key).cloned())
    }

    pub fn set_value(&self, key: FieldKey, value: impl Into<FieldValue>) -> FormResult<()> {
        let value = value.into();
        ensure_scalar_value(key, &value)?;
        let validators = &self.validators;
        self.update("writing field value", |controls| {
            let state = controls.scalar_mut(key)?;
            state.write(value);
            validate_control(validators, ValidatorKey::scalar(key), state);
            Ok(())
        })
    }

    pub fn set_item_value(
        &self,
        group: FieldKey,
        index: usize,
        child: FieldKey,
        value: impl Into<FieldValue>,
    ) -> FormResult<()> {
        let value = value.into();
        ensure_scalar_value(child, &value)?;
        let validators = &self.validators;
        self.update("writing item value", |controls| {
            let state = controls.item_control_mut(group, index, child)?;
            state.write(value);
            validate_control(validators, ValidatorKey::item(group, child), state);
            Ok(())
        })
    }

    /// Marks a control as touched. For a repeated group every child is touched.
    pub fn touch(&self, key: FieldKey) -> FormResult<()> {
        self.update_silently("touching field", |controls| {
            match controls.get_mut(key) {
                Some(ControlNode::Scalar(state)) => state.touched = true,
                Some(ControlNode::RepeatedGroup(group)) => {
                    for item in group.items.iter_mut() {
                        for (_, state) in item.controls.iter_mut() {
                            state.touched = true;
                        }
                    }
                }
                None => return Err(FormError::UnknownField(key)),
            }
            Ok(())
        })
    }

    pub fn touch_item(&self, group: FieldKey, index: usize, child: FieldKey) -> FormResult<()> {
        self.update_silently("touching item field", |controls| {
            controls.item_control_mut(group, index, child)?.touched = true;
            Ok(())
        })
    }

    pub fn mark_as_dirty(&self, key: FieldKey) -> FormResult<()> {
        self.update_silently("marking field dirty", |controls| {
            match controls.get_mut(key) {
                Some(ControlNode::Scalar(state)) => state.dirty = true,
                Some(ControlNode::RepeatedGroup(group)) => {
                    for item in group.items.iter_mut() {
                        for (_, state) in item.controls.iter_mut() {
                            state.dirty = true;
                        }
                    }
                }
                None => return Err(FormError::UnknownField(key)),
            }
            Ok(())
        })
    }

    /// Replaces the failure set of a scalar control, e.g. with server-side
    /// outcomes. The next value write re-runs the registered validators.
    pub fn set_failures(&self, key: FieldKey, failures: ValidationFailureSet) -> FormResult<()> {
        self.update_silently("setting field failures", |controls| {
            controls.scalar_mut(key)?.failures = failures;
            Ok(())
        })
    }

    pub fn set_item_failures(
        &self,
        group: FieldKey,
        index: usize,
        child: FieldKey,
        failures: ValidationFailureSet,
    ) -> FormResult<()> {
        self.update_silently("setting item failures", |controls| {
            controls.item_control_mut(group, index, child)?.failures = failures;
            Ok(())
        })
    }

    /// Appends a fresh item built from the group's template and returns its index.
    pub fn push_item(&self, group: FieldKey) -> FormResult<usize> {
        let validators = &self.validators;
        self.update("appending group item", |controls| {
            let repeated = controls.group_mut(group)?;
            let mut item = repeated.template.instantiate();
            validate_item(validators, group, &mut item);
            repeated.items.push(item);
            Ok(repeated.items.len() - 1)
        })
    }

    pub fn remove_item(&self, group: FieldKey, index: usize) -> FormResult<()> {
        self.update("removing group item", |controls| {
            let repeated = controls.group_mut(group)?;
            if index >= repeated.items.len() {
                return Err(FormError::ItemOutOfRange {
                    field: group,
                    index,
                    len: repeated.items.len(),
                });
            }
            repeated.items.remove(index);
            Ok(())
        })
    }

    /// Restores every control to its initial value and clears interaction flags.
    pub fn reset(&self) -> FormResult<()> {
        let validators = &self.validators;
        self.update("resetting form", |controls| {
            for (key, node) in controls.nodes.iter_mut() {
                match node {
                    ControlNode::Scalar(state) => state.reset(),
                    ControlNode::RepeatedGroup(group) => {
                        for item in group.items.iter_mut() {
                            for (_, state) in item.controls.iter_mut() {
                                state.reset();
                            }
                        }
                    }
                }
                validate_node(validators, *key, node);
            }
            Ok(())
        })
    }

    pub fn patch_value<M>(&self, model: &M) -> FormResult<()>
    where
        M: FormModel,
    {
        self.patch(&model.values())
    }

    /// Writes every value in `values` whose key exists in the tree.
    ///
    /// Unknown keys are ignored. Repeated-group values patch existing items by
    /// index; extra items in `values` are ignored and the group is never resized.
    /// The patch is applied atomically and broadcasts a single snapshot.
    pub fn patch(&self, values: &FormSnapshot) -> FormResult<()> {
        let validators = &self.validators;
        self.update("patching form values", |controls| {
            let mut next = controls.clone();
            for (key, value) in values.iter() {
                match next.get_mut(key) {
                    None => tracing::debug!(field = %key, "ignoring patch for unknown field"),
                    Some(ControlNode::Scalar(state)) => {
                        ensure_scalar_value(key, value)?;
                        state.write(value.clone());
                        validate_control(validators, ValidatorKey::scalar(key), state);
                    }
                    Some(ControlNode::RepeatedGroup(group)) => {
                        let Some(item_values) = value.as_group() else {
                            return Err(FormError::ShapeMismatch {
                                field: key,
                                expected: ControlKind::RepeatedGroup,
                                actual: ControlKind::Scalar,
                            });
                        };
                        for (item, item_value) in group.items.iter_mut().zip(item_values) {
                            for (child, child_value) in item_value.iter() {
                                let Some(state) = item.get_mut(child) else {
                                    continue;
                                };
                                ensure_scalar_value(child, child_value)?;
                                state.write(child_value.clone());
                                validate_control(
                                    validators,
                                    ValidatorKey::item(key, child),
                                    state,
                                );
                            }
                        }
                    }
                }
            }
            *controls = next;
            Ok(())
        })
    }

    fn update<R>(
        &self,
        context: &'static str,
        f: impl FnOnce(&mut FormControls) -> FormResult<R>,
    ) -> FormResult<R> {
        let (result, snapshot) = {
            let mut controls = write_lock(&self.state, context)?;
            let result = f(&mut controls)?;
            (result, controls.snapshot())
        };
        self.broadcast(snapshot)?;
        Ok(result)
    }

    fn update_silently<R>(
        &self,
        context: &'static str,
        f: impl FnOnce(&mut FormControls) -> FormResult<R>,
    ) -> FormResult<R> {
        let mut controls = write_lock(&self.state, context)?;
        f(&mut controls)
    }

    fn broadcast(&self, snapshot: FormSnapshot) -> FormResult<()> {
        let mut listeners = write_lock(&self.listeners, "broadcasting value change")?;
        listeners.retain(|listener| listener.unbounded_send(snapshot.clone()).is_ok());
        Ok(())
    }
}

pub(crate) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(crate) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
