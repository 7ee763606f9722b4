use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::{AbortHandle, BoxFuture, abortable};
use futures::{FutureExt, StreamExt};

use crate::form::{
    ControlNode, FieldKey, FormControls, FormError, FormGroup, FormId, FormResult, write_lock,
};

use super::aggregate::ErrorAggregate;
use super::diff::diff;
use super::extract::{extract_array, extract_control};
use super::message::{DefaultMessageMapper, MessageMapper};
use super::stream::{ChangeStream, SnapshotPair};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// What happens to a stored message once its scalar field stops showing an error.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum StaleErrorPolicy {
    /// Leave the entry in place. Entries are only added or overwritten.
    #[default]
    Retain,
    /// Remove the entry when the changed field no longer has an error.
    ClearOnValid,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AggregatorOptions {
    pub debounce: Duration,
    pub stale_errors: StaleErrorPolicy,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            stale_errors: StaleErrorPolicy::Retain,
        }
    }
}

impl AggregatorOptions {
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_stale_errors(mut self, policy: StaleErrorPolicy) -> Self {
        self.stale_errors = policy;
        self
    }
}

/// Watches forms for settled value changes and keeps an [`ErrorAggregate`]
/// in sync with the changed fields' validation state.
pub struct ErrorAggregator<M = DefaultMessageMapper> {
    options: AggregatorOptions,
    mapper: Arc<M>,
    active: Arc<RwLock<BTreeSet<FormId>>>,
}

impl<M> Clone for ErrorAggregator<M> {
    fn clone(&self) -> Self {
        Self {
            options: self.options,
            mapper: self.mapper.clone(),
            active: self.active.clone(),
        }
    }
}

impl ErrorAggregator {
    pub fn new(options: AggregatorOptions) -> Self {
        Self::with_mapper(options, DefaultMessageMapper)
    }
}

impl Default for ErrorAggregator {
    fn default() -> Self {
        Self::new(AggregatorOptions::default())
    }
}

impl<M> ErrorAggregator<M>
where
    M: MessageMapper + 'static,
{
    pub fn with_mapper(options: AggregatorOptions, mapper: M) -> Self {
        Self {
            options,
            mapper: Arc::new(mapper),
            active: Arc::new(RwLock::new(BTreeSet::new())),
        }
    }

    pub fn options(&self) -> AggregatorOptions {
        self.options
    }

    /// Subscribes to `form` and writes errors for changed fields into `errors`.
    ///
    /// The returned [`ErrorWatch`] does the work and must be driven by the
    /// caller's executor. Dropping the [`ErrorSubscription`] cancels it. A form
    /// can only have one live subscription per aggregator.
    pub fn handle_error(
        &self,
        form: &FormGroup,
        errors: &ErrorAggregate,
    ) -> FormResult<(ErrorSubscription, ErrorWatch)> {
        let form_id = form.id();
        let mut pairs = ChangeStream::subscribe(form, self.options.debounce)?;
        if !write_lock(&self.active, "registering error subscription")?.insert(form_id) {
            return Err(FormError::AlreadySubscribed(form_id));
        }

        let aggregator = self.clone();
        let form = form.clone();
        let errors = errors.clone();
        let drive = async move {
            while let Some(pair) = pairs.next().await {
                aggregator.apply_pair(&form, &pair, &errors);
            }
        };
        let (task, abort) = abortable(drive);
        tracing::debug!(form = %form_id, "error subscription started");

        Ok((
            ErrorSubscription {
                form_id,
                abort,
                active: self.active.clone(),
            },
            ErrorWatch {
                task: task.map(|_| ()).boxed(),
            },
        ))
    }

    /// Writes the current error state of every changed field in `diffs`.
    ///
    /// Repeated groups have their whole entry rebuilt. Scalar fields get a
    /// message when they show an error; otherwise the entry is left alone, or
    /// cleared under [`StaleErrorPolicy::ClearOnValid`].
    pub fn find_errors(
        &self,
        controls: &FormControls,
        diffs: &BTreeSet<FieldKey>,
        errors: &ErrorAggregate,
    ) -> FormResult<()> {
        for key in diffs.iter().filter(|key| controls.get(**key).is_none()) {
            tracing::warn!(field = %key, "changed field not found in control tree, skipping");
        }

        for (key, node) in controls.iter().filter(|(key, _)| diffs.contains(key)) {
            match node {
                ControlNode::RepeatedGroup(group) => {
                    let items = extract_array(key, group.items(), &*self.mapper);
                    errors.set_array(key, items)?;
                }
                ControlNode::Scalar(state) => {
                    match extract_control(key, state, &*self.mapper) {
                        Some(message) => {
                            errors.set(key, message)?;
                        }
                        None if self.options.stale_errors == StaleErrorPolicy::ClearOnValid => {
                            errors.clear(key)?;
                        }
                        None => {}
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_pair(&self, form: &FormGroup, pair: &SnapshotPair, errors: &ErrorAggregate) {
        let diffs = diff(&pair.previous, &pair.current);
        tracing::debug!(form = %form.id(), changed = ?diffs, "form value settled");
        let result = form
            .controls()
            .and_then(|controls| self.find_errors(&controls, &diffs, errors));
        if let Err(error) = result {
            tracing::error!(form = %form.id(), %error, "failed to extract form errors");
        }
    }
}

/// Cancel handle for a running [`ErrorWatch`]. Dropping it unsubscribes.
#[must_use = "dropping the subscription cancels the error watch"]
pub struct ErrorSubscription {
    form_id: FormId,
    abort: AbortHandle,
    active: Arc<RwLock<BTreeSet<FormId>>>,
}

impl ErrorSubscription {
    pub fn form_id(&self) -> FormId {
        self.form_id
    }

    pub fn is_active(&self) -> bool {
        !self.abort.is_aborted()
    }

    pub fn unsubscribe(self) {}
}

impl Drop for ErrorSubscription {
    fn drop(&mut self) {
        self.abort.abort();
        let mut active = match self.active.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        active.remove(&self.form_id);
        tracing::debug!(form = %self.form_id, "error subscription cancelled");
    }
}

/// The work behind an error subscription. Completes once cancelled.
#[must_use = "the error watch does nothing unless polled"]
pub struct ErrorWatch {
    task: BoxFuture<'static, ()>,
}

impl Future for ErrorWatch {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.task.poll_unpin(cx)
    }
}
