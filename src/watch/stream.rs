use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::channel::mpsc::UnboundedReceiver;
use futures::{FutureExt, Stream, StreamExt};
use futures_timer::Delay;

use crate::form::{FormGroup, FormResult, FormSnapshot};

/// Two consecutive accepted snapshots.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotPair {
    pub previous: FormSnapshot,
    pub current: FormSnapshot,
}

/// The timing-free half of [`ChangeStream`]: structural dedupe followed by
/// sliding pairs of two.
#[derive(Clone, Debug, Default)]
pub struct SnapshotPairer {
    last: Option<FormSnapshot>,
}

impl SnapshotPairer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with `initial` as the previous snapshot, so the first accepted
    /// change already produces a pair.
    pub fn seeded(initial: FormSnapshot) -> Self {
        Self {
            last: Some(initial),
        }
    }

    pub fn last(&self) -> Option<&FormSnapshot> {
        self.last.as_ref()
    }

    pub fn accept(&mut self, snapshot: FormSnapshot) -> Option<SnapshotPair> {
        match self.last.take() {
            None => {
                self.last = Some(snapshot);
                None
            }
            Some(previous) if previous == snapshot => {
                self.last = Some(previous);
                None
            }
            Some(previous) => {
                self.last = Some(snapshot.clone());
                Some(SnapshotPair {
                    previous,
                    current: snapshot,
                })
            }
        }
    }
}

/// Debounced, deduplicated, pairwise view over a stream of form snapshots.
///
/// A burst of snapshots collapses to the last one once `window` passes without
/// another arrival. If the source ends, a pending snapshot is flushed
/// immediately and the stream ends after it.
pub struct ChangeStream<S> {
    source: S,
    window: Duration,
    pending: Option<FormSnapshot>,
    delay: Option<Delay>,
    pairer: SnapshotPairer,
    source_done: bool,
}

impl<S> ChangeStream<S>
where
    S: Stream<Item = FormSnapshot> + Unpin,
{
    pub fn new(source: S, window: Duration) -> Self {
        Self::with_pairer(source, window, SnapshotPairer::new())
    }

    pub fn with_pairer(source: S, window: Duration, pairer: SnapshotPairer) -> Self {
        Self {
            source,
            window,
            pending: None,
            delay: None,
            pairer,
            source_done: false,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl ChangeStream<UnboundedReceiver<FormSnapshot>> {
    /// Listens to `form` and seeds the pairer with its current snapshot.
    pub fn subscribe(form: &FormGroup, window: Duration) -> FormResult<Self> {
        let source = form.value_changes()?;
        let initial = form.snapshot()?;
        Ok(Self::with_pairer(
            source,
            window,
            SnapshotPairer::seeded(initial),
        ))
    }
}

impl<S> Stream for ChangeStream<S>
where
    S: Stream<Item = FormSnapshot> + Unpin,
{
    type Item = SnapshotPair;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            while !this.source_done {
                match this.source.poll_next_unpin(cx) {
                    Poll::Ready(Some(snapshot)) => {
                        this.pending = Some(snapshot);
                        this.delay = Some(Delay::new(this.window));
                    }
                    Poll::Ready(None) => this.source_done = true,
                    Poll::Pending => break,
                }
            }

            let settled = match this.delay.as_mut() {
                Some(delay) => this.source_done || delay.poll_unpin(cx).is_ready(),
                None => false,
            };
            if settled {
                this.delay = None;
                if let Some(snapshot) = this.pending.take() {
                    if let Some(pair) = this.pairer.accept(snapshot) {
                        return Poll::Ready(Some(pair));
                    }
                    tracing::trace!("settled snapshot unchanged, suppressed");
                    continue;
                }
            }

            if this.source_done && this.pending.is_none() {
                return Poll::Ready(None);
            }
            return Poll::Pending;
        }
    }
}
