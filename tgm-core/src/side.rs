//! Per-side reactive loop
//!
//! A side owns one external event source, the queue of events it produces
//! for the other side and the queue of events the other side produces for
//! it. [`SideController::run`] merges the external source with the inbound
//! queue and hands every item to the side's [`SideHandler`].

use crate::bus::{FairMerge, Merged, QueueReader, QueueWriter};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Domain behaviour of one side of the bridge
///
/// Both methods classify their input with a plain `match` and return at
/// most one event for the other side. Inputs that match no rule are
/// ignored by returning `Ok(None)`.
///
/// An `Err` is logged and the loop moves on to the next item, unless it is
/// fatal (see [`Error::is_fatal`]), in which case the side stops.
#[async_trait]
pub trait SideHandler: Send {
    /// Event emitted by this side's external source
    type Native: Send + 'static;
    /// Cross event produced by the other side
    type Inbound: Send + 'static;
    /// Cross event this side produces for the other side
    type Outbound: Send + 'static;

    /// Side label used in logs and errors
    fn name(&self) -> &str;

    /// React to an event from the side's own external source
    async fn on_native(&mut self, event: Self::Native) -> Result<Option<Self::Outbound>>;

    /// React to an event handed over by the other side
    async fn on_cross(&mut self, event: Self::Inbound) -> Result<Option<Self::Outbound>>;
}

/// Lifecycle of a [`SideController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideState {
    /// Created, not yet running
    Idle,
    Running,
    /// Cancellation observed, finishing up
    Draining,
    Stopped,
}

/// Drives one side of the bridge
pub struct SideController<H: SideHandler> {
    handler: H,
    outbound: QueueWriter<H::Outbound>,
    inbound: QueueReader<H::Inbound>,
    state_tx: watch::Sender<SideState>,
}

impl<H: SideHandler> SideController<H> {
    /// Create a controller from its handler and both queue ends
    pub fn new(
        handler: H,
        outbound: QueueWriter<H::Outbound>,
        inbound: QueueReader<H::Inbound>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SideState::Idle);
        Self {
            handler,
            outbound,
            inbound,
            state_tx,
        }
    }

    pub fn name(&self) -> &str {
        self.handler.name()
    }

    pub fn state(&self) -> SideState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions; subscribe before calling [`run`](Self::run)
    pub fn subscribe_state(&self) -> watch::Receiver<SideState> {
        self.state_tx.subscribe()
    }

    /// Run until both sources end, `cancel` fires, or a fatal error occurs
    ///
    /// An `Err` item from `native` is fatal: the controller stops at once
    /// and the error is returned. Cancellation is checked between items;
    /// a handler that already started runs to completion.
    pub async fn run<S>(self, native: S, cancel: CancellationToken) -> Result<()>
    where
        S: Stream<Item = Result<H::Native>> + Unpin,
    {
        let Self {
            mut handler,
            outbound,
            inbound,
            state_tx,
        } = self;
        let side = handler.name().to_string();

        let mut merged =
            FairMerge::new(native, inbound.read_all()).with_cancellation(cancel.clone());

        state_tx.send_replace(SideState::Running);
        info!(side = %side, "Side controller started");

        while let Some(item) = merged.next().await {
            let handling = async {
                match item {
                    Merged::Native(Ok(event)) => handler.on_native(event).await,
                    Merged::Native(Err(e)) => Err(match e {
                        e @ Error::Source { .. } => e,
                        other => Error::source_failed(&side, other),
                    }),
                    Merged::Cross(event) => handler.on_cross(event).await,
                }
            };
            tokio::pin!(handling);

            // The in-flight handler always runs to completion.
            let outcome = tokio::select! {
                biased;
                outcome = &mut handling => outcome,
                _ = cancel.cancelled() => {
                    state_tx.send_replace(SideState::Draining);
                    debug!(side = %side, "Cancellation requested, finishing in-flight item");
                    handling.await
                }
            };

            match outcome {
                Ok(Some(event)) => {
                    if !outbound.write(event) {
                        debug!(side = %side, "Outbound queue full or closed, event dropped");
                    }
                }
                Ok(None) => {}
                Err(e) if e.is_fatal() => {
                    error!(side = %side, error = %e, "Fatal error, stopping side");
                    outbound.close();
                    state_tx.send_replace(SideState::Stopped);
                    return Err(e);
                }
                Err(e) => {
                    warn!(side = %side, error = %e, "Handler failed");
                }
            }

            if cancel.is_cancelled() {
                break;
            }
        }

        if cancel.is_cancelled() && *state_tx.borrow() != SideState::Draining {
            state_tx.send_replace(SideState::Draining);
            debug!(side = %side, "Cancellation requested, draining");
        }

        outbound.close();
        state_tx.send_replace(SideState::Stopped);
        info!(side = %side, "Side controller stopped");
        Ok(())
    }
}
