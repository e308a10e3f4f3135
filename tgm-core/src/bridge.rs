//! Wires two sides together and supervises them

use crate::bus::{BoundedDropQueue, DEFAULT_QUEUE_CAPACITY};
use crate::config::schema::BridgeConfig;
use crate::error::Result;
use crate::side::{SideController, SideHandler};
use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Dual-source event bridge
///
/// Owns the shared cancellation signal and the capacity of the two
/// cross-event queues. Side A's outbound queue is side B's inbound queue
/// and vice versa.
pub struct Bridge {
    capacity: usize,
    cancel: CancellationToken,
}

impl Bridge {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.queue_capacity)
    }

    /// Token shared by both sides; cancel it to shut the bridge down
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Build both controllers with their queues wired crosswise
    pub fn wire<A, B>(&self, side_a: A, side_b: B) -> (SideController<A>, SideController<B>)
    where
        A: SideHandler,
        B: SideHandler<Inbound = A::Outbound, Outbound = A::Inbound>,
    {
        let (a_to_b_tx, a_to_b_rx) = BoundedDropQueue::new(self.capacity).split();
        let (b_to_a_tx, b_to_a_rx) = BoundedDropQueue::new(self.capacity).split();

        (
            SideController::new(side_a, a_to_b_tx, b_to_a_rx),
            SideController::new(side_b, b_to_a_tx, a_to_b_rx),
        )
    }

    /// Wire both sides and run them until shutdown or a fatal error
    pub async fn run<A, B, SA, SB>(
        self,
        side_a: A,
        native_a: SA,
        side_b: B,
        native_b: SB,
    ) -> Result<()>
    where
        A: SideHandler,
        B: SideHandler<Inbound = A::Outbound, Outbound = A::Inbound>,
        SA: Stream<Item = Result<A::Native>> + Unpin,
        SB: Stream<Item = Result<B::Native>> + Unpin,
    {
        let (a, b) = self.wire(side_a, side_b);
        self.supervise(a, native_a, b, native_b).await
    }

    /// Run two already wired controllers concurrently
    ///
    /// The first fatal error cancels the shared token, drops the other
    /// side without waiting for it, and is returned.
    pub async fn supervise<A, B, SA, SB>(
        self,
        a: SideController<A>,
        native_a: SA,
        b: SideController<B>,
        native_b: SB,
    ) -> Result<()>
    where
        A: SideHandler,
        B: SideHandler,
        SA: Stream<Item = Result<A::Native>> + Unpin,
        SB: Stream<Item = Result<B::Native>> + Unpin,
    {
        info!(
            side_a = a.name(),
            side_b = b.name(),
            capacity = self.capacity,
            "Bridge starting"
        );

        let cancel = self.cancel;
        let run_a = guard(a.run(native_a, cancel.clone()), &cancel);
        let run_b = guard(b.run(native_b, cancel.clone()), &cancel);

        match tokio::try_join!(run_a, run_b) {
            Ok(_) => {
                info!("Bridge stopped");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Bridge stopped by fatal error");
                Err(e)
            }
        }
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

async fn guard<F>(run: F, cancel: &CancellationToken) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    let result = run.await;
    if result.is_err() {
        cancel.cancel();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::side::SideState;

    #[test]
    fn test_bridge_clamps_capacity() {
        assert_eq!(Bridge::new(0).capacity(), 1);
        assert_eq!(Bridge::default().capacity(), DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_bridge_from_config() {
        let config = BridgeConfig { queue_capacity: 3 };
        assert_eq!(Bridge::from_config(&config).capacity(), 3);
    }

    #[test]
    fn test_cancellation_token_is_shared() {
        let bridge = Bridge::default();
        let token = bridge.cancellation_token();
        token.cancel();
        assert!(bridge.cancellation_token().is_cancelled());
    }

    #[test]
    fn test_wire_starts_idle() {
        use crate::error::Result;
        use async_trait::async_trait;

        struct Ping;
        struct Pong;

        #[async_trait]
        impl SideHandler for Ping {
            type Native = ();
            type Inbound = u8;
            type Outbound = i8;
            fn name(&self) -> &str {
                "ping"
            }
            async fn on_native(&mut self, _: ()) -> Result<Option<i8>> {
                Ok(None)
            }
            async fn on_cross(&mut self, _: u8) -> Result<Option<i8>> {
                Ok(None)
            }
        }

        #[async_trait]
        impl SideHandler for Pong {
            type Native = ();
            type Inbound = i8;
            type Outbound = u8;
            fn name(&self) -> &str {
                "pong"
            }
            async fn on_native(&mut self, _: ()) -> Result<Option<u8>> {
                Ok(None)
            }
            async fn on_cross(&mut self, _: i8) -> Result<Option<u8>> {
                Ok(None)
            }
        }

        let (a, b) = Bridge::new(4).wire(Ping, Pong);
        assert_eq!(a.name(), "ping");
        assert_eq!(b.name(), "pong");
        assert_eq!(a.state(), SideState::Idle);
        assert_eq!(b.state(), SideState::Idle);
    }
}
