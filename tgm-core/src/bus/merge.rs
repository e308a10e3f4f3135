//! Fair interleaving of two heterogeneous event streams

use futures::stream::{FusedStream, Stream};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// One item of a [`FairMerge`], tagged with the source it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Merged<A, B> {
    /// Item from the side's own external source
    Native(A),
    /// Item handed over by the other side
    Cross(B),
}

impl<A, B> Merged<A, B> {
    pub fn is_native(&self) -> bool {
        matches!(self, Merged::Native(_))
    }

    pub fn is_cross(&self) -> bool {
        matches!(self, Merged::Cross(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Turn {
    Native,
    Cross,
}

impl Turn {
    fn other(self) -> Self {
        match self {
            Turn::Native => Turn::Cross,
            Turn::Cross => Turn::Native,
        }
    }
}

/// Merges a native stream and a cross stream into one tagged stream
///
/// Each source keeps exactly one advance in flight (its own pending
/// `poll_next`). Whichever source is ready first is emitted; the source
/// polled first alternates on every pass, so a source that becomes ready
/// while the other is saturated is picked up on the next pass.
///
/// A finished source is never polled again and the merge keeps draining the
/// other one. The merge ends when both sources have ended, or as soon as
/// the optional cancellation token fires; outstanding advances are then
/// abandoned.
///
/// A merge is itself a stream, so a third source (an idle tick, say) is
/// added by nesting: `FairMerge::new(FairMerge::new(a, b), ticks)`.
pub struct FairMerge<A, B> {
    native: A,
    cross: B,
    native_done: bool,
    cross_done: bool,
    turn: Turn,
    cancelled: Option<Pin<Box<WaitForCancellationFutureOwned>>>,
    terminated: bool,
}

impl<A, B> FairMerge<A, B>
where
    A: Stream + Unpin,
    B: Stream + Unpin,
{
    pub fn new(native: A, cross: B) -> Self {
        Self {
            native,
            cross,
            native_done: false,
            cross_done: false,
            turn: Turn::Native,
            cancelled: None,
            terminated: false,
        }
    }

    /// End the merge once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancelled = Some(Box::pin(token.cancelled_owned()));
        self
    }

    pub fn is_native_finished(&self) -> bool {
        self.native_done
    }

    pub fn is_cross_finished(&self) -> bool {
        self.cross_done
    }

    fn finish(&mut self) {
        self.native_done = true;
        self.cross_done = true;
        self.cancelled = None;
        self.terminated = true;
    }
}

impl<A, B> Stream for FairMerge<A, B>
where
    A: Stream + Unpin,
    B: Stream + Unpin,
{
    type Item = Merged<A::Item, B::Item>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.terminated {
            return Poll::Ready(None);
        }

        if let Some(cancelled) = this.cancelled.as_mut() {
            if cancelled.as_mut().poll(cx).is_ready() {
                this.finish();
                return Poll::Ready(None);
            }
        }

        for _ in 0..2 {
            let turn = this.turn;
            this.turn = turn.other();
            match turn {
                Turn::Native if !this.native_done => {
                    match Pin::new(&mut this.native).poll_next(cx) {
                        Poll::Ready(Some(item)) => return Poll::Ready(Some(Merged::Native(item))),
                        Poll::Ready(None) => this.native_done = true,
                        Poll::Pending => {}
                    }
                }
                Turn::Cross if !this.cross_done => match Pin::new(&mut this.cross).poll_next(cx) {
                    Poll::Ready(Some(item)) => return Poll::Ready(Some(Merged::Cross(item))),
                    Poll::Ready(None) => this.cross_done = true,
                    Poll::Pending => {}
                },
                _ => {}
            }
        }

        if this.native_done && this.cross_done {
            this.finish();
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    }
}

impl<A, B> FusedStream for FairMerge<A, B>
where
    A: Stream + Unpin,
    B: Stream + Unpin,
{
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BoundedDropQueue;
    use futures::stream::{self, StreamExt};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_merge_emits_every_item_once() {
        let native = stream::iter(vec![1u32, 2, 3]);
        let cross = stream::iter(vec!["a".to_string(), "b".to_string()]);

        let items: Vec<_> = FairMerge::new(native, cross).collect().await;
        assert_eq!(items.len(), 5);

        let natives: Vec<u32> = items
            .iter()
            .filter_map(|m| match m {
                Merged::Native(n) => Some(*n),
                Merged::Cross(_) => None,
            })
            .collect();
        let crosses: Vec<String> = items
            .iter()
            .filter_map(|m| match m {
                Merged::Cross(s) => Some(s.clone()),
                Merged::Native(_) => None,
            })
            .collect();
        assert_eq!(natives, vec![1, 2, 3]);
        assert_eq!(crosses, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_merge_alternates_when_both_ready() {
        let native = stream::iter(vec![1, 2, 3]);
        let cross = stream::iter(vec![10, 20, 30]);

        let items: Vec<_> = FairMerge::new(native, cross).collect().await;
        assert_eq!(
            items,
            vec![
                Merged::Native(1),
                Merged::Cross(10),
                Merged::Native(2),
                Merged::Cross(20),
                Merged::Native(3),
                Merged::Cross(30),
            ]
        );
    }

    #[tokio::test]
    async fn test_merge_drains_remaining_source() {
        let native = stream::iter(Vec::<u8>::new());
        let cross = stream::iter(vec!['x', 'y']);

        let mut merged = FairMerge::new(native, cross);
        assert_eq!(merged.next().await, Some(Merged::Cross('x')));
        assert!(merged.is_native_finished());
        assert_eq!(merged.next().await, Some(Merged::Cross('y')));
        assert_eq!(merged.next().await, None);
        assert!(merged.is_terminated());
        assert_eq!(merged.next().await, None);
    }

    #[tokio::test]
    async fn test_merge_waits_for_unfinished_source() {
        let (tx, rx) = BoundedDropQueue::new(4).split();
        let native = stream::iter(vec![1]);
        let mut merged = FairMerge::new(native, rx.read_all());

        assert_eq!(merged.next().await, Some(Merged::Native(1)));
        assert!(timeout(Duration::from_millis(50), merged.next()).await.is_err());

        tx.write("late");
        drop(tx);
        assert_eq!(merged.next().await, Some(Merged::Cross("late")));
        assert_eq!(merged.next().await, None);
    }

    #[tokio::test]
    async fn test_saturated_source_does_not_starve_other() {
        let native = stream::repeat(0u32)
            .then(|n| async move {
                tokio::task::yield_now().await;
                n
            })
            .boxed();
        let (tx, rx) = BoundedDropQueue::new(1).split();
        let written = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&written);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.write("ready");
            flag.store(true, Ordering::SeqCst);
            // keep the queue open
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut merged = FairMerge::new(native, rx.read_all());
        let mut natives_after_ready = 0;
        loop {
            match timeout(Duration::from_secs(2), merged.next()).await.unwrap() {
                Some(Merged::Cross(value)) => {
                    assert_eq!(value, "ready");
                    break;
                }
                Some(Merged::Native(_)) => {
                    if written.load(Ordering::SeqCst) {
                        natives_after_ready += 1;
                    }
                }
                None => panic!("merge ended early"),
            }
        }
        assert!(natives_after_ready <= 1);
    }

    #[tokio::test]
    async fn test_cancellation_ends_merge() {
        let token = CancellationToken::new();
        let mut merged = FairMerge::new(stream::pending::<u32>(), stream::pending::<u32>())
            .with_cancellation(token.clone());

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let next = timeout(Duration::from_secs(1), merged.next())
            .await
            .expect("cancellation observed");
        assert_eq!(next, None);
        assert!(merged.is_terminated());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_emits_nothing() {
        let token = CancellationToken::new();
        token.cancel();

        let items: Vec<_> = FairMerge::new(stream::iter(vec![1]), stream::iter(vec![2]))
            .with_cancellation(token)
            .collect()
            .await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_nested_merge_adds_third_source() {
        let inner = FairMerge::new(stream::iter(vec![1]), stream::iter(vec!["two"]));
        let ticks = stream::iter(vec![()]);

        let items: Vec<_> = FairMerge::new(inner, ticks).collect().await;
        assert_eq!(items.len(), 3);
        assert!(items.contains(&Merged::Native(Merged::Native(1))));
        assert!(items.contains(&Merged::Native(Merged::Cross("two"))));
        assert!(items.contains(&Merged::Cross(())));
    }
}
