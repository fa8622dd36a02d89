//! Bounded multi-consumer work queue shared by the worker pool

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug)]
struct Shared<T> {
    items: ArrayQueue<T>,
    item_ready: Notify,
    space_ready: Notify,
    sender_gone: AtomicBool,
    pullers_gone: AtomicBool,
}

/// Create a queue holding at most `capacity` pending items.
///
/// The sender side waits when the buffer is full, which keeps the feeder
/// from running far ahead of the workers. Pullers never hold a lock while
/// waiting, so any number of them can wait at once.
pub fn work_queue<T>(capacity: usize) -> (QueueSender<T>, WorkQueue<T>) {
    let shared = Arc::new(Shared {
        items: ArrayQueue::new(capacity.max(1)),
        item_ready: Notify::new(),
        space_ready: Notify::new(),
        sender_gone: AtomicBool::new(false),
        pullers_gone: AtomicBool::new(false),
    });
    (
        QueueSender {
            shared: Arc::clone(&shared),
        },
        WorkQueue { shared },
    )
}

/// Producer side; dropping it closes the queue once drained
#[derive(Debug)]
pub struct QueueSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> QueueSender<T> {
    /// Enqueue `item`, waiting for space. Hands the item back when the
    /// consuming side is gone.
    pub async fn send(&self, mut item: T) -> Result<(), T> {
        loop {
            let space = self.shared.space_ready.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            if self.shared.pullers_gone.load(Ordering::Acquire) {
                return Err(item);
            }
            match self.shared.items.push(item) {
                Ok(()) => {
                    self.shared.item_ready.notify_one();
                    return Ok(());
                }
                Err(full) => item = full,
            }

            space.await;
        }
    }
}

impl<T> Drop for QueueSender<T> {
    fn drop(&mut self) {
        self.shared.sender_gone.store(true, Ordering::Release);
        self.shared.item_ready.notify_waiters();
    }
}

/// Consume-only view of the queue; every item is handed to exactly one puller.
#[derive(Debug)]
pub struct WorkQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> WorkQueue<T> {
    /// Next item, or `None` once the queue is closed and drained or the run
    /// is cancelled. Cancellation wins over an available item.
    pub async fn pull(&self, cancel: &CancellationToken) -> Option<T> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            let ready = self.shared.item_ready.notified();
            tokio::pin!(ready);
            ready.as_mut().enable();

            if let Some(item) = self.take() {
                return Some(item);
            }
            if self.shared.sender_gone.load(Ordering::Acquire) {
                // The last push may land between the pop above and the flag
                return self.take();
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = &mut ready => {}
            }
        }
    }

    fn take(&self) -> Option<T> {
        let item = self.shared.items.pop()?;
        self.shared.space_ready.notify_one();
        Some(item)
    }
}

impl<T> Drop for WorkQueue<T> {
    fn drop(&mut self) {
        self.shared.pullers_gone.store(true, Ordering::Release);
        self.shared.space_ready.notify_waiters();
    }
}

/// Push every item into the queue, stopping early on cancellation or when no
/// puller is left. Returns how many items were enqueued. Dropping the sender
/// on return closes the queue.
pub async fn feed<T, I>(sender: QueueSender<T>, items: I, cancel: CancellationToken) -> usize
where
    I: IntoIterator<Item = T>,
{
    let mut enqueued = 0;

    for item in items {
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Feeder stopped by cancellation after {} items", enqueued);
                break;
            }
            sent = sender.send(item) => sent,
        };

        if sent.is_err() {
            debug!("All workers gone, feeder stopping");
            break;
        }
        enqueued += 1;
    }

    enqueued
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_feed_and_pull() {
        let (sender, queue) = work_queue::<u32>(2);
        let cancel = CancellationToken::new();

        let feeder = tokio::spawn(feed(sender, 0..5, cancel.clone()));

        let mut pulled = Vec::new();
        while let Some(item) = queue.pull(&cancel).await {
            pulled.push(item);
        }

        assert_eq!(feeder.await.unwrap(), 5);
        assert_eq!(pulled, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_each_item_pulled_once() {
        let (sender, queue) = work_queue::<u32>(4);
        let queue = Arc::new(queue);
        let cancel = CancellationToken::new();

        let feeder = tokio::spawn(feed(sender, 0..100, cancel.clone()));

        let mut pullers = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            pullers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(item) = queue.pull(&cancel).await {
                    seen.push(item);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for puller in pullers {
            all.extend(puller.await.unwrap());
        }
        feeder.await.unwrap();

        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_waiting_puller_does_not_block_others() {
        let (sender, queue) = work_queue::<u32>(2);
        let cancel = CancellationToken::new();

        let mut idle = Box::pin(queue.pull(&cancel));
        assert!(futures::poll!(&mut idle).is_pending());

        sender.send(7).await.unwrap();
        let next = tokio::time::timeout(Duration::from_secs(1), queue.pull(&cancel))
            .await
            .expect("second puller was blocked by the idle one");
        assert_eq!(next, Some(7));
    }

    #[tokio::test]
    async fn test_closed_queue_drains_then_ends() {
        let (sender, queue) = work_queue::<u32>(4);
        let cancel = CancellationToken::new();

        sender.send(1).await.unwrap();
        sender.send(2).await.unwrap();
        drop(sender);

        assert_eq!(queue.pull(&cancel).await, Some(1));
        assert_eq!(queue.pull(&cancel).await, Some(2));
        assert_eq!(queue.pull(&cancel).await, None);
    }

    #[tokio::test]
    async fn test_cancelled_feeder_stops() {
        let (sender, _queue) = work_queue::<u32>(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(feed(sender, 0..10, cancel).await, 0);
    }

    #[tokio::test]
    async fn test_feeder_stops_when_pullers_gone() {
        let (sender, queue) = work_queue::<u32>(1);
        let cancel = CancellationToken::new();

        let feeder = tokio::spawn(feed(sender, 0..10, cancel.clone()));
        assert_eq!(queue.pull(&cancel).await, Some(0));
        drop(queue);

        let enqueued = tokio::time::timeout(Duration::from_secs(1), feeder)
            .await
            .expect("feeder kept waiting for space")
            .unwrap();
        assert!(enqueued <= 2);
    }

    #[tokio::test]
    async fn test_cancelled_pull_ignores_pending_items() {
        let (sender, queue) = work_queue::<u32>(4);
        sender.send(1).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(queue.pull(&cancel).await, None);
    }
}
