use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bulk_protocol::{Block, SinkKind};
use bulk_sinks::{BlockSink, SinkError};
use parking_lot::Mutex;

use super::WorkerPool;
use crate::queue::DeliveryQueue;

/// Test sink that records emitted block ids and can be told to fail.
struct CollectingSink {
    kind: SinkKind,
    seen: Arc<Mutex<Vec<u64>>>,
    fail: Arc<AtomicBool>,
}

impl CollectingSink {
    fn new(kind: SinkKind) -> (Self, Arc<Mutex<Vec<u64>>>, Arc<AtomicBool>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let fail = Arc::new(AtomicBool::new(false));
        (
            Self {
                kind,
                seen: Arc::clone(&seen),
                fail: Arc::clone(&fail),
            },
            seen,
            fail,
        )
    }
}

#[async_trait]
impl BlockSink for CollectingSink {
    fn kind(&self) -> SinkKind {
        self.kind
    }

    async fn emit(&mut self, block: &Block) -> Result<(), SinkError> {
        if self.fail.load(Ordering::Acquire) {
            return Err(SinkError::Io(std::io::Error::other("induced failure")));
        }
        self.seen.lock().push(block.id().0);
        Ok(())
    }
}

async fn wait_until(mut predicate: impl FnMut() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within deadline");
}

#[tokio::test]
async fn every_sink_kind_receives_every_block() {
    let queue = Arc::new(DeliveryQueue::new());
    let (console, console_seen, _) = CollectingSink::new(SinkKind::Console);
    let (file, file_seen, _) = CollectingSink::new(SinkKind::File);

    let pool = WorkerPool::new();
    assert!(pool.start(Arc::clone(&queue), vec![Box::new(console), Box::new(file)]));

    let a = queue.append(vec!["a".into()]);
    let b = queue.append(vec!["b".into()]);

    wait_until(|| queue.is_empty()).await;

    let expected = vec![a.id().0, b.id().0];
    assert_eq!(*console_seen.lock(), expected);
    assert_eq!(*file_seen.lock(), expected);

    pool.stop();
    pool.join().await;
}

#[tokio::test]
async fn blocks_emitted_once_per_kind() {
    let queue = Arc::new(DeliveryQueue::new());
    let (console, console_seen, _) = CollectingSink::new(SinkKind::Console);
    let (file, file_seen, _) = CollectingSink::new(SinkKind::File);

    let pool = WorkerPool::new();
    pool.start(Arc::clone(&queue), vec![Box::new(console), Box::new(file)]);

    for i in 0..20 {
        queue.append(vec![format!("cmd{i}")]);
    }

    wait_until(|| queue.is_empty()).await;
    // Settle so any erroneous second pass would be visible
    tokio::time::sleep(Duration::from_millis(20)).await;

    for seen in [console_seen, file_seen] {
        let mut ids = seen.lock().clone();
        assert_eq!(ids.len(), 20);
        ids.dedup();
        assert_eq!(ids.len(), 20, "a block was emitted more than once");
    }

    pool.stop();
    pool.join().await;
}

#[tokio::test]
async fn failed_emit_is_retried_and_block_retained() {
    let queue = Arc::new(DeliveryQueue::new());
    let (console, console_seen, console_fail) = CollectingSink::new(SinkKind::Console);
    let (file, file_seen, _) = CollectingSink::new(SinkKind::File);
    console_fail.store(true, Ordering::Release);

    let pool = WorkerPool::new();
    pool.start(Arc::clone(&queue), vec![Box::new(console), Box::new(file)]);

    let block = queue.append(vec!["retry me".into()]);

    // File side delivers, but the block stays queued for the console
    wait_until(|| file_seen.lock().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(queue.len(), 1);
    assert!(console_seen.lock().is_empty());

    console_fail.store(false, Ordering::Release);
    wait_until(|| queue.is_empty()).await;
    assert_eq!(*console_seen.lock(), vec![block.id().0]);

    pool.stop();
    pool.join().await;
}

#[tokio::test]
async fn start_is_idempotent() {
    let queue = Arc::new(DeliveryQueue::new());
    let (console, _, _) = CollectingSink::new(SinkKind::Console);
    let (extra, extra_seen, _) = CollectingSink::new(SinkKind::Console);

    let pool = WorkerPool::new();
    assert!(pool.start(Arc::clone(&queue), vec![Box::new(console)]));
    assert!(!pool.start(Arc::clone(&queue), vec![Box::new(extra)]));
    assert!(pool.is_started());

    queue.append(vec!["once".into()]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(extra_seen.lock().is_empty(), "second start must not spawn");

    pool.stop();
    pool.join().await;
}
