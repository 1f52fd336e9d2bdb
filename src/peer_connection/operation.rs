use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use waitgroup::WaitGroup;

use crate::error::Result;

/// One queued mutation. Returning `true` asks the worker to run the
/// operation again after the rest of the queue drained; the deferred
/// negotiation-needed check relies on this.
pub(crate) struct Operation(
    pub(crate) Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = bool> + Send + 'static>>) + Send + Sync>,
);

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation").finish()
    }
}

/// FIFO serializer for the PeerConnection mutations that must not
/// interleave. One worker task drains the queue; operations may
/// enqueue further operations while running.
pub(crate) struct Operations {
    length: Arc<AtomicIsize>,
    ops_tx: Arc<mpsc::UnboundedSender<Operation>>,
    close_tx: mpsc::Sender<()>,
}

impl Operations {
    pub(crate) fn new() -> Self {
        let length = Arc::new(AtomicIsize::new(0));
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = mpsc::channel(1);
        let ops_tx = Arc::new(ops_tx);

        {
            let length = Arc::clone(&length);
            let ops_tx = Arc::clone(&ops_tx);
            tokio::spawn(async move {
                Operations::start(length, ops_tx, ops_rx, close_rx).await;
            });
        }

        Operations {
            length,
            ops_tx,
            close_tx,
        }
    }

    /// Appends an operation; execution order is submission order.
    pub(crate) async fn enqueue(&self, op: Operation) -> Result<()> {
        self.length.fetch_add(1, Ordering::SeqCst);
        let _ = self.ops_tx.send(op);

        Ok(())
    }

    pub(crate) async fn is_empty(&self) -> bool {
        self.length.load(Ordering::SeqCst) == 0
    }

    /// Barrier: resolves once everything enqueued before it ran.
    pub(crate) async fn done(&self) {
        let wg = WaitGroup::new();
        let mut worker = Some(wg.worker());
        let _ = self
            .enqueue(Operation(Box::new(move || {
                let _d = worker.take();
                Box::pin(async { false })
            })))
            .await;
        wg.wait().await;
    }

    async fn start(
        length: Arc<AtomicIsize>,
        ops_tx: Arc<mpsc::UnboundedSender<Operation>>,
        mut ops_rx: mpsc::UnboundedReceiver<Operation>,
        mut close_rx: mpsc::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = close_rx.recv() => break,
                result = ops_rx.recv() => {
                    if let Some(mut f) = result {
                        // The running op must not count itself, or an
                        // op polling is_empty() would requeue forever.
                        length.fetch_sub(1, Ordering::SeqCst);
                        if f.0().await {
                            length.fetch_add(1, Ordering::SeqCst);
                            let _ = ops_tx.send(f);
                        }
                    } else {
                        break;
                    }
                }
            }
        }
    }

    /// Stops the worker. Outstanding operations are dropped.
    pub(crate) async fn close(&self) -> Result<()> {
        let _ = self.close_tx.send(()).await;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicU32;

    use super::*;

    #[tokio::test]
    async fn test_operations_run_in_order() {
        let ops = Operations::new();
        let out = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        for i in 0..10u32 {
            let out = Arc::clone(&out);
            ops.enqueue(Operation(Box::new(move || {
                let out = Arc::clone(&out);
                Box::pin(async move {
                    out.lock().await.push(i);
                    false
                })
            })))
            .await
            .expect("enqueue");
        }

        ops.done().await;
        assert_eq!(*out.lock().await, (0..10).collect::<Vec<u32>>());
        assert!(ops.is_empty().await);

        ops.close().await.expect("close");
    }

    #[tokio::test]
    async fn test_operation_requeues_itself_once() {
        let ops = Operations::new();
        let runs = Arc::new(AtomicU32::new(0));

        let runs2 = Arc::clone(&runs);
        ops.enqueue(Operation(Box::new(move || {
            let runs = Arc::clone(&runs2);
            Box::pin(async move {
                // First run asks to go again; second run settles.
                runs.fetch_add(1, Ordering::SeqCst) == 0
            })
        })))
        .await
        .expect("enqueue");

        // The retry lands behind the first barrier; a second barrier
        // flushes it.
        ops.done().await;
        ops.done().await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        ops.close().await.expect("close");
    }

    #[tokio::test]
    async fn test_nested_enqueue() {
        let ops = Arc::new(Operations::new());
        let hit = Arc::new(AtomicU32::new(0));

        let ops2 = Arc::clone(&ops);
        let hit2 = Arc::clone(&hit);
        ops.enqueue(Operation(Box::new(move || {
            let ops = Arc::clone(&ops2);
            let hit = Arc::clone(&hit2);
            Box::pin(async move {
                let hit3 = Arc::clone(&hit);
                let _ = ops
                    .enqueue(Operation(Box::new(move || {
                        let hit = Arc::clone(&hit3);
                        Box::pin(async move {
                            hit.fetch_add(10, Ordering::SeqCst);
                            false
                        })
                    })))
                    .await;
                hit.fetch_add(1, Ordering::SeqCst);
                false
            })
        })))
        .await
        .expect("enqueue");

        ops.done().await;
        assert_eq!(hit.load(Ordering::SeqCst), 11);

        ops.close().await.expect("close");
    }
}
