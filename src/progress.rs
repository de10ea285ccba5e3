//! Progress reporting for transfers

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Progress information for downloads/uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Number of bytes transferred so far
    pub completed: u64,
    /// Total bytes to transfer (if known)
    pub total: Option<u64>,
}

impl Progress {
    /// Completed share in `0.0..=1.0`, if the total is known
    pub fn fraction(&self) -> Option<f64> {
        self.total.map(|total| {
            if total == 0 {
                1.0
            } else {
                (self.completed as f64 / total as f64).min(1.0)
            }
        })
    }
}

/// Callback type for progress reporting
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync + 'static>;

/// A progress callback plus the runtime it should run on
#[derive(Clone)]
pub struct ProgressHandler {
    callback: ProgressCallback,
    runtime: Option<Handle>,
}

impl ProgressHandler {
    /// Call `callback` directly from the transfer task
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
            runtime: None,
        }
    }

    /// Deliver events on `runtime` instead, preserving their order
    pub fn on(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub(crate) fn or_on(mut self, runtime: Option<Handle>) -> Self {
        if self.runtime.is_none() {
            self.runtime = runtime;
        }
        self
    }
}

impl fmt::Debug for ProgressHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressHandler")
            .field("runtime", &self.runtime.is_some())
            .finish_non_exhaustive()
    }
}

enum Sink {
    Inline(ProgressCallback),
    Channel(mpsc::UnboundedSender<Progress>),
}

struct Inner {
    sink: Option<Sink>,
    token: CancellationToken,
    last: AtomicU64,
}

/// Handed to transports to publish progress for one operation
///
/// Events are dropped once the operation is cancelled, and an event whose
/// byte count is lower than one already delivered is discarded.
#[derive(Clone)]
pub struct ProgressReporter {
    inner: Arc<Inner>,
}

impl ProgressReporter {
    pub(crate) fn new(handler: Option<ProgressHandler>, token: CancellationToken) -> Self {
        let sink = handler.map(|handler| match handler.runtime {
            None => Sink::Inline(handler.callback),
            Some(runtime) => {
                let (tx, mut rx) = mpsc::unbounded_channel::<Progress>();
                let callback = handler.callback;
                let token = token.clone();
                runtime.spawn(async move {
                    while let Some(progress) = rx.recv().await {
                        if token.is_cancelled() {
                            break;
                        }
                        callback(progress);
                    }
                });
                Sink::Channel(tx)
            }
        });

        Self {
            inner: Arc::new(Inner {
                sink,
                token,
                last: AtomicU64::new(0),
            }),
        }
    }

    /// A reporter with no sink and its own cancellation token
    pub fn detached() -> Self {
        Self::new(None, CancellationToken::new())
    }

    /// Publish `completed` of `total` bytes
    pub fn report(&self, completed: u64, total: Option<u64>) {
        let Some(sink) = &self.inner.sink else {
            return;
        };
        if self.inner.token.is_cancelled() {
            return;
        }
        let previous = self.inner.last.fetch_max(completed, Ordering::AcqRel);
        if completed < previous {
            return;
        }

        let progress = Progress { completed, total };
        tracing::trace!(completed, ?total, "progress");
        match sink {
            Sink::Inline(callback) => callback(progress),
            Sink::Channel(tx) => {
                let _ = tx.send(progress);
            }
        }
    }

    /// Whether the owning operation was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Resolves once the owning operation is cancelled
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
