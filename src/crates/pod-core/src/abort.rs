//! Cooperative cancellation
//!
//! An [`AbortSignal`] is a clonable flag checked before suspension points and
//! awaited where work must stop promptly. Signals compose: a child signal is
//! aborted when any ancestor aborts or when aborted directly, so an engine can
//! merge its own controller with a caller-supplied signal. Dropping a child
//! detaches it from its ancestors.

use futures::future::select_all;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug)]
struct Inner {
    sender: watch::Sender<bool>,
    /// Receivers of every ancestor signal, outermost first
    parents: Vec<watch::Receiver<bool>>,
}

/// A composable cancellation signal
#[derive(Debug, Clone)]
pub struct AbortSignal {
    inner: Arc<Inner>,
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                sender,
                parents: Vec::new(),
            }),
        }
    }

    /// Fire the signal; idempotent
    pub fn abort(&self) {
        self.inner.sender.send_replace(true);
    }

    /// Whether this signal or any ancestor has fired
    pub fn is_aborted(&self) -> bool {
        *self.inner.sender.borrow()
            || self.inner.parents.iter().any(|parent| *parent.borrow())
    }

    /// A new signal that fires when this one fires or when aborted directly
    pub fn child(&self) -> AbortSignal {
        let mut parents = self.inner.parents.clone();
        parents.push(self.inner.sender.subscribe());
        let (sender, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner { sender, parents }),
        }
    }

    /// A new signal that fires when either input fires or when aborted
    /// directly
    pub fn merged(a: &AbortSignal, b: &AbortSignal) -> AbortSignal {
        let mut parents = a.inner.parents.clone();
        parents.push(a.inner.sender.subscribe());
        parents.extend(b.inner.parents.iter().cloned());
        parents.push(b.inner.sender.subscribe());
        let (sender, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner { sender, parents }),
        }
    }

    /// Wait until the signal fires
    pub async fn cancelled(&self) {
        if self.is_aborted() {
            return;
        }
        let mut receivers = self.inner.parents.clone();
        receivers.push(self.inner.sender.subscribe());
        let waits: Vec<Pin<Box<dyn Future<Output = ()> + Send>>> = receivers
            .into_iter()
            .map(|mut rx| {
                Box::pin(async move {
                    // A dropped ancestor sender can never fire; park forever
                    if rx.wait_for(|aborted| *aborted).await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }) as Pin<Box<dyn Future<Output = ()> + Send>>
            })
            .collect();
        select_all(waits).await;
    }

    /// Error when the signal has fired, for use at suspension points
    pub fn check(&self) -> crate::error::Result<()> {
        if self.is_aborted() {
            Err(crate::error::PodError::Cancelled)
        } else {
            Ok(())
        }
    }
}
