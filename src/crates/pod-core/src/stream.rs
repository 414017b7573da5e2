//! Typed, terminating event streams
//!
//! An [`EventStream`] carries events of type `E` from a producer to one
//! consumer and terminates on the first event matching a terminal predicate,
//! from which a result `R` is extracted. Events buffer without loss until the
//! consumer starts iterating; pushes after the terminal event are ignored.

use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

type TerminalFn<E> = dyn Fn(&E) -> bool + Send + Sync;
type ExtractFn<E, R> = dyn Fn(&E) -> R + Send + Sync;

struct Shared<E, R> {
    is_terminal: Box<TerminalFn<E>>,
    extract: Box<ExtractFn<E, R>>,
    terminated: AtomicBool,
    result: Mutex<Option<R>>,
}

/// Producer half of an event stream
pub struct EventSender<E, R> {
    tx: mpsc::UnboundedSender<E>,
    shared: Arc<Shared<E, R>>,
}

impl<E, R> Clone for EventSender<E, R> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<E, R> EventSender<E, R> {
    /// Push an event into the stream
    ///
    /// Returns false when the stream has already terminated and the event was
    /// dropped. The first terminal event stores the extracted result and
    /// closes the stream for further pushes.
    pub fn push(&self, event: E) -> bool {
        if self.shared.terminated.load(Ordering::SeqCst) {
            return false;
        }
        if (self.shared.is_terminal)(&event) {
            let result = (self.shared.extract)(&event);
            // First writer wins; a racing push observes terminated and drops
            if self.shared.terminated.swap(true, Ordering::SeqCst) {
                return false;
            }
            if let Ok(mut slot) = self.shared.result.lock() {
                *slot = Some(result);
            }
            let _ = self.tx.send(event);
            return true;
        }
        self.tx.send(event).is_ok()
    }

    /// Whether the terminal event has been pushed
    pub fn is_terminated(&self) -> bool {
        self.shared.terminated.load(Ordering::SeqCst)
    }
}

/// Consumer half of an event stream
///
/// Iterate with [`EventStream::next`] (or via the [`Stream`] impl) until the
/// terminal event, or call [`EventStream::result`] to discard intermediate
/// events and wait for the final payload.
pub struct EventStream<E, R> {
    rx: mpsc::UnboundedReceiver<E>,
    shared: Arc<Shared<E, R>>,
    done: bool,
}

impl<E, R> EventStream<E, R> {
    /// Create a connected sender/stream pair
    ///
    /// `is_terminal` identifies the terminal event; `extract` turns it into
    /// the stream's resolved value.
    pub fn channel(
        is_terminal: impl Fn(&E) -> bool + Send + Sync + 'static,
        extract: impl Fn(&E) -> R + Send + Sync + 'static,
    ) -> (EventSender<E, R>, EventStream<E, R>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            is_terminal: Box::new(is_terminal),
            extract: Box::new(extract),
            terminated: AtomicBool::new(false),
            result: Mutex::new(None),
        });
        (
            EventSender {
                tx,
                shared: shared.clone(),
            },
            EventStream {
                rx,
                shared,
                done: false,
            },
        )
    }

    /// Next event, or None once the stream has terminated
    pub async fn next(&mut self) -> Option<E> {
        if self.done {
            return None;
        }
        match self.rx.recv().await {
            Some(event) => {
                if (self.shared.is_terminal)(&event) {
                    self.done = true;
                }
                Some(event)
            }
            None => {
                self.done = true;
                None
            }
        }
    }

    /// Drain remaining events and return the extracted result
    ///
    /// Returns None when the producer went away without pushing a terminal
    /// event.
    pub async fn result(mut self) -> Option<R> {
        while self.next().await.is_some() {}
        self.shared.result.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl<E, R> Stream for EventStream<E, R>
where
    E: Unpin,
    R: Unpin,
{
    type Item = E;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<E>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if (self.shared.is_terminal)(&event) {
                    self.done = true;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
