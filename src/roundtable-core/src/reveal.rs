//! Incremental reveal of already-generated text.
//!
//! [`StreamingRevealer::start`] spawns a timer task that sends fixed-size
//! chunks over a channel. The returned [`RevealStream`] is a [`Stream`] that
//! yields them and then a single [`RevealEvent::Complete`]. Stopping the revealer cancels the
//! stream: nothing else is yielded afterwards, not even chunks already
//! buffered in the channel.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

/// Chunking and pacing for a reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealOptions {
    /// Characters per chunk. Zero is treated as one.
    pub chunk_size: usize,
    /// Period between chunks.
    pub delay: Duration,
}

impl Default for RevealOptions {
    fn default() -> Self {
        Self {
            chunk_size: 4,
            delay: Duration::from_millis(30),
        }
    }
}

/// Item yielded by a [`RevealStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealEvent {
    /// The next slice of content. `progress` is the 0-100 position of the
    /// cursor before this chunk.
    Chunk { text: String, progress: u8 },
    /// Every chunk has been delivered.
    Complete,
}

/// Receiving end of a reveal. Ends once the reveal has completed or been
/// stopped.
#[derive(Debug)]
pub struct RevealStream {
    inner: UnboundedReceiverStream<RevealEvent>,
    cancelled: Arc<AtomicBool>,
}

impl Stream for RevealStream {
    type Item = RevealEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Poll::Ready(None);
        }
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(_)) if self.cancelled.load(Ordering::SeqCst) => Poll::Ready(None),
            other => other,
        }
    }
}

impl RevealStream {
    /// Drain the stream. Returns the full text if the reveal completed,
    /// `None` if it was stopped first.
    pub async fn collect_text(mut self) -> Option<String> {
        let mut text = String::new();
        while let Some(event) = self.next().await {
            match event {
                RevealEvent::Chunk { text: chunk, .. } => text.push_str(&chunk),
                RevealEvent::Complete => return Some(text),
            }
        }
        None
    }
}

struct ActiveReveal {
    handle: JoinHandle<()>,
    cancelled: Arc<AtomicBool>,
}

/// Reveals one string at a time. Starting a new reveal stops the previous one.
#[derive(Default)]
pub struct StreamingRevealer {
    active: Option<ActiveReveal>,
}

impl StreamingRevealer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin revealing `content`. Must be called inside a tokio runtime.
    pub fn start(&mut self, content: impl Into<String>, options: RevealOptions) -> RevealStream {
        self.stop();

        let chars: Vec<char> = content.into().chars().collect();
        let chunk_size = options.chunk_size.max(1);
        let period = options.delay.max(Duration::from_millis(1));
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();

        debug!(chars = chars.len(), chunk_size, "Starting reveal");

        let handle = tokio::spawn(async move {
            let len = chars.len();
            let mut ticker = interval_at(Instant::now() + period, period);
            let mut cursor = 0;

            while cursor < len {
                ticker.tick().await;
                let progress = (cursor * 100 / len) as u8;
                let end = (cursor + chunk_size).min(len);
                let text: String = chars[cursor..end].iter().collect();
                cursor = end;

                if tx.send(RevealEvent::Chunk { text, progress }).is_err() {
                    return;
                }
            }
            let _ = tx.send(RevealEvent::Complete);
        });

        self.active = Some(ActiveReveal {
            handle,
            cancelled: Arc::clone(&cancelled),
        });

        RevealStream {
            inner: UnboundedReceiverStream::new(rx),
            cancelled,
        }
    }

    /// Cancel the active reveal, if any. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancelled.store(true, Ordering::SeqCst);
            active.handle.abort();
            debug!("Reveal stopped");
        }
    }

    /// Whether a reveal is still emitting chunks.
    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }
}

impl Drop for StreamingRevealer {
    fn drop(&mut self) {
        self.stop();
    }
}
