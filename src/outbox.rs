//! Serialized announcement queue.
//!
//! Every outbound message goes through one worker that sends one item, then
//! waits a fixed delay before taking the next, so a burst of changes never
//! floods the destination chats. Enqueueing never blocks; sends are
//! fire-and-forget once dequeued.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::model::ChannelClass;
use crate::telegram::Announcer;

/// A prerendered message plus routing and tag hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Announcement {
    pub class: ChannelClass,
    pub title: Option<String>,
    pub body: String,
    pub tags: Vec<String>,
}

impl Announcement {
    pub fn new(class: ChannelClass, body: impl Into<String>) -> Self {
        Self {
            class,
            title: None,
            body: body.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone)]
pub struct AnnounceQueue {
    tx: mpsc::UnboundedSender<Announcement>,
}

impl AnnounceQueue {
    /// Spawn the worker. The returned handle finishes once every queue clone
    /// is dropped and the backlog is drained.
    pub fn start(announcer: Arc<dyn Announcer>, delay: Duration) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            while process_next_task(&mut rx, announcer.as_ref()).await {
                tokio::time::sleep(delay).await;
            }
            info!("announce queue closed");
        });
        (Self { tx }, handle)
    }

    /// Returns `false` when the worker is gone.
    pub fn enqueue(&self, item: Announcement) -> bool {
        match self.tx.send(item) {
            Ok(()) => true,
            Err(err) => {
                warn!(class = ?err.0.class, "announce queue closed; dropping message");
                false
            }
        }
    }
}

/// Send the next queued announcement. Returns `false` once the queue is closed
/// and empty.
#[instrument(skip_all)]
pub async fn process_next_task(
    rx: &mut mpsc::UnboundedReceiver<Announcement>,
    announcer: &dyn Announcer,
) -> bool {
    let Some(item) = rx.recv().await else {
        return false;
    };
    if announcer.announce(&item).await {
        info!(class = ?item.class, "announcement sent");
    } else {
        warn!(class = ?item.class, title = ?item.title, "failed to announce");
    }
    true
}
