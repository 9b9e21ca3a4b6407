//! Inbox - per-persona priority queue of pending messages
//!
//! Arrivals come in through a cloneable [`InboxSender`]. Before each decision
//! the cycle drains every immediately available arrival into the queue, which
//! stays ordered by descending priority, ties by earliest `enqueued_at`.

use crate::config::InboxConfig;
use chrono::{DateTime, Utc};
use cortex_core::{clamp_unit, Error, InboxMessage, Result};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Push side of an inbox, handed to message sources.
#[derive(Clone)]
pub struct InboxSender {
    tx: mpsc::Sender<InboxMessage>,
}

impl InboxSender {
    pub async fn send(&self, msg: InboxMessage) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| Error::Internal("inbox closed".into()))
    }

    /// Non-blocking send; fails if the inbox is full or gone.
    pub fn try_send(&self, msg: InboxMessage) -> Result<()> {
        self.tx
            .try_send(msg)
            .map_err(|e| Error::Internal(format!("inbox rejected message: {}", e)))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct Inbox {
    /// Highest priority first.
    queue: Vec<InboxMessage>,
    arrivals: mpsc::Receiver<InboxMessage>,
    ttl: Duration,
}

impl Inbox {
    /// Returns `(inbox, sender)`; sources push through the sender.
    pub fn new(config: &InboxConfig) -> (Self, InboxSender) {
        let (tx, arrivals) = mpsc::channel(config.channel_capacity.max(1));
        let inbox = Self {
            queue: Vec::new(),
            arrivals,
            ttl: config.message_ttl(),
        };
        (inbox, InboxSender { tx })
    }

    pub fn enqueue(&mut self, mut msg: InboxMessage) {
        msg.priority = clamp_unit(msg.priority);
        let at = self.queue.partition_point(|m| {
            m.priority > msg.priority
                || (m.priority == msg.priority && m.enqueued_at <= msg.enqueued_at)
        });
        self.queue.insert(at, msg);
    }

    /// Move every arrival already waiting on the channel into the queue.
    pub fn drain_arrivals(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(msg) = self.arrivals.try_recv() {
            self.enqueue(msg);
            drained += 1;
        }
        if drained > 0 {
            debug!("Inbox drained {} arrivals ({} queued)", drained, self.queue.len());
        }
        drained
    }

    /// Up to `n` top entries, without removing them.
    pub fn peek(&self, n: usize) -> Vec<&InboxMessage> {
        self.queue.iter().take(n).collect()
    }

    /// Up to `n` top entries matching `filter`, without removing them.
    pub fn peek_where<F>(&self, n: usize, filter: F) -> Vec<&InboxMessage>
    where
        F: Fn(&InboxMessage) -> bool,
    {
        self.queue.iter().filter(|m| filter(m)).take(n).collect()
    }

    pub fn pop(&mut self) -> Result<InboxMessage> {
        if self.queue.is_empty() {
            return Err(Error::EmptyQueue);
        }
        Ok(self.queue.remove(0))
    }

    pub fn remove(&mut self, message_id: &str) -> Option<InboxMessage> {
        let idx = self.queue.iter().position(|m| m.message_id == message_id)?;
        Some(self.queue.remove(idx))
    }

    /// Drop and return messages that waited longer than the inbox TTL.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Vec<InboxMessage> {
        let Ok(ttl) = chrono::Duration::from_std(self.ttl) else {
            return Vec::new();
        };
        let (expired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.queue)
            .into_iter()
            .partition(|m| now - m.enqueued_at > ttl);
        self.queue = kept;
        expired
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
