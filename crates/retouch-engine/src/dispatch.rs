//! Background execution of pending work.
//!
//! Each submission runs on its own named worker thread and posts its
//! completion to a shared channel. The owner drains the channel and hands
//! each completion to whichever session is current; sessions drop
//! completions whose ticket they did not issue.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::conversation::{CompletedReply, PendingReply};
use crate::editor::{CompletedTransform, PendingTransform};
use crate::transform::{ChatClient, TransformClient};

#[derive(Debug)]
pub enum Completion {
    Transform(CompletedTransform),
    Reply(CompletedReply),
}

pub struct Dispatcher {
    transforms: Arc<TransformClient>,
    chat: Arc<ChatClient>,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
}

impl Dispatcher {
    pub fn new(transforms: Arc<TransformClient>, chat: Arc<ChatClient>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            transforms,
            chat,
            tx,
            rx,
        }
    }

    pub fn submit_transform(&self, pending: PendingTransform) -> Result<JoinHandle<()>> {
        let client = Arc::clone(&self.transforms);
        let tx = self.tx.clone();
        let name = format!("transform-{}", pending.ticket().seq());
        thread::Builder::new()
            .name(name)
            .spawn(move || {
                let completed = pending.execute(&client);
                if tx.send(Completion::Transform(completed)).is_err() {
                    tracing::debug!("dispatcher gone; transform completion dropped");
                }
            })
            .context("failed to spawn transform worker")
    }

    pub fn submit_reply(&self, pending: PendingReply) -> Result<JoinHandle<()>> {
        let client = Arc::clone(&self.chat);
        let tx = self.tx.clone();
        let name = format!("reply-{}", pending.ticket().seq());
        thread::Builder::new()
            .name(name)
            .spawn(move || {
                let completed = pending.execute(&client);
                if tx.send(Completion::Reply(completed)).is_err() {
                    tracing::debug!("dispatcher gone; reply completion dropped");
                }
            })
            .context("failed to spawn reply worker")
    }

    /// Next finished completion, if any, without blocking.
    pub fn try_next(&self) -> Option<Completion> {
        match self.rx.try_recv() {
            Ok(completion) => Some(completion),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn next_timeout(&self, timeout: Duration) -> Option<Completion> {
        match self.rx.recv_timeout(timeout) {
            Ok(completion) => Some(completion),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}
