use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use retouch_contracts::{codec, ImageArtifact};

use crate::service::{ChatRequest, ContentReply, ContentRequest, GenerativeService};

/// In-memory service that replays scripted replies and records every call.
#[derive(Default)]
pub(crate) struct ScriptedService {
    generate_replies: Mutex<VecDeque<Result<ContentReply>>>,
    chat_replies: Mutex<VecDeque<Result<ContentReply>>>,
    generate_calls: Mutex<Vec<ContentRequest>>,
    chat_calls: Mutex<Vec<ChatRequest>>,
}

impl ScriptedService {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push_image(&self, artifact: &ImageArtifact) {
        self.push_generate(Ok(ContentReply::from_image(codec::encode(artifact))));
    }

    pub(crate) fn push_generate(&self, reply: Result<ContentReply>) {
        self.generate_replies.lock().unwrap().push_back(reply);
    }

    pub(crate) fn push_chat(&self, reply: Result<ContentReply>) {
        self.chat_replies.lock().unwrap().push_back(reply);
    }

    pub(crate) fn generate_calls(&self) -> Vec<ContentRequest> {
        self.generate_calls.lock().unwrap().clone()
    }

    pub(crate) fn generate_count(&self) -> usize {
        self.generate_calls.lock().unwrap().len()
    }

    pub(crate) fn chat_calls(&self) -> Vec<ChatRequest> {
        self.chat_calls.lock().unwrap().clone()
    }
}

impl GenerativeService for ScriptedService {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(&self, request: &ContentRequest) -> Result<ContentReply> {
        self.generate_calls.lock().unwrap().push(request.clone());
        self.generate_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted generate reply")))
    }

    fn chat(&self, request: &ChatRequest) -> Result<ContentReply> {
        self.chat_calls.lock().unwrap().push(request.clone());
        self.chat_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted chat reply")))
    }
}
