//! Invoker-scoped response channel.
//!
//! Every invocation carries a channel back to the invoker. The channel is
//! stateful: the first message is a `reply`, anything after a reply or a
//! deferral must be a `follow_up`. [`respond`] picks the right method.

use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseState {
    NotResponded,
    Deferred,
    Responded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub content: String,
    /// Only visible to the invoker
    #[serde(default)]
    pub ephemeral: bool,
}

impl ResponsePayload {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: false,
        }
    }

    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
        }
    }
}

#[async_trait]
pub trait ResponseChannel: Send + Sync {
    async fn reply(&self, payload: ResponsePayload) -> anyhow::Result<()>;
    async fn follow_up(&self, payload: ResponsePayload) -> anyhow::Result<()>;
    /// Acknowledge now, answer later with `follow_up`.
    async fn defer(&self) -> anyhow::Result<()>;
    fn state(&self) -> ResponseState;
}

/// Send `payload` with whichever method the channel's current state allows.
pub async fn respond(channel: &dyn ResponseChannel, payload: ResponsePayload) -> anyhow::Result<()> {
    match channel.state() {
        ResponseState::NotResponded => channel.reply(payload).await,
        ResponseState::Deferred | ResponseState::Responded => channel.follow_up(payload).await,
    }
}

/// One entry of an incremental-suggestion answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionChoice {
    pub name: String,
    pub value: serde_json::Value,
}

impl SuggestionChoice {
    pub fn new(name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Delivery side of a suggestion request.
#[async_trait]
pub trait SuggestionSink: Send + Sync {
    async fn suggest(&self, choices: Vec<SuggestionChoice>) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct BufferedSuggestionSink {
    choices: Mutex<Option<Vec<SuggestionChoice>>>,
}

impl BufferedSuggestionSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` until a suggestion answer was delivered.
    pub fn choices(&self) -> Option<Vec<SuggestionChoice>> {
        self.choices.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl SuggestionSink for BufferedSuggestionSink {
    async fn suggest(&self, choices: Vec<SuggestionChoice>) -> anyhow::Result<()> {
        let mut guard = self
            .choices
            .lock()
            .map_err(|_| anyhow!("Failed to lock suggestion buffer"))?;
        *guard = Some(choices);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMethod {
    Reply,
    FollowUp,
    Defer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentResponse {
    pub method: ResponseMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<ResponsePayload>,
}

struct BufferState {
    state: ResponseState,
    sent: Vec<SentResponse>,
}

/// Response channel that keeps every message in memory.
///
/// Used by the HTTP gateway, which returns the buffered messages in the
/// response body, and by tests. A channel built with [`failing`] rejects every
/// send, which is how delivery failures are exercised.
///
/// [`failing`]: BufferedResponseChannel::failing
pub struct BufferedResponseChannel {
    inner: Mutex<BufferState>,
    fail_sends: bool,
}

impl BufferedResponseChannel {
    pub fn new() -> Self {
        Self::with_state(ResponseState::NotResponded)
    }

    pub fn with_state(state: ResponseState) -> Self {
        Self {
            inner: Mutex::new(BufferState {
                state,
                sent: Vec::new(),
            }),
            fail_sends: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_sends: true,
            ..Self::new()
        }
    }

    pub fn sent(&self) -> Vec<SentResponse> {
        self.inner
            .lock()
            .map(|guard| guard.sent.clone())
            .unwrap_or_default()
    }

    /// Payloads only, in send order (deferrals carry none).
    pub fn messages(&self) -> Vec<ResponsePayload> {
        self.sent().into_iter().filter_map(|s| s.payload).collect()
    }

    fn record(
        &self,
        method: ResponseMethod,
        payload: Option<ResponsePayload>,
        allowed: &[ResponseState],
        next: ResponseState,
    ) -> anyhow::Result<()> {
        if self.fail_sends {
            return Err(anyhow!("response channel closed"));
        }
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("Failed to lock response buffer"))?;
        if !allowed.contains(&guard.state) {
            return Err(anyhow!(
                "cannot {:?} when channel is {:?}",
                method,
                guard.state
            ));
        }
        guard.state = next;
        guard.sent.push(SentResponse { method, payload });
        Ok(())
    }
}

impl Default for BufferedResponseChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponseChannel for BufferedResponseChannel {
    async fn reply(&self, payload: ResponsePayload) -> anyhow::Result<()> {
        self.record(
            ResponseMethod::Reply,
            Some(payload),
            &[ResponseState::NotResponded],
            ResponseState::Responded,
        )
    }

    async fn follow_up(&self, payload: ResponsePayload) -> anyhow::Result<()> {
        self.record(
            ResponseMethod::FollowUp,
            Some(payload),
            &[ResponseState::Deferred, ResponseState::Responded],
            ResponseState::Responded,
        )
    }

    async fn defer(&self) -> anyhow::Result<()> {
        self.record(
            ResponseMethod::Defer,
            None,
            &[ResponseState::NotResponded],
            ResponseState::Deferred,
        )
    }

    fn state(&self) -> ResponseState {
        self.inner
            .lock()
            .map(|guard| guard.state)
            .unwrap_or(ResponseState::Responded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn respond_replies_first_then_follows_up() {
        let channel = BufferedResponseChannel::new();
        respond(&channel, ResponsePayload::text("one")).await.unwrap();
        respond(&channel, ResponsePayload::text("two")).await.unwrap();

        let methods: Vec<_> = channel.sent().iter().map(|s| s.method).collect();
        assert_eq!(methods, vec![ResponseMethod::Reply, ResponseMethod::FollowUp]);
    }

    #[tokio::test]
    async fn respond_follows_up_after_defer() {
        let channel = BufferedResponseChannel::new();
        channel.defer().await.unwrap();
        assert_eq!(channel.state(), ResponseState::Deferred);

        respond(&channel, ResponsePayload::text("done")).await.unwrap();
        assert_eq!(channel.sent()[1].method, ResponseMethod::FollowUp);
        assert_eq!(channel.state(), ResponseState::Responded);
    }

    #[tokio::test]
    async fn reply_twice_is_refused() {
        let channel = BufferedResponseChannel::new();
        channel.reply(ResponsePayload::text("a")).await.unwrap();
        assert!(channel.reply(ResponsePayload::text("b")).await.is_err());
        assert_eq!(channel.messages().len(), 1);
    }
}
