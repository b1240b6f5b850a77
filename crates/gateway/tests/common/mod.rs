//! Shared test harness: a scripted in-process LLM provider and state
//! assembly over an in-memory store.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;

use wh_domain::config::Config;
use wh_domain::stream::{BoxStream, StreamEvent, Usage};
use wh_domain::tool::ToolCall;
use wh_domain::Result;
use wh_gateway::state::AppState;
use wh_providers::{ChatRequest, ChatResponse, LlmProvider};
use wh_store::Store;

/// One scripted streaming completion.
#[derive(Default)]
pub struct ScriptedStream {
    /// Delay before the first event is yielded; used to hold a turn open
    /// so cancellation and busy-rejection can be exercised.
    pub pre_delay: Duration,
    pub events: Vec<StreamEvent>,
}

/// Deterministic provider: `chat_stream` pops from the stream queue,
/// `chat` (titles, summaries, subagents, stream fallback) pops from the
/// chat queue. Empty queues yield a bland default completion.
#[derive(Default)]
pub struct ScriptedProvider {
    streams: Mutex<VecDeque<ScriptedStream>>,
    chats: Mutex<VecDeque<ChatResponse>>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_stream(&self, script: ScriptedStream) {
        self.streams.lock().push_back(script);
    }

    pub fn push_chat(&self, resp: ChatResponse) {
        self.chats.lock().push_back(resp);
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
        Ok(self.chats.lock().pop_front().unwrap_or(ChatResponse {
            content: "ok".into(),
            tool_calls: Vec::new(),
            usage: None,
            finish_reason: Some("stop".into()),
        }))
    }

    async fn chat_stream(
        &self,
        _req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let script = self.streams.lock().pop_front().unwrap_or(ScriptedStream {
            pre_delay: Duration::ZERO,
            events: vec![StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            }],
        });
        let stream = async_stream::stream! {
            tokio::time::sleep(script.pre_delay).await;
            for event in script.events {
                yield Ok(event);
            }
        };
        Ok(Box::pin(stream))
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

/// Assemble an AppState over an in-memory store and a temp sandbox root.
/// The returned TempDir must be kept alive for the test's duration.
pub fn test_state(config_toml: &str, provider: Arc<ScriptedProvider>) -> (AppState, TempDir) {
    let dir = TempDir::new().unwrap();
    let mut config: Config = toml::from_str(config_toml).unwrap();
    config.data.data_dir = dir.path().to_path_buf();
    let store = Arc::new(Store::open_in_memory().unwrap());
    let state = AppState::new(Arc::new(config), store, Some(provider)).unwrap();
    (state, dir)
}

/// Tool-call completion: one call assembled from streamed fragments.
pub fn tool_call_stream(call_id: &str, tool_name: &str, args: &serde_json::Value) -> ScriptedStream {
    let args_text = args.to_string();
    let (first, second) = args_text.split_at(args_text.len() / 2);
    ScriptedStream {
        pre_delay: Duration::ZERO,
        events: vec![
            StreamEvent::ToolCallStarted {
                index: 0,
                call_id: call_id.into(),
                tool_name: tool_name.into(),
            },
            StreamEvent::ToolCallDelta {
                index: 0,
                delta: first.into(),
            },
            StreamEvent::ToolCallDelta {
                index: 0,
                delta: second.into(),
            },
            StreamEvent::Done {
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
                finish_reason: Some("tool_calls".into()),
            },
        ],
    }
}

/// Plain-text final completion.
pub fn text_stream(chunks: &[&str]) -> ScriptedStream {
    let mut events: Vec<StreamEvent> = chunks
        .iter()
        .map(|c| StreamEvent::Token {
            text: (*c).to_string(),
        })
        .collect();
    events.push(StreamEvent::Done {
        usage: Some(Usage {
            prompt_tokens: 7,
            completion_tokens: 3,
            total_tokens: 10,
        }),
        finish_reason: Some("stop".into()),
    });
    ScriptedStream {
        pre_delay: Duration::ZERO,
        events,
    }
}

/// A chat-queue response that calls one tool (used by subagent tests).
pub fn chat_tool_call(call_id: &str, tool_name: &str, args: serde_json::Value) -> ChatResponse {
    ChatResponse {
        content: String::new(),
        tool_calls: vec![ToolCall {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments: args,
        }],
        usage: None,
        finish_reason: Some("tool_calls".into()),
    }
}

pub fn chat_text(text: &str) -> ChatResponse {
    ChatResponse {
        content: text.into(),
        tool_calls: Vec::new(),
        usage: None,
        finish_reason: Some("stop".into()),
    }
}

/// Seed an old exchange so the next submission is not the session's
/// "first user message" (keeps the title task off the chat queue).
pub fn seed_history(state: &AppState, session_id: &str) {
    state.store.add_message(session_id, "user", "earlier question").unwrap();
    state
        .store
        .add_message(session_id, "assistant", "earlier answer")
        .unwrap();
}
