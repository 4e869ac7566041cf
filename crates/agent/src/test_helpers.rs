//! Shared test helpers for dispatcher and orchestrator tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;
use toolrelay_core::error::ProviderError;
use toolrelay_core::message::{Message, ToolCallRequest};
use toolrelay_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use toolrelay_core::schema::ParameterSchema;
use toolrelay_core::tool::{FunctionTool, Tool, ToolArguments, ToolRegistry};

/// A provider that replays scripted replies and records every request.
///
/// Panics if more calls are made than replies were scripted.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// One plain-text reply.
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![Ok(text_response(text))])
    }

    /// A tool call followed by a plain-text answer.
    pub fn tool_then_answer(name: &str, arguments: &str, answer: &str) -> Self {
        Self::new(vec![
            Ok(tool_call_response(vec![ToolCallRequest::new("call_1", name, arguments)])),
            Ok(text_response(answer)),
        ])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider: no reply scripted for call #{call}"))
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// A plain-text reply.
pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: usage(),
        model: "scripted-model".into(),
    }
}

/// A reply that requests tools and carries no text.
pub fn tool_call_response(calls: Vec<ToolCallRequest>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_tool_calls(None, calls),
        usage: usage(),
        model: "scripted-model".into(),
    }
}

/// The built-in arithmetic tools.
pub fn math_registry() -> ToolRegistry {
    toolrelay_tools::default_registry()
}

/// A no-argument tool that counts its invocations.
pub fn counting_tool(name: &str) -> (Box<dyn Tool>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let tool = FunctionTool::new(
        name,
        "Counts how often it runs",
        ParameterSchema::new(),
        move |_: &ToolArguments| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!("ok"))
        },
    );
    (Box::new(tool), calls)
}
