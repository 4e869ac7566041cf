//! The two-phase orchestration loop.
//!
//! Phase 1 sends the history together with the registry's tool schemas.
//! If the reply requests a tool, the dispatcher runs it, the result is
//! appended, and phase 2 asks for the final answer with no tools offered.
//! At most two completion calls happen per run and nothing is retried.

use std::sync::Arc;

use chrono::Utc;
use toolrelay_core::error::{Error, ProviderError};
use toolrelay_core::event::{DomainEvent, EventBus, Phase};
use toolrelay_core::message::History;
use toolrelay_core::policy::DispatchPolicy;
use toolrelay_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolSchema, Usage};
use toolrelay_core::tool::ToolRegistry;
use tracing::{debug, info, trace, warn};

use crate::dispatcher::{DispatchOutcome, Dispatcher};

/// Where a run is in its exchange with the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    AwaitingFirstReply,
    AwaitingFinalReply,
    Done,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::AwaitingFirstReply => "awaiting_first_reply",
            RunState::AwaitingFinalReply => "awaiting_final_reply",
            RunState::Done => "done",
        };
        f.write_str(s)
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The final answer text
    pub answer: String,
    /// Tools whose handlers ran, in invocation order
    pub tools_used: Vec<String>,
    /// The full history, including every reply and tool result
    pub history: History,
    /// Number of completion calls made (1 or 2)
    pub completions: u32,
    /// Token usage summed over all completions that reported it
    pub usage: Option<Usage>,
}

impl RunOutcome {
    /// The first tool that ran, if any.
    pub fn tool_used(&self) -> Option<&str> {
        self.tools_used.first().map(String::as_str)
    }
}

/// Drives one tool-selection exchange followed by an optional answer exchange.
///
/// The orchestrator holds no per-run state, so one instance can serve any
/// number of concurrent runs against independent histories.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    dispatcher: Dispatcher,
    event_bus: Option<Arc<EventBus>>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: None,
            max_tokens: None,
            dispatcher: Dispatcher::default(),
            event_bus: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        let dispatcher = Dispatcher::new(policy);
        self.dispatcher = match &self.event_bus {
            Some(bus) => dispatcher.with_event_bus(bus.clone()),
            None => dispatcher,
        };
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        let policy = self.dispatcher.policy().clone();
        self.dispatcher = Dispatcher::new(policy).with_event_bus(event_bus.clone());
        self.event_bus = Some(event_bus);
        self
    }

    /// Run the exchange to completion and return the final answer.
    ///
    /// Every failure propagates unchanged. A run never returns a partial
    /// answer: either the endpoint produced text for the final reply or the
    /// run fails with [`ProviderError::EmptyReply`].
    pub async fn run(&self, initial_history: History, registry: &ToolRegistry) -> Result<RunOutcome, Error> {
        let mut history = initial_history;
        let mut state = RunState::AwaitingFirstReply;
        let mut usage: Option<Usage> = None;
        let mut completions = 0u32;

        info!(
            provider = self.provider.name(),
            model = %self.model,
            messages = history.len(),
            tools = registry.len(),
            "Starting run"
        );

        let schemas = registry.schemas();
        let tools = if schemas.is_empty() { None } else { Some(schemas) };

        debug!(state = %state, offered = tools.as_ref().map_or(0, Vec::len), "Requesting tool selection");
        let first = self.complete(&history, tools, Phase::ToolSelection).await?;
        completions += 1;
        usage = merge_usage(usage, first.usage);

        let reply = first.message;
        history.push(reply.clone())?;

        let outcome = self.dispatcher.dispatch(&reply, registry).await?;
        let tools_used = outcome.tools_used();

        let answer = match outcome {
            DispatchOutcome::NoToolRequested => {
                state = RunState::Done;
                debug!(state = %state, "No tool requested; first reply is the answer");
                reply.content.ok_or(ProviderError::EmptyReply)?
            }
            DispatchOutcome::ToolInvoked { invocations } => {
                for invocation in invocations {
                    history.push(invocation.result_message)?;
                }

                state = RunState::AwaitingFinalReply;
                debug!(state = %state, tools = ?tools_used, "Requesting final answer");
                let second = self.complete(&history, None, Phase::FinalAnswer).await?;
                completions += 1;
                usage = merge_usage(usage, second.usage);

                let final_reply = second.message;
                if final_reply.has_tool_calls() {
                    let ignored: Vec<&str> = final_reply.tool_calls.iter().map(|c| c.name.as_str()).collect();
                    warn!(ignored = ?ignored, "Final reply requested tools; ignoring them");
                }
                history.push(final_reply.clone())?;
                state = RunState::Done;
                final_reply.content.ok_or(ProviderError::EmptyReply)?
            }
        };

        info!(
            state = %state,
            completions,
            tools_used = ?tools_used,
            total_tokens = usage.map_or(0, |u| u.total_tokens),
            "Run finished"
        );

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::RunFinished {
                tools_used: tools_used.clone(),
                completions,
                timestamp: Utc::now(),
            });
        }

        Ok(RunOutcome {
            answer,
            tools_used,
            history,
            completions,
            usage,
        })
    }

    async fn complete(
        &self,
        history: &History,
        tools: Option<Vec<ToolSchema>>,
        phase: Phase,
    ) -> Result<ProviderResponse, ProviderError> {
        // Calls past the per-turn limit would stay unanswered in the history.
        let parallel_tool_calls = (tools.is_some()
            && self.dispatcher.policy().max_tool_calls_per_turn == 1)
            .then_some(false);
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: history.messages().to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools,
            parallel_tool_calls,
        };
        trace!(phase = ?phase, request = ?request, "Completion request");

        let response = match self.provider.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(phase = ?phase, provider = self.provider.name(), error = %e, "Completion request failed");
                return Err(e);
            }
        };

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::CompletionReceived {
                phase,
                model: response.model.clone(),
                tokens_used: response.usage.map_or(0, |u| u.total_tokens),
                timestamp: Utc::now(),
            });
        }

        trace!(phase = ?phase, reply = ?response.message, "Completion reply");
        Ok(response)
    }
}

fn merge_usage(total: Option<Usage>, next: Option<Usage>) -> Option<Usage> {
    match (total, next) {
        (Some(a), Some(b)) => Some(a.add(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use toolrelay_core::error::ToolError;
    use toolrelay_core::message::{Message, Role, ToolCallRequest};
    use toolrelay_core::policy::UnknownToolPolicy;

    fn ask(text: &str) -> History {
        History::conversation(Some("You are a helpful assistant."), text)
    }

    #[tokio::test]
    async fn no_tool_reply_is_answer_after_one_call() {
        let provider = Arc::new(ScriptedProvider::single_text("Hello"));
        let orchestrator = Orchestrator::new(provider.clone(), "test-model");

        let outcome = orchestrator.run(ask("Hi there"), &math_registry()).await.unwrap();

        assert_eq!(outcome.answer, "Hello");
        assert!(outcome.tools_used.is_empty());
        assert_eq!(outcome.tool_used(), None);
        assert_eq!(outcome.completions, 1);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(outcome.history.len(), 3);
        assert_eq!(outcome.history.last().unwrap().role, Role::Assistant);
    }

    #[tokio::test]
    async fn add_numbers_round_trip_makes_two_calls() {
        let provider = Arc::new(ScriptedProvider::tool_then_answer(
            "add_numbers",
            r#"{"num1": 12, "num2": 99}"#,
            "12 + 99 = 111",
        ));
        let orchestrator = Orchestrator::new(provider.clone(), "test-model");

        let history = ask("What is 12 + 99?");
        let outcome = orchestrator.run(history.clone(), &math_registry()).await.unwrap();

        assert_eq!(outcome.answer, "12 + 99 = 111");
        assert_eq!(outcome.tools_used, vec!["add_numbers"]);
        assert_eq!(outcome.completions, 2);

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);

        // First call: caller's history plus the tool schemas.
        assert_eq!(requests[0].messages, history.messages());
        let offered: Vec<_> = requests[0].tools.as_ref().unwrap().iter().map(|t| t.name.clone()).collect();
        assert!(offered.contains(&"add_numbers".to_string()));

        // Second call: same history plus the reply and exactly one tool result.
        let second = &requests[1].messages;
        assert!(requests[1].tools.is_none());
        assert_eq!(second.len(), history.len() + 2);
        assert_eq!(&second[..history.len()], history.messages());
        assert_eq!(second[history.len()].tool_calls[0].id, "call_1");
        let tool_msg = &second[history.len() + 1];
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool_msg.text(), r#"{"num1":12,"num2":99,"result":111}"#);

        assert_eq!(outcome.history.len(), history.len() + 3);
    }

    #[tokio::test]
    async fn reports_multiply_numbers_as_invoked_tool() {
        let provider = Arc::new(ScriptedProvider::tool_then_answer(
            "multiply_numbers",
            r#"{"num1":11,"num2":11}"#,
            "121",
        ));
        let outcome = Orchestrator::new(provider.clone(), "m")
            .run(ask("11 times 11?"), &math_registry())
            .await
            .unwrap();

        assert_eq!(outcome.tool_used(), Some("multiply_numbers"));
        let tool_msg = &provider.requests()[1].messages[3];
        assert_eq!(tool_msg.text(), r#"{"num1":11,"num2":11,"result":121}"#);
    }

    #[tokio::test]
    async fn empty_registry_offers_no_tools() {
        let provider = Arc::new(ScriptedProvider::single_text("Hello"));
        Orchestrator::new(provider.clone(), "m")
            .run(ask("Hi"), &ToolRegistry::new())
            .await
            .unwrap();
        assert!(provider.requests()[0].tools.is_none());
    }

    #[tokio::test]
    async fn sampling_options_are_forwarded() {
        let provider = Arc::new(ScriptedProvider::single_text("ok"));
        Orchestrator::new(provider.clone(), "gpt-test")
            .with_temperature(0.2)
            .with_max_tokens(64)
            .run(ask("Hi"), &math_registry())
            .await
            .unwrap();

        let request = &provider.requests()[0];
        assert_eq!(request.model, "gpt-test");
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(64));
    }

    #[tokio::test]
    async fn single_call_limit_disables_parallel_calls() {
        let provider = Arc::new(ScriptedProvider::tool_then_answer(
            "add_numbers",
            r#"{"num1": 1, "num2": 2}"#,
            "3",
        ));
        Orchestrator::new(provider.clone(), "m")
            .run(ask("1 + 2?"), &math_registry())
            .await
            .unwrap();

        let requests = provider.requests();
        assert_eq!(requests[0].parallel_tool_calls, Some(false));
        assert_eq!(requests[1].parallel_tool_calls, None);
    }

    #[tokio::test]
    async fn higher_call_limit_leaves_parallel_calls_to_endpoint() {
        let provider = Arc::new(ScriptedProvider::single_text("ok"));
        let policy = DispatchPolicy {
            max_tool_calls_per_turn: 3,
            ..DispatchPolicy::default()
        };
        Orchestrator::new(provider.clone(), "m")
            .with_policy(policy)
            .run(ask("Hi"), &math_registry())
            .await
            .unwrap();
        assert_eq!(provider.requests()[0].parallel_tool_calls, None);

        let provider = Arc::new(ScriptedProvider::single_text("ok"));
        Orchestrator::new(provider.clone(), "m")
            .run(ask("Hi"), &ToolRegistry::new())
            .await
            .unwrap();
        assert_eq!(provider.requests()[0].parallel_tool_calls, None);
    }

    #[tokio::test]
    async fn unknown_tool_aborts_after_one_call() {
        let provider = Arc::new(ScriptedProvider::tool_then_answer("launch_rockets", "{}", "never"));
        let err = Orchestrator::new(provider.clone(), "m")
            .run(ask("Go"), &math_registry())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Tool(ToolError::NotFound(_))));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_reported_to_model_when_configured() {
        let provider = Arc::new(ScriptedProvider::tool_then_answer(
            "launch_rockets",
            "{}",
            "I can't do that.",
        ));
        let policy = DispatchPolicy {
            unknown_tool: UnknownToolPolicy::ReportToModel,
            ..DispatchPolicy::default()
        };
        let outcome = Orchestrator::new(provider.clone(), "m")
            .with_policy(policy)
            .run(ask("Go"), &math_registry())
            .await
            .unwrap();

        assert_eq!(outcome.answer, "I can't do that.");
        assert!(outcome.tools_used.is_empty());
        assert_eq!(outcome.completions, 2);
        let tool_msg = &provider.requests()[1].messages[3];
        assert!(tool_msg.text().contains("unknown tool"));
    }

    #[tokio::test]
    async fn malformed_arguments_fail_run() {
        let provider = Arc::new(ScriptedProvider::tool_then_answer("add_numbers", "{num1: 1", "never"));
        let err = Orchestrator::new(provider.clone(), "m")
            .run(ask("Add"), &math_registry())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Tool(ToolError::InvalidArguments { .. })));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn handler_failure_fails_run() {
        let provider = Arc::new(ScriptedProvider::tool_then_answer(
            "divide_numbers",
            r#"{"num1": 1, "num2": 0}"#,
            "never",
        ));
        let err = Orchestrator::new(provider.clone(), "m")
            .run(ask("1/0"), &math_registry())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Tool(ToolError::ExecutionFailed { .. })));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn completion_failure_propagates() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::RateLimited {
            retry_after_secs: 3,
        })]));
        let err = Orchestrator::new(provider.clone(), "m")
            .run(ask("Hi"), &math_registry())
            .await
            .unwrap_err();
        assert!(err.is_completion_failure());
        assert!(matches!(err, Error::Provider(ProviderError::RateLimited { retry_after_secs: 3 })));
    }

    #[tokio::test]
    async fn second_completion_failure_propagates() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_call_response(vec![ToolCallRequest::new(
                "c1",
                "add_numbers",
                r#"{"num1":1,"num2":2}"#,
            )])),
            Err(ProviderError::Timeout("slow".into())),
        ]));
        let err = Orchestrator::new(provider.clone(), "m")
            .run(ask("1+2"), &math_registry())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::Timeout(_))));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn final_reply_without_text_is_an_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_call_response(vec![ToolCallRequest::new(
                "c1",
                "add_numbers",
                r#"{"num1":1,"num2":2}"#,
            )])),
            Ok(tool_call_response(vec![ToolCallRequest::new(
                "c2",
                "add_numbers",
                r#"{"num1":3,"num2":3}"#,
            )])),
        ]));
        let err = Orchestrator::new(provider.clone(), "m")
            .run(ask("1+2"), &math_registry())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::EmptyReply)));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn tool_calls_in_final_reply_are_ignored() {
        let mut final_reply = text_response("3");
        final_reply.message = Message::assistant_tool_calls(
            Some("3".into()),
            vec![ToolCallRequest::new("c2", "add_numbers", "{}")],
        );
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_call_response(vec![ToolCallRequest::new(
                "c1",
                "add_numbers",
                r#"{"num1":1,"num2":2}"#,
            )])),
            Ok(final_reply),
        ]));
        let outcome = Orchestrator::new(provider.clone(), "m")
            .run(ask("1+2"), &math_registry())
            .await
            .unwrap();
        assert_eq!(outcome.answer, "3");
        assert_eq!(outcome.tools_used, vec!["add_numbers"]);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn usage_is_summed_across_completions() {
        let provider = Arc::new(ScriptedProvider::tool_then_answer(
            "add_numbers",
            r#"{"num1":1,"num2":2}"#,
            "3",
        ));
        let outcome = Orchestrator::new(provider, "m")
            .run(ask("1+2"), &math_registry())
            .await
            .unwrap();
        let usage = outcome.usage.unwrap();
        assert_eq!(usage.total_tokens, 30);
        assert_eq!(usage.prompt_tokens, 20);
    }

    #[tokio::test]
    async fn oversized_usage_totals_saturate() {
        let mut first = tool_call_response(vec![ToolCallRequest::new(
            "c1",
            "add_numbers",
            r#"{"num1":1,"num2":2}"#,
        )]);
        first.usage = Some(Usage {
            prompt_tokens: u32::MAX,
            completion_tokens: 0,
            total_tokens: u32::MAX,
        });
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(first), Ok(text_response("3"))]));

        let outcome = Orchestrator::new(provider, "m")
            .run(ask("1+2"), &math_registry())
            .await
            .unwrap();

        let usage = outcome.usage.unwrap();
        assert_eq!(outcome.answer, "3");
        assert_eq!(usage.prompt_tokens, u32::MAX);
        assert_eq!(usage.total_tokens, u32::MAX);
        assert_eq!(usage.completion_tokens, 5);
    }

    #[tokio::test]
    async fn publishes_events_in_order() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let provider = Arc::new(ScriptedProvider::tool_then_answer(
            "add_numbers",
            r#"{"num1":1,"num2":2}"#,
            "3",
        ));
        Orchestrator::new(provider, "m")
            .with_event_bus(bus.clone())
            .run(ask("1+2"), &math_registry())
            .await
            .unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event.as_ref() {
                DomainEvent::CompletionReceived { phase, .. } => format!("completion:{phase:?}"),
                DomainEvent::ToolExecuted { tool_name, .. } => format!("tool:{tool_name}"),
                DomainEvent::RunFinished { completions, .. } => format!("finished:{completions}"),
            });
        }
        assert_eq!(
            kinds,
            vec![
                "completion:ToolSelection",
                "tool:add_numbers",
                "completion:FinalAnswer",
                "finished:2",
            ]
        );
    }

    #[tokio::test]
    async fn policy_survives_event_bus_attachment() {
        let policy = DispatchPolicy {
            unknown_tool: UnknownToolPolicy::ReportToModel,
            ..DispatchPolicy::default()
        };
        let provider = Arc::new(ScriptedProvider::tool_then_answer("nope", "{}", "sorry"));
        let outcome = Orchestrator::new(provider, "m")
            .with_policy(policy)
            .with_event_bus(Arc::new(EventBus::default()))
            .run(ask("Go"), &math_registry())
            .await
            .unwrap();
        assert_eq!(outcome.answer, "sorry");
    }

    #[tokio::test]
    async fn concurrent_runs_share_orchestrator_and_registry() {
        let registry = Arc::new(math_registry());
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(text_response("a")),
            Ok(text_response("b")),
        ]));
        let orchestrator = Arc::new(Orchestrator::new(provider.clone(), "m"));

        let (r1, r2) = tokio::join!(
            orchestrator.run(ask("one"), &registry),
            orchestrator.run(ask("two"), &registry),
        );
        let mut answers = vec![r1.unwrap().answer, r2.unwrap().answer];
        answers.sort();
        assert_eq!(answers, vec!["a", "b"]);
        assert_eq!(provider.call_count(), 2);
    }
}
