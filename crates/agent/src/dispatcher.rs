//! Tool-call dispatcher.
//!
//! Takes an assistant reply, routes its requested tool calls through the
//! registry and turns each handler result into a role=tool message. Every
//! selected call is resolved and its arguments checked before any handler
//! runs, so a bad request never leaves a half-executed turn behind.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{Map, Value};
use toolrelay_core::error::ToolError;
use toolrelay_core::event::{DomainEvent, EventBus};
use toolrelay_core::message::{Message, ToolCallRequest};
use toolrelay_core::policy::{ArgumentValidation, DispatchPolicy, UnknownToolPolicy};
use toolrelay_core::tool::{Tool, ToolArguments, ToolRegistry};
use tracing::{debug, warn};

/// The outcome of dispatching one assistant reply.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The reply requested no tools; its content is the final answer.
    NoToolRequested,
    /// At least one requested call was answered, in request order.
    ToolInvoked { invocations: Vec<ToolInvocation> },
}

impl DispatchOutcome {
    /// Names of the tools whose handlers ran.
    pub fn tools_used(&self) -> Vec<String> {
        match self {
            DispatchOutcome::NoToolRequested => Vec::new(),
            DispatchOutcome::ToolInvoked { invocations } => invocations
                .iter()
                .filter(|i| !i.is_error)
                .map(|i| i.name.clone())
                .collect(),
        }
    }
}

/// One answered tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// The tool name as requested by the model
    pub name: String,
    /// The request's ID, echoed in `result_message.tool_call_id`
    pub call_id: String,
    /// The role=tool message to append to history
    pub result_message: Message,
    /// True when the message reports a failure to the model instead of a result
    pub is_error: bool,
}

/// A call that passed lookup and argument checks.
enum Prepared<'r> {
    Ready {
        call: &'r ToolCallRequest,
        tool: &'r dyn Tool,
        arguments: ToolArguments,
    },
    Unknown {
        call: &'r ToolCallRequest,
    },
}

/// Routes requested tool calls to registered handlers.
#[derive(Default)]
pub struct Dispatcher {
    policy: DispatchPolicy,
    event_bus: Option<Arc<EventBus>>,
}

impl Dispatcher {
    pub fn new(policy: DispatchPolicy) -> Self {
        Self {
            policy,
            event_bus: None,
        }
    }

    /// Publish a `ToolExecuted` event for every handler run.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    /// Dispatch the tool calls requested by `reply`.
    pub async fn dispatch(
        &self,
        reply: &Message,
        registry: &ToolRegistry,
    ) -> Result<DispatchOutcome, ToolError> {
        if !reply.has_tool_calls() {
            debug!("Reply requested no tools");
            return Ok(DispatchOutcome::NoToolRequested);
        }

        let limit = self.policy.max_tool_calls_per_turn.max(1);
        let requested = reply.tool_calls.len();
        if requested > limit {
            let ignored: Vec<&str> = reply.tool_calls[limit..].iter().map(|c| c.name.as_str()).collect();
            warn!(
                requested,
                limit,
                ignored = ?ignored,
                "Reply requested more tool calls than the per-turn limit; extra calls are ignored"
            );
        }

        let prepared = reply.tool_calls[..requested.min(limit)]
            .iter()
            .map(|call| self.prepare(call, registry))
            .collect::<Result<Vec<_>, _>>()?;

        let mut invocations = Vec::with_capacity(prepared.len());
        for item in prepared {
            invocations.push(match item {
                Prepared::Ready { call, tool, arguments } => self.invoke(call, tool, arguments).await?,
                Prepared::Unknown { call } => unknown_tool_reply(call),
            });
        }

        Ok(DispatchOutcome::ToolInvoked { invocations })
    }

    fn prepare<'r>(
        &self,
        call: &'r ToolCallRequest,
        registry: &'r ToolRegistry,
    ) -> Result<Prepared<'r>, ToolError> {
        let tool = match registry.lookup(&call.name) {
            Ok(tool) => tool,
            Err(e) => {
                return match self.policy.unknown_tool {
                    UnknownToolPolicy::Abort => {
                        warn!(tool = %call.name, "Model requested an unregistered tool");
                        Err(e)
                    }
                    UnknownToolPolicy::ReportToModel => {
                        warn!(tool = %call.name, "Reporting unregistered tool back to the model");
                        Ok(Prepared::Unknown { call })
                    }
                };
            }
        };

        let raw = parse_arguments(call)?;
        let arguments = self.extract(tool, raw)?;
        Ok(Prepared::Ready { call, tool, arguments })
    }

    /// Pick the schema-named parameters out of the raw argument object.
    fn extract(&self, tool: &dyn Tool, raw: Map<String, Value>) -> Result<ToolArguments, ToolError> {
        let schema = tool.parameters();

        if self.policy.argument_validation == ArgumentValidation::Strict {
            schema.validate(&raw).map_err(|reason| ToolError::InvalidArguments {
                tool_name: tool.name().to_string(),
                reason,
            })?;
        }

        let mut extracted = Map::new();
        for param in schema.params() {
            match raw.get(&param.name) {
                Some(value) => {
                    extracted.insert(param.name.clone(), value.clone());
                }
                None if self.policy.argument_validation == ArgumentValidation::Lenient => {
                    extracted.insert(param.name.clone(), Value::Null);
                }
                None => {}
            }
        }

        let extra: Vec<&String> = raw.keys().filter(|k| schema.get(k).is_none()).collect();
        if !extra.is_empty() {
            debug!(tool = %tool.name(), extra = ?extra, "Ignoring arguments not named in the schema");
        }

        Ok(ToolArguments::new(tool.name(), extracted))
    }

    async fn invoke(
        &self,
        call: &ToolCallRequest,
        tool: &dyn Tool,
        arguments: ToolArguments,
    ) -> Result<ToolInvocation, ToolError> {
        debug!(tool = %call.name, call_id = %call.id, "Invoking tool");

        let start = Instant::now();
        let result = tool.execute(&arguments).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ToolExecuted {
                tool_name: call.name.clone(),
                success: result.is_ok(),
                duration_ms,
                timestamp: Utc::now(),
            });
        }

        let result = result.map_err(|e| match e {
            ToolError::ExecutionFailed { .. } => e,
            other => ToolError::ExecutionFailed {
                tool_name: call.name.clone(),
                reason: other.to_string(),
            },
        })?;

        let mut content = arguments.into_map();
        content.insert("result".into(), result);
        let content = Value::Object(content).to_string();

        debug!(tool = %call.name, duration_ms, content = %content, "Tool finished");

        Ok(ToolInvocation {
            name: call.name.clone(),
            call_id: call.id.clone(),
            result_message: Message::tool_result(&call.id, content),
            is_error: false,
        })
    }
}

/// Parse raw argument text into a JSON object. Blank text means no arguments.
fn parse_arguments(call: &ToolCallRequest) -> Result<Map<String, Value>, ToolError> {
    if call.arguments.trim().is_empty() {
        return Ok(Map::new());
    }

    let invalid = |reason: String| ToolError::InvalidArguments {
        tool_name: call.name.clone(),
        reason,
    };

    match serde_json::from_str::<Value>(&call.arguments) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(invalid(format!("expected a JSON object, got {other}"))),
        Err(e) => Err(invalid(format!("malformed JSON: {e}"))),
    }
}

fn unknown_tool_reply(call: &ToolCallRequest) -> ToolInvocation {
    let content = serde_json::json!({ "error": format!("unknown tool '{}'", call.name) }).to_string();
    ToolInvocation {
        name: call.name.clone(),
        call_id: call.id.clone(),
        result_message: Message::tool_result(&call.id, content),
        is_error: true,
    }
}
