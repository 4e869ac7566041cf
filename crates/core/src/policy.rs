//! Dispatch policy: the knobs that decide how requested tool calls are handled.

use serde::{Deserialize, Serialize};

/// What to do when the model names a tool that is not registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownToolPolicy {
    /// Fail the run with `ToolError::NotFound`.
    #[default]
    Abort,
    /// Answer the call with an error tool message and let the model respond.
    ReportToModel,
}

/// How strictly extracted arguments are checked against the tool's schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentValidation {
    /// Missing required parameters and type mismatches are rejected before
    /// the handler runs.
    #[default]
    Strict,
    /// Schema-named parameters missing from the payload reach the handler as `null`.
    Lenient,
}

/// Policy applied by the dispatcher to every assistant reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchPolicy {
    /// How many of the requested tool calls are executed, in request order.
    #[serde(default = "default_max_tool_calls_per_turn")]
    pub max_tool_calls_per_turn: usize,

    #[serde(default)]
    pub unknown_tool: UnknownToolPolicy,

    #[serde(default)]
    pub argument_validation: ArgumentValidation,
}

fn default_max_tool_calls_per_turn() -> usize {
    1
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            max_tool_calls_per_turn: default_max_tool_calls_per_turn(),
            unknown_tool: UnknownToolPolicy::default(),
            argument_validation: ArgumentValidation::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_process_a_single_call_strictly() {
        let policy = DispatchPolicy::default();
        assert_eq!(policy.max_tool_calls_per_turn, 1);
        assert_eq!(policy.unknown_tool, UnknownToolPolicy::Abort);
        assert_eq!(policy.argument_validation, ArgumentValidation::Strict);
    }

    #[test]
    fn deserializes_snake_case_variants() {
        let policy: DispatchPolicy = serde_json::from_str(
            r#"{"unknown_tool":"report_to_model","argument_validation":"lenient"}"#,
        )
        .unwrap();
        assert_eq!(policy.max_tool_calls_per_turn, 1);
        assert_eq!(policy.unknown_tool, UnknownToolPolicy::ReportToModel);
        assert_eq!(policy.argument_validation, ArgumentValidation::Lenient);
    }
}
