//! Tool trait, the abstraction over callable functions the model may request.
//!
//! A tool binds a name, a description and a parameter schema to a handler.
//! Tools are registered in the [`ToolRegistry`], which is both the source of
//! the schema payload sent to the endpoint and the routing table for dispatch.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::ToolError;
use crate::provider::ToolSchema;
use crate::schema::ParameterSchema;

/// Arguments extracted from a tool call, keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments {
    tool_name: String,
    values: Map<String, Value>,
}

impl ToolArguments {
    pub fn new(tool_name: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            values,
        }
    }

    /// Raw value of a parameter; `None` when absent.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// A numeric parameter. Fails as a handler error when the value is
    /// absent, null or not a number.
    pub fn number(&self, name: &str) -> Result<&serde_json::Number, ToolError> {
        match self.values.get(name) {
            Some(Value::Number(n)) => Ok(n),
            Some(Value::Null) | None => Err(self.failure(format!("parameter '{name}' is missing"))),
            Some(other) => Err(self.failure(format!("parameter '{name}' is not a number: {other}"))),
        }
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }

    fn failure(&self, reason: String) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.tool_name.clone(),
            reason,
        }
    }
}

/// The core Tool trait.
///
/// Handlers receive arguments already extracted (and, under strict
/// validation, checked) against [`Tool::parameters`] and return a JSON value.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "add_numbers").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// The named parameters this tool accepts.
    fn parameters(&self) -> ParameterSchema;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: &ToolArguments) -> Result<Value, ToolError>;

    /// Convert this tool into the descriptor sent to the LLM.
    fn to_schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters().to_json_schema(),
        }
    }
}

type Handler = dyn Fn(&ToolArguments) -> Result<Value, ToolError> + Send + Sync;

/// A tool backed by a plain function or closure.
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: ParameterSchema,
    handler: Box<Handler>,
}

impl FunctionTool {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParameterSchema,
        handler: F,
    ) -> Self
    where
        F: Fn(&ToolArguments) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Box::new(handler),
        }
    }
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> ParameterSchema {
        self.parameters.clone()
    }

    async fn execute(&self, arguments: &ToolArguments) -> Result<Value, ToolError> {
        (self.handler)(arguments)
    }
}

/// A registry of available tools.
///
/// Keeps registration order so the schema payload is stable across calls.
/// Read-only once built; share it between concurrent runs behind an `Arc`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if a tool with the same name already exists;
    /// the registry then keeps the first one.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(ToolError::Duplicate(name));
        }
        tracing::debug!(tool = %name, "Registered tool");
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn lookup(&self, name: &str) -> Result<&dyn Tool, ToolError> {
        self.index
            .get(name)
            .map(|&i| self.tools[i].as_ref())
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Tool descriptors in registration order (for sending to the LLM).
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.to_schema()).collect()
    }

    /// Registered tool names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Keep only the named tools. Every name must be registered.
    pub fn retain_named(&mut self, names: &[&str]) -> Result<(), ToolError> {
        if let Some(missing) = names.iter().find(|n| !self.index.contains_key(**n)) {
            return Err(ToolError::NotFound((*missing).to_string()));
        }
        self.tools.retain(|t| names.contains(&t.name()));
        self.index = self
            .tools
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name().to_string(), i))
            .collect();
        Ok(())
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
