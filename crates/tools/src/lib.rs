//! Built-in tool implementations for toolrelay.
//!
//! The default registry carries the two-operand arithmetic tools. Callers
//! with their own functions register them next to (or instead of) these.

pub mod arithmetic;

use toolrelay_core::tool::{Tool, ToolRegistry};

pub use arithmetic::{ArithmeticTool, Operation};

/// The built-in tools, in registration order.
pub fn builtin_tools() -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(ArithmeticTool::add()),
        Box::new(ArithmeticTool::subtract()),
        Box::new(ArithmeticTool::multiply()),
        Box::new(ArithmeticTool::divide()),
    ]
}

/// Create a registry with all built-in tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in builtin_tools() {
        if let Err(e) = registry.register(tool) {
            tracing::warn!(error = %e, "Skipping built-in tool");
        }
    }
    registry
}
