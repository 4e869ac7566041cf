//! # toolrelay core
//!
//! Domain types, traits, and error definitions for a two-phase
//! tool-calling exchange with a language-model completion endpoint.
//!
//! Every seam is a trait here ([`Provider`], [`Tool`]); implementations live
//! in their own crates and depend inward on this one, which keeps the
//! orchestration loop testable with scripted providers and closure tools.

pub mod error;
pub mod event;
pub mod message;
pub mod policy;
pub mod provider;
pub mod schema;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus, Phase};
pub use message::{History, Message, Role, ToolCallRequest};
pub use policy::{ArgumentValidation, DispatchPolicy, UnknownToolPolicy};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolSchema, Usage};
pub use schema::{ParamType, Parameter, ParameterSchema};
pub use tool::{FunctionTool, Tool, ToolArguments, ToolRegistry};
