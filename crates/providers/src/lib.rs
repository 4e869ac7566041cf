//! Completion endpoint adapters for toolrelay.
//!
//! All providers implement the `toolrelay_core::Provider` trait.
//! `build_from_config` picks and constructs one from configuration.

pub mod factory;
pub mod openai_compat;

pub use factory::{build_from_config, default_base_url};
pub use openai_compat::OpenAiCompatProvider;
