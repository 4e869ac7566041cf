//! `toolrelay ask`: one question, at most one tool call, one answer.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use toolrelay_agent::{Orchestrator, RunOutcome};
use toolrelay_config::AppConfig;
use toolrelay_core::error::ToolError;
use toolrelay_core::event::{DomainEvent, EventBus};
use toolrelay_core::message::History;
use toolrelay_core::tool::ToolRegistry;
use toolrelay_tools::default_registry;

#[derive(clap::Args, Debug)]
pub struct AskArgs {
    /// The user message to send
    pub message: String,

    /// Replace the configured system prompt
    #[arg(long)]
    pub system: Option<String>,

    /// Override the configured model
    #[arg(short, long)]
    pub model: Option<String>,

    /// Offer only these built-in tools (comma-separated)
    #[arg(long, value_delimiter = ',', conflicts_with = "no_tools")]
    pub tools: Option<Vec<String>>,

    /// Offer no tools at all
    #[arg(long)]
    pub no_tools: bool,
}

pub async fn run(
    args: AskArgs,
    config_path: Option<&Path>,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load_with(config_path)?;
    if let Some(model) = &args.model {
        config.model = model.clone();
    }

    // Fails before any network call when no key is configured.
    let provider = toolrelay_providers::build_from_config(&config)?;
    let registry = build_registry(args.tools.as_deref(), args.no_tools)?;
    tracing::debug!(
        provider = %config.provider,
        model = %config.model,
        tools = ?registry.names(),
        "Prepared run"
    );

    let system_prompt = args.system.as_deref().unwrap_or(&config.system_prompt);
    let history = History::conversation(Some(system_prompt), args.message);

    let event_bus = Arc::new(EventBus::default());
    let mut events = event_bus.subscribe();

    let mut orchestrator = Orchestrator::new(provider, &config.model)
        .with_policy(config.dispatch.clone())
        .with_event_bus(event_bus);
    if let Some(temperature) = config.temperature {
        orchestrator = orchestrator.with_temperature(temperature);
    }
    if let Some(max_tokens) = config.max_tokens {
        orchestrator = orchestrator.with_max_tokens(max_tokens);
    }

    let outcome = orchestrator.run(history, &registry).await?;
    print!("{}", render(&outcome));

    if verbose {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        eprint!("{}", summarize(&seen));
    }

    Ok(())
}

/// The default registry, restricted to `only` or emptied by `none`.
fn build_registry(only: Option<&[String]>, none: bool) -> Result<ToolRegistry, ToolError> {
    if none {
        return Ok(ToolRegistry::new());
    }

    let mut registry = default_registry();
    if let Some(names) = only {
        let names: Vec<&str> = names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()).collect();
        registry.retain_named(&names)?;
    }
    Ok(registry)
}

/// Stdout text: one `tool: <name>` line per tool that ran, then the answer.
fn render(outcome: &RunOutcome) -> String {
    let mut out = String::new();
    for tool in &outcome.tools_used {
        let _ = writeln!(out, "tool: {tool}");
    }
    let _ = writeln!(out, "{}", outcome.answer);
    out
}

fn summarize(events: &[Arc<DomainEvent>]) -> String {
    let mut out = String::from("--- run summary ---\n");
    let mut total_tokens = 0u64;

    for event in events {
        match event.as_ref() {
            DomainEvent::CompletionReceived {
                phase,
                model,
                tokens_used,
                ..
            } => {
                total_tokens += u64::from(*tokens_used);
                let _ = writeln!(out, "completion  {phase:?} model={model} tokens={tokens_used}");
            }
            DomainEvent::ToolExecuted {
                tool_name,
                success,
                duration_ms,
                ..
            } => {
                let status = if *success { "ok" } else { "failed" };
                let _ = writeln!(out, "tool        {tool_name} {status} in {duration_ms}ms");
            }
            DomainEvent::RunFinished { completions, .. } => {
                let _ = writeln!(out, "finished    completions={completions} tokens={total_tokens}");
            }
        }
    }
    out
}
