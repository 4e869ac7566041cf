//! `toolrelay config`: configuration management commands.

use std::path::Path;

use toolrelay_config::{API_KEY_ENV_VARS, AppConfig};

pub async fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating {}", AppConfig::resolve_path(config_path).display());

    let config = match AppConfig::load_with(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("   config error: {e}");
            return Err(e.into());
        }
    };
    println!("   parsed and validated");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   all checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   warning: {w}");
        }
    }

    println!();
    println!("   Provider:  {}", config.provider);
    println!("   Model:     {}", config.model);
    println!(
        "   Endpoint:  {}",
        config
            .api_url
            .clone()
            .unwrap_or_else(|| toolrelay_providers::default_base_url(&config.provider))
    );
    println!(
        "   Dispatch:  {} call(s) per turn, unknown tools {:?}, {:?} arguments",
        config.dispatch.max_tool_calls_per_turn,
        config.dispatch.unknown_tool,
        config.dispatch.argument_validation
    );

    Ok(())
}

/// Problems that do not stop loading but will stop `ask`.
fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if config.needs_api_key() && config.require_api_key().is_err() {
        warnings.push(format!("No API key set (set {})", API_KEY_ENV_VARS.join(" or ")));
    }
    if config.dispatch.max_tool_calls_per_turn > 1 {
        warnings.push(format!(
            "max_tool_calls_per_turn = {}: several tool results will be sent back in one turn",
            config.dispatch.max_tool_calls_per_turn
        ));
    }
    warnings
}

pub async fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config =
        AppConfig::load_with(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    if config.api_key.is_some() {
        config.api_key = Some("<redacted>".into());
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::resolve_path(config_path).display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_path();
        assert!(path.to_str().unwrap().ends_with("config.toml"));
    }

    #[test]
    fn missing_key_warns_except_for_ollama() {
        let config = AppConfig::default();
        assert!(warnings(&config).iter().any(|w| w.contains("No API key")));

        let local = AppConfig {
            provider: "ollama".into(),
            ..AppConfig::default()
        };
        assert!(warnings(&local).is_empty());
    }

    #[test]
    fn keyed_default_config_has_no_warnings() {
        let config = AppConfig {
            api_key: Some("sk-test".into()),
            ..AppConfig::default()
        };
        assert!(warnings(&config).is_empty());
    }
}
