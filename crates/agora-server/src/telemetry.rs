use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::TelemetryConfig;

const TARGETS: [&str; 8] = [
    "agora",
    "agora_types",
    "agora_stake",
    "agora_randomness",
    "agora_validation",
    "agora_dispute",
    "agora_registry",
    "agora_server",
];

/// Filter directive for `level`, scoped to the agora crates.
pub fn default_directive(level: &str) -> String {
    let mut directives: Vec<String> = TARGETS.iter().map(|t| format!("{t}={level}")).collect();
    directives.push("tower_http=info".to_string());
    directives.join(",")
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &TelemetryConfig) -> anyhow::Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directive) => EnvFilter::new(directive),
        Err(_) => EnvFilter::new(default_directive(&config.level)),
    };
    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json {
        subscriber
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .try_init()?;
    } else {
        subscriber.with(fmt::layer().compact()).try_init()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_parses() {
        let directive = default_directive("debug");
        assert!(directive.contains("agora_registry=debug"));
        let _filter = EnvFilter::new(directive);
    }
}
