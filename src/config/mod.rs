mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

/// Parse and validate configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./sampledrain.toml",
        "~/.config/sampledrain/config.toml",
        "/etc/sampledrain/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.drain.channel_capacity == 0 {
        anyhow::bail!("drain.channel_capacity must be greater than 0");
    }

    if config.watch.enabled && config.watch.paths.is_empty() {
        anyhow::bail!("Watching is enabled but no watch paths are configured");
    }

    for path in &config.watch.paths {
        if !path.exists() {
            tracing::warn!("Watch path does not exist: {:?}", path);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sampledrain_media::InterleaveStrategy;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.drain.strategy, InterleaveStrategy::Anchor);
        assert!(config.drain.remove_after_drain);
        assert_eq!(config.drain.channel_capacity, 64);
        assert!(!config.watch.enabled);
        assert_eq!(config.watch.settle_time_secs, 5);
        assert!(config.watch.extensions.contains(&"mp4".to_string()));
    }

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(
            r#"
            [drain]
            strategy = "chronological"
            remove_after_drain = false
            output_dir = "/tmp/out"
            channel_capacity = 8

            [watch]
            enabled = true
            paths = ["/tmp"]
            settle_time_secs = 2
            extensions = ["mp4"]
            "#,
        )
        .unwrap();

        assert_eq!(config.drain.strategy, InterleaveStrategy::Chronological);
        assert!(!config.drain.remove_after_drain);
        assert_eq!(
            config.drain.output_dir.as_deref(),
            Some(Path::new("/tmp/out"))
        );
        assert_eq!(config.drain.channel_capacity, 8);
        assert!(config.watch.enabled);
        assert_eq!(config.watch.extensions, vec!["mp4".to_string()]);
    }

    #[test]
    fn test_zero_channel_capacity_rejected() {
        let err = parse_config("[drain]\nchannel_capacity = 0\n").unwrap_err();
        assert!(err.to_string().contains("channel_capacity"));
    }

    #[test]
    fn test_watch_without_paths_rejected() {
        assert!(parse_config("[watch]\nenabled = true\n").is_err());
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        assert!(parse_config("[drain]\nstrategy = \"shuffle\"\n").is_err());
    }
}
