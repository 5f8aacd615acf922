//! Layered configuration for the `cascade` binary
//!
//! Later layers override earlier ones:
//! - `config/default.toml`, compiled in as [`DEFAULT_CONFIG`]
//! - on-disk `config/default.toml`, `config/$CASCADE_ENV.toml` and
//!   `config/local.toml`, each optional
//! - `CASCADE_<SECTION>__<KEY>` variables, e.g. `CASCADE_ENGINE__MAX_DEPTH=5`
//!   or `CASCADE_ENGINE__RETRY__MAX_ATTEMPTS=1`

use super::config::AppConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

const ENV_PREFIX: &str = "CASCADE";
const PROFILE_VAR: &str = "CASCADE_ENV";
const DEFAULT_PROFILE: &str = "development";

/// Load configuration for the profile named by `CASCADE_ENV`
pub fn load_config() -> Result<AppConfig> {
    let profile = std::env::var(PROFILE_VAR).unwrap_or_else(|_| DEFAULT_PROFILE.to_string());
    load_profile(&profile, env_overrides())
}

fn env_overrides() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn load_profile(profile: &str, env: Environment) -> Result<AppConfig> {
    let profile_file = format!("config/{profile}");
    let mut builder =
        Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));
    for path in ["config/default", profile_file.as_str(), "config/local"] {
        builder = builder.add_source(File::with_name(path).required(false));
    }

    builder
        .add_source(env)
        .build()
        .with_context(|| format!("Failed to build configuration for profile {profile}"))?
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> config::Map<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_embedded_defaults_without_overrides() {
        let env = env_overrides().source(Some(vars(&[])));
        let config = load_profile("unit-test-missing-profile", env).unwrap();
        assert_eq!(config.engine.max_depth, 3);
        assert_eq!(config.engine.concurrency_limit, 4);
    }

    #[test]
    fn test_nested_keys_override_from_environment() {
        let env = env_overrides().source(Some(vars(&[
            ("CASCADE_ENGINE__MAX_DEPTH", "5"),
            ("CASCADE_ENGINE__RETRY__MAX_ATTEMPTS", "1"),
            ("CASCADE_TRANSPORT__ENDPOINT", "http://agent:9000/query"),
        ])));
        let config = load_profile("unit-test-missing-profile", env).unwrap();

        assert_eq!(config.engine.max_depth, 5);
        assert_eq!(config.engine.retry.max_attempts, 1);
        assert_eq!(config.transport.endpoint, "http://agent:9000/query");
        assert_eq!(config.engine.cache_capacity, 256);
    }
}
