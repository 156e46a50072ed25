use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use log::info;
use snafu::{ResultExt, Snafu};

use super::models::Settings;

const ENV_PREFIX: &str = "LITEPRINT";
const CONFIG_FILE: &str = "liteprint";

pub fn load_config() -> Result<Settings, ConfigError> {
    // As Rust has no native support for .env files,
    // we use the dotenv_flow crate to import to actual ENV vars.
    if let Ok(dotenv_path) = dotenv_flow::dotenv_flow() {
        info!("Loaded dotenv file: {:?}", dotenv_path);
    }

    build_settings(File::with_name(CONFIG_FILE).required(false), environment())
}

fn environment() -> Environment {
    Environment::default()
        .prefix(ENV_PREFIX)
        .separator("_")
        .prefix_separator("_")
        .try_parsing(true)
        .with_list_parse_key("server.allowedorigins")
        .with_list_parse_key("converter.paths")
        .with_list_parse_key("converter.programnames")
        .list_separator(",")
}

fn build_settings<F>(file: F, env: Environment) -> Result<Settings, ConfigError>
where
    F: config::Source + Send + Sync + 'static,
{
    let config = defaults()
        .context(BuildSnafu)?
        .add_source(file)
        .add_source(env)
        .build()
        .context(BuildSnafu)?;

    config.try_deserialize().context(DeserializeSnafu)
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    Config::builder()
        .set_default("server.host", "localhost")?
        .set_default("server.port", "5000")?
        .set_default("server.maxbodybytes", "67108864")?
        .set_default("server.allowedorigins", Vec::<String>::new())?
        .set_default("cups.uri", "http://localhost:631/")?
        .set_default("cups.ignoretlserrors", "true")?
        .set_default("cups.username", "")?
        .set_default("cups.password", "")?
        .set_default("cups.timeout", "5s")?
        .set_default("converter.paths", Vec::<String>::new())?
        .set_default("converter.programnames", Vec::<String>::new())?
        .set_default("job.printertimeout", "60s")?
        .set_default("job.virtualprintertimeout", "15s")?
        .set_default("job.copypause", "1s")?
        .set_default("job.cleanupdelay", "5s")?
        .set_default("job.tempdir", "")?
        .set_default("deviceid", "")?
        .set_default("sentrydsn", "")
}

// ////// //
// Errors //
// ////// //

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Could not assemble configuration sources"))]
    Build { source: config::ConfigError },
    #[snafu(display("Configuration does not match the expected settings layout"))]
    Deserialize { source: config::ConfigError },
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use config::FileFormat;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(map))
    }

    fn no_file() -> File<config::FileSourceString, FileFormat> {
        File::from_str("", FileFormat::Toml)
    }

    #[test]
    fn defaults_deserialize() {
        let settings = build_settings(no_file(), env_from(&[])).unwrap();

        assert_eq!(settings.server.host, "localhost");
        assert_eq!(settings.server.port, 5000);
        assert!(settings.server.allowed_origins.is_empty());
        assert_eq!(settings.cups.timeout, Duration::from_secs(5));
        assert_eq!(settings.job.printer_timeout, Duration::from_secs(60));
        assert_eq!(settings.job.virtual_printer_timeout, Duration::from_secs(15));
        assert_eq!(settings.job.cleanup_delay, Duration::from_secs(5));
        assert!(settings.sentry_dsn().is_none());
        assert!(settings.device_id_override().is_none());
        assert!(!settings.converter.effective_paths().is_empty());
    }

    #[test]
    fn environment_overrides_defaults() {
        let env = env_from(&[
            ("LITEPRINT_SERVER_PORT", "5123"),
            ("LITEPRINT_SERVER_ALLOWEDORIGINS", "http://a.local,http://b.local"),
            ("LITEPRINT_JOB_COPYPAUSE", "250ms"),
            ("LITEPRINT_DEVICEID", "till-07"),
        ]);
        let settings = build_settings(no_file(), env).unwrap();

        assert_eq!(settings.server.port, 5123);
        assert_eq!(
            settings.server.allowed_origins,
            vec!["http://a.local".to_string(), "http://b.local".to_string()]
        );
        assert_eq!(settings.job.copy_pause, Duration::from_millis(250));
        assert_eq!(settings.device_id_override(), Some("till-07"));
    }

    #[test]
    fn file_values_are_layered_under_env() {
        let file = File::from_str(
            "[cups]\nuri = \"https://printhost:631/\"\n[job]\ncleanupdelay = \"10s\"\n",
            FileFormat::Toml,
        );
        let env = env_from(&[("LITEPRINT_JOB_CLEANUPDELAY", "2s")]);
        let settings = build_settings(file, env).unwrap();

        assert_eq!(settings.cups.uri, "https://printhost:631/");
        assert_eq!(settings.job.cleanup_delay, Duration::from_secs(2));
    }

    #[test]
    fn invalid_duration_is_reported() {
        let env = env_from(&[("LITEPRINT_JOB_PRINTERTIMEOUT", "soon")]);
        let err = build_settings(no_file(), env).unwrap_err();
        assert!(matches!(err, ConfigError::Deserialize { .. }));
    }
}
