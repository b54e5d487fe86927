mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{LoggingSettings, ManagerSettings, Settings};

/// Prefix of the environment variables read by [`load_config`],
/// e.g. `TOPICSUB__MANAGER__SHARDS=32`.
pub const ENV_PREFIX: &str = "TOPICSUB";

/// Loads the configuration from `config/default` and the environment,
/// then merges it over the built-in defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
