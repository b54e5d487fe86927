use serde::Deserialize;

/// Top-level configuration settings.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    pub manager: ManagerSettings,
    pub logging: LoggingSettings,
}

/// Configuration of a [`SubscriptionManager`](crate::subscription::SubscriptionManager).
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Number of registry map shards, rounded up to a power of two of at least 2.
    pub shards: usize,
    /// Whether `all_granted_topics` also reports topics that have a source.
    pub granted_includes_connected: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from [`Settings::default`].
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub manager: Option<PartialManagerSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialManagerSettings {
    pub shards: Option<usize>,
    pub granted_includes_connected: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            shards: 16,
            granted_includes_connected: true,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            manager: ManagerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl PartialSettings {
    /// Overlay the values that were provided on top of `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let manager = self.manager.as_ref();
        let logging = self.logging;

        Settings {
            manager: ManagerSettings {
                shards: manager
                    .and_then(|m| m.shards)
                    .unwrap_or(default.manager.shards)
                    .max(1),
                granted_includes_connected: manager
                    .and_then(|m| m.granted_includes_connected)
                    .unwrap_or(default.manager.granted_includes_connected),
            },
            logging: LoggingSettings {
                level: logging
                    .and_then(|l| l.level)
                    .unwrap_or(default.logging.level),
            },
        }
    }
}
