use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const DEFAULT_ENDPOINT: &str = "https://intern-test-frontend-mbcr.onrender.com";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
/// `PARLEY_ENDPOINT` overrides the service endpoint.
pub const ENV_PREFIX: &str = "PARLEY_";

/// Connection settings for the chat service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl ClientSettings {
    /// Default settings pointed at `endpoint`.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
        .normalized()
    }

    /// Defaults layered under the environment. Only the endpoint is read from it.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed(ENV_PREFIX).only(&["endpoint"]))
    }

    pub fn from_figment(figment: &Figment) -> Result<Self, SettingsError> {
        let settings = figment
            .extract::<Self>()
            .context(ExtractSettingsSnafu {
                stage: "extract-client-settings",
            })?;
        Ok(settings.normalized())
    }

    /// Loads settings from the environment, falling back to defaults on error.
    pub fn load() -> Self {
        match Self::from_figment(&Self::figment()) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(error = %error, "invalid client settings, using defaults");
                Self::default()
            }
        }
    }

    pub fn normalized(mut self) -> Self {
        let endpoint = self.endpoint.trim().trim_end_matches('/');
        self.endpoint = if endpoint.is_empty() {
            default_endpoint()
        } else {
            endpoint.to_string()
        };
        if self.connect_timeout_secs == 0 {
            self.connect_timeout_secs = default_connect_timeout_secs();
        }
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to extract client settings on `{stage}`: {source}"))]
    ExtractSettings {
        stage: &'static str,
        source: figment::Error,
    },
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layered_endpoint_is_normalized() {
        let figment = Figment::from(Serialized::defaults(ClientSettings::default()))
            .merge(Serialized::default("endpoint", "  http://localhost:8000/  "));

        let settings = ClientSettings::from_figment(&figment).expect("settings should extract");

        assert_eq!(settings.endpoint, "http://localhost:8000");
        assert_eq!(settings.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let settings = ClientSettings {
            endpoint: "   ".to_string(),
            connect_timeout_secs: 0,
        }
        .normalized();

        assert_eq!(settings, ClientSettings::default());
    }

    #[test]
    fn mistyped_value_is_an_extract_error() {
        let figment = Figment::from(Serialized::defaults(ClientSettings::default()))
            .merge(Serialized::default("connect_timeout_secs", "soon"));

        assert!(matches!(
            ClientSettings::from_figment(&figment),
            Err(SettingsError::ExtractSettings { .. })
        ));
    }
}
