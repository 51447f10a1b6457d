// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use serde::Deserialize;

use crate::constants;
use crate::errors::Creation;
use crate::metric::{DefaultsOverride, SortedTags};
use crate::util::{is_line_safe, parse_metric_namespace};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Raw datagrams, non-aggregated lines only.
    #[default]
    Udp,
    /// Batched HTTP `PUT` requests.
    Api,
}

/// Client configuration. Durations are expressed in milliseconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    pub transport: TransportKind,
    /// Collector host. For the api transport it may carry a scheme; `https` is assumed otherwise.
    pub host: String,
    /// Defaults to 8125 for udp and 443 for api.
    pub port: Option<u16>,
    /// Required by the api transport.
    pub token: Option<String>,
    pub timeout: u64,
    /// Added to every metric as the `app` tag.
    pub app: Option<String>,
    pub namespace: String,
    /// Log payloads instead of sending them.
    pub dry_run: bool,
    /// Tags added to every metric. They win over every other tag source.
    pub tags: SortedTags,
    /// Report buffer sizes and event loop lag through the client itself.
    pub system_stats: bool,
    /// Percentage of non-pre-aggregated observations kept, 0 to 100.
    pub sample_rate: f64,
    pub flush_interval: u64,
    /// Buffered line count that triggers an immediate flush.
    pub flush_size: usize,
    /// Gzip request bodies (api transport only).
    pub compression: bool,
    #[serde(rename = "default")]
    pub defaults: DefaultsOverride,
    pub max_aggregation_buckets: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Udp,
            host: constants::DEFAULT_HOST.to_string(),
            port: None,
            token: None,
            timeout: constants::DEFAULT_TIMEOUT_MS,
            app: None,
            namespace: constants::DEFAULT_NAMESPACE.to_string(),
            dry_run: false,
            tags: SortedTags::new(),
            system_stats: true,
            sample_rate: constants::MAX_SAMPLE_RATE,
            flush_interval: constants::DEFAULT_FLUSH_INTERVAL_MS,
            flush_size: constants::DEFAULT_FLUSH_SIZE,
            compression: false,
            defaults: DefaultsOverride::default(),
            max_aggregation_buckets: constants::MAX_AGGREGATION_BUCKETS,
        }
    }
}

impl ClientConfig {
    /// Parses a JSON document with camelCase keys; omitted keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, Creation> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Creation::InvalidConfig(format!("unreadable configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Creation> {
        if self.transport == TransportKind::Api
            && self.token.as_deref().map_or(true, |t| t.trim().is_empty())
        {
            return Err(Creation::MissingToken);
        }

        if self.host.trim().is_empty() {
            return Err(Creation::InvalidConfig("host cannot be empty".to_string()));
        }

        if self.port == Some(0) {
            return Err(Creation::InvalidConfig(
                "port must be greater than 0".to_string(),
            ));
        }

        if parse_metric_namespace(&self.namespace).is_none() {
            return Err(Creation::InvalidConfig(format!(
                "namespace '{}' must start with a letter and contain only ASCII alphanumerics, underscores, or periods",
                self.namespace
            )));
        }

        if let Some(app) = self.app.as_deref().filter(|app| !is_line_safe(app)) {
            return Err(Creation::InvalidConfig(format!(
                "app '{app}' must be non-empty without whitespace, ',' or '='"
            )));
        }

        if let Some((k, v)) = self
            .tags
            .iter()
            .find(|(k, v)| !is_line_safe(k) || !is_line_safe(v))
        {
            return Err(Creation::InvalidConfig(format!(
                "tag '{k}={v}' must be non-empty without whitespace, ',' or '='"
            )));
        }

        if !(0.0..=constants::MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(Creation::InvalidConfig(format!(
                "sample rate {} is outside 0..=100",
                self.sample_rate
            )));
        }

        if self.flush_interval == 0 {
            return Err(Creation::InvalidConfig(
                "flush interval must be greater than 0".to_string(),
            ));
        }

        if self.flush_size == 0 {
            return Err(Creation::InvalidConfig(
                "flush size must be greater than 0".to_string(),
            ));
        }

        if self.max_aggregation_buckets == 0 {
            return Err(Creation::InvalidConfig(
                "max aggregation buckets must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(match self.transport {
            TransportKind::Udp => constants::DEFAULT_UDP_PORT,
            TransportKind::Api => constants::DEFAULT_API_PORT,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_config() -> ClientConfig {
        ClientConfig {
            transport: TransportKind::Api,
            token: Some("secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port(), 8125);
        assert_eq!(config.flush_interval(), Duration::from_millis(3_000));
        assert_eq!(config.flush_size, 1_000);
        assert!(config.system_stats);
    }

    #[test]
    fn test_api_requires_token() {
        let config = ClientConfig {
            transport: TransportKind::Api,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Creation::MissingToken)));

        let config = ClientConfig {
            token: Some("  ".to_string()),
            ..config
        };
        assert!(matches!(config.validate(), Err(Creation::MissingToken)));

        assert!(api_config().validate().is_ok());
        assert_eq!(api_config().port(), 443);
    }

    #[test]
    fn test_validate_invalid_values() {
        let invalid = [
            ClientConfig {
                sample_rate: 101.0,
                ..Default::default()
            },
            ClientConfig {
                sample_rate: -1.0,
                ..Default::default()
            },
            ClientConfig {
                flush_size: 0,
                ..Default::default()
            },
            ClientConfig {
                flush_interval: 0,
                ..Default::default()
            },
            ClientConfig {
                namespace: "1app".to_string(),
                ..Default::default()
            },
            ClientConfig {
                host: " ".to_string(),
                ..Default::default()
            },
            ClientConfig {
                port: Some(0),
                ..Default::default()
            },
            ClientConfig {
                max_aggregation_buckets: 0,
                ..Default::default()
            },
            ClientConfig {
                app: Some("my app".to_string()),
                ..Default::default()
            },
            ClientConfig {
                app: Some(String::new()),
                ..Default::default()
            },
            ClientConfig {
                tags: SortedTags::from_iter([("env", "prod,eu")]),
                ..Default::default()
            },
            ClientConfig {
                tags: SortedTags::from_iter([("team name", "core")]),
                ..Default::default()
            },
        ];
        for config in invalid {
            assert!(
                matches!(config.validate(), Err(Creation::InvalidConfig(_))),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_from_json() {
        let config = ClientConfig::from_json(
            r#"{
                "transport": "api",
                "host": "https://collector.example.com",
                "token": "secret",
                "app": "billing",
                "dryRun": true,
                "systemStats": false,
                "sampleRate": 50,
                "flushInterval": 1000,
                "flushSize": 10,
                "compression": true,
                "tags": {"env": "prod"},
                "default": {"timer": {"aggregations": ["max"]}}
            }"#,
        )
        .expect("valid configuration");

        assert_eq!(config.transport, TransportKind::Api);
        assert_eq!(config.app.as_deref(), Some("billing"));
        assert!(config.dry_run);
        assert!(!config.system_stats);
        assert_eq!(config.sample_rate, 50.0);
        assert_eq!(config.flush_size, 10);
        assert!(config.compression);
        assert_eq!(config.tags.get("env"), Some("prod"));
        assert_eq!(
            config.defaults.timer.aggregations,
            Some(vec!["max".to_string()])
        );
        assert_eq!(config.namespace, "application");
        assert_eq!(config.timeout(), Duration::from_millis(5_000));
    }

    #[test]
    fn test_from_json_rejects_unsafe_app() {
        assert!(matches!(
            ClientConfig::from_json(r#"{"app": "my app"}"#),
            Err(Creation::InvalidConfig(_))
        ));
        assert!(ClientConfig::from_json(r#"{"app": "billing", "tags": {"env": "prod"}}"#).is_ok());
    }

    #[test]
    fn test_from_json_missing_token() {
        assert!(matches!(
            ClientConfig::from_json(r#"{"transport": "api"}"#),
            Err(Creation::MissingToken)
        ));
        assert!(matches!(
            ClientConfig::from_json(r#"{"transport": "carrier-pigeon"}"#),
            Err(Creation::InvalidConfig(_))
        ));
    }
}
