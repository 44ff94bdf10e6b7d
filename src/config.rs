use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::processor::{
    calculator::DEFAULT_RATED_CURRENT_AMPS, persister::DEFAULT_COLLECTION,
    validator::DEFAULT_TOLERANCE_AMPS,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Configs {
    pub processor: ProcessorConfig,
    #[serde(default)]
    pub mongo: MongoConfig,
    pub mqtt: MqttConfig,
    pub http: Option<HttpConfig>,

    #[serde(skip)]
    config_path: PathBuf,
}

impl Configs {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        let mut configs = Self::from_toml(&config_content)?;
        configs.config_path = path.as_ref().to_path_buf();
        Ok(configs)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let configs: Configs = toml::from_str(content)?;
        configs.validate()?;
        Ok(configs)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let processor = &self.processor;

        if processor.project_id.trim().is_empty() {
            return Err(ConfigError::Invalid("processor.project_id is required".into()));
        }
        if processor.egress_topic_id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "processor.egress_topic_id is required".into(),
            ));
        }
        if processor.egress_topic_id.contains(['+', '#']) {
            return Err(ConfigError::Invalid(format!(
                "processor.egress_topic_id '{}' must not contain wildcards",
                processor.egress_topic_id
            )));
        }
        if processor.persist_collection.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "processor.persist_collection must not be empty".into(),
            ));
        }
        if !processor.current_tolerance_amps.is_finite() || processor.current_tolerance_amps < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "processor.current_tolerance_amps must be a non-negative number, got {}",
                processor.current_tolerance_amps
            )));
        }
        if !processor.rated_current_amps.is_finite() || processor.rated_current_amps <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "processor.rated_current_amps must be positive, got {}",
                processor.rated_current_amps
            )));
        }
        if processor.publish_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "processor.publish_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.mqtt.ingress_topic.trim().is_empty() {
            return Err(ConfigError::Invalid("mqtt.ingress_topic is required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProcessorConfig {
    pub project_id: String,
    pub egress_topic_id: String,
    #[serde(default = "default_collection")]
    pub persist_collection: String,
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
    #[serde(default = "default_tolerance")]
    pub current_tolerance_amps: f64,
    #[serde(default = "default_rated_current")]
    pub rated_current_amps: f64,
    #[serde(default)]
    pub force_update: bool,
    #[serde(default = "default_invocation_timeout_ms")]
    pub invocation_timeout_ms: u64,
}

impl ProcessorConfig {
    pub fn new(project_id: impl Into<String>, egress_topic_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            egress_topic_id: egress_topic_id.into(),
            persist_collection: default_collection(),
            publish_timeout_ms: default_publish_timeout_ms(),
            current_tolerance_amps: default_tolerance(),
            rated_current_amps: default_rated_current(),
            force_update: false,
            invocation_timeout_ms: default_invocation_timeout_ms(),
        }
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation_timeout_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MongoConfig {
    pub uri: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive: u16,
    pub ingress_topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ca_cert: Option<String>,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConfig {
    pub bind: SocketAddr,
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_publish_timeout_ms() -> u64 {
    10_000
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE_AMPS
}

fn default_rated_current() -> f64 {
    DEFAULT_RATED_CURRENT_AMPS
}

fn default_invocation_timeout_ms() -> u64 {
    60_000
}

fn default_client_id() -> String {
    "measurement-processor".to_string()
}

fn default_keep_alive() -> u16 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [processor]
        project_id = "savemyfuse"
        egress_topic_id = "commands/charger"

        [mqtt]
        broker = "localhost"
        port = 1883
        ingress_topic = "measurements/+"
    "#;

    #[test]
    fn applies_defaults() {
        let configs = Configs::from_toml(MINIMAL).unwrap();

        assert_eq!(configs.processor.persist_collection, "processed_measurements");
        assert_eq!(configs.processor.publish_timeout(), Duration::from_secs(10));
        assert_eq!(configs.processor.current_tolerance_amps, 0.5);
        assert_eq!(configs.processor.rated_current_amps, 16.0);
        assert!(!configs.processor.force_update);
        assert_eq!(configs.mongo.uri, "mongodb://localhost:27017");
        assert_eq!(configs.mqtt.keep_alive, 30);
        assert!(configs.http.is_none());
    }

    #[test]
    fn reads_overrides() {
        let content = r#"
            [processor]
            project_id = "savemyfuse"
            egress_topic_id = "commands/charger"
            persist_collection = "wallbox_records"
            publish_timeout_ms = 2500
            current_tolerance_amps = 1.25

            [mongo]
            uri = "mongodb://db:27017"

            [mqtt]
            broker = "broker"
            port = 8883
            ingress_topic = "measurements/#"

            [http]
            bind = "127.0.0.1:8080"
        "#;

        let configs = Configs::from_toml(content).unwrap();

        assert_eq!(configs.processor.persist_collection, "wallbox_records");
        assert_eq!(configs.processor.publish_timeout(), Duration::from_millis(2500));
        assert_eq!(configs.processor.current_tolerance_amps, 1.25);
        assert_eq!(configs.mongo.uri, "mongodb://db:27017");
        assert_eq!(
            configs.http.unwrap().bind,
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn requires_project_and_topic() {
        let missing_topic = MINIMAL.replace("egress_topic_id = \"commands/charger\"", "");
        assert!(matches!(
            Configs::from_toml(&missing_topic),
            Err(ConfigError::Parse(_))
        ));

        let empty_project = MINIMAL.replace("\"savemyfuse\"", "\"\"");
        assert!(matches!(
            Configs::from_toml(&empty_project),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_bad_values() {
        let wildcard = MINIMAL.replace("commands/charger", "commands/#");
        assert!(matches!(Configs::from_toml(&wildcard), Err(ConfigError::Invalid(_))));

        let negative = MINIMAL.replace(
            "egress_topic_id = \"commands/charger\"",
            "egress_topic_id = \"commands/charger\"\ncurrent_tolerance_amps = -1.0",
        );
        assert!(matches!(Configs::from_toml(&negative), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Configs::load_from_file("/nonexistent/processor.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
