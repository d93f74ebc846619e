use anyhow::{anyhow, bail};
use config::{Config, Environment};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "CIRCECO";
pub const DEFAULT_CONFIG_PATH: &str = "circeco.yaml";
pub const DEFAULT_FAVOURITES_SOURCE: &str = "favorites";

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
pub struct CircecoConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Document store, the in-memory store is used when absent
    #[serde(default)]
    pub firestore: Option<FirestoreConfig>,
    /// Identity service, the local provider is used when absent
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
pub struct FirestoreConfig {
    pub project_id: String,
    #[serde(default)]
    #[builder(default)]
    pub database_id: Option<String>,
    /// host:port of a local emulator
    #[serde(default)]
    #[builder(default)]
    pub emulator_host: Option<String>,
    #[serde(default)]
    #[builder(default)]
    pub credentials_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[builder(default)]
pub struct AuthConfig {
    /// Web api key of the project
    pub api_key: String,
    /// Where the signed in session is kept between runs
    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,
    #[serde(default = "default_identity_url")]
    pub identity_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            session_path: default_session_path(),
            identity_url: default_identity_url(),
            token_url: default_token_url(),
        }
    }
}

fn default_session_path() -> PathBuf {
    PathBuf::from(".circeco/session.json")
}

fn default_identity_url() -> String {
    "https://identitytoolkit.googleapis.com/v1".to_string()
}

fn default_token_url() -> String {
    "https://securetoken.googleapis.com/v1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[builder(default)]
pub struct MapConfig {
    #[serde(default = "default_favourites_source")]
    pub source_id: String,
    #[serde(default = "default_favourites_source")]
    pub layer_id: String,
    /// The favourites source is written here as GeoJSON on every change
    #[serde(default)]
    pub geojson_path: Option<PathBuf>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            source_id: default_favourites_source(),
            layer_id: default_favourites_source(),
            geojson_path: None,
        }
    }
}

fn default_favourites_source() -> String {
    DEFAULT_FAVOURITES_SOURCE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[builder(default)]
pub struct SyncConfig {
    /// First delay before reopening a dropped listener
    #[serde(with = "humantime_serde", default = "default_backoff_min")]
    pub listener_backoff_min: Duration,
    #[serde(with = "humantime_serde", default = "default_backoff_max")]
    pub listener_backoff_max: Duration,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            listener_backoff_min: default_backoff_min(),
            listener_backoff_max: default_backoff_max(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_backoff_min() -> Duration {
    Duration::from_millis(500)
}

fn default_backoff_max() -> Duration {
    Duration::from_secs(30)
}

fn default_event_capacity() -> usize {
    64
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OtelProto {
    Http,
    #[default]
    Grpc,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileRotation {
    #[default]
    Daily,
    Hourly,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogSink {
    Stdout {
        #[serde(default = "default_true")]
        color: bool,
        #[serde(default)]
        json: bool,
        #[serde(default)]
        spans: bool,
    },
    File {
        path: PathBuf,
        #[serde(default)]
        json: bool,
        #[serde(default)]
        rotation: FileRotation,
        /// Older rotated files beyond this are removed, 0 keeps all
        #[serde(default)]
        max_files: usize,
        #[serde(default)]
        spans: bool,
    },
    Otel {
        #[serde(default)]
        endpoint: String,
        #[serde(default)]
        proto: OtelProto,
    },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_sample_rate")]
    pub span_sample_rate: f32,
    #[serde(default = "default_sinks")]
    pub sinks: Vec<LogSink>,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_sample_rate() -> f32 {
    1.0
}

fn default_sinks() -> Vec<LogSink> {
    vec![LogSink::Stdout {
        color: true,
        json: false,
        spans: false,
    }]
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            span_sample_rate: default_sample_rate(),
            sinks: default_sinks(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.sinks.is_empty() {
            bail!("At least one logging sink must be configured");
        }

        self.level.parse::<tracing::Level>().map_err(|_| {
            anyhow!(
                "Invalid log level: '{}'. Valid levels: trace, debug, info, warn, error",
                self.level
            )
        })?;

        if !(0.0..=1.0).contains(&self.span_sample_rate) {
            bail!(
                "span_sample_rate must be between 0.0 and 1.0, got {}",
                self.span_sample_rate
            );
        }

        let otel_sinks = self
            .sinks
            .iter()
            .filter(|s| matches!(s, LogSink::Otel { .. }))
            .count();
        if otel_sinks > 1 {
            bail!("Only one otel sink is supported, got {}", otel_sinks);
        }

        Ok(())
    }
}

impl CircecoConfig {
    /// Reads `path`, then applies `CIRCECO_*` overrides such as
    /// `CIRCECO_SYNC__EVENT_CAPACITY=128`
    pub fn load(path: &Path) -> Result<CircecoConfig, anyhow::Error> {
        let cfg = Config::builder()
            .add_source(config::File::from(path.to_path_buf()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: CircecoConfig = cfg.try_deserialize()?;
        cfg.validate()?;

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.logging.validate()?;

        if let Some(firestore) = &self.firestore {
            if firestore.project_id.trim().is_empty() {
                bail!("firestore.project_id must not be empty");
            }
        }

        if let Some(auth) = &self.auth {
            if auth.api_key.trim().is_empty() {
                bail!("auth.api_key must not be empty");
            }
        }

        if self.map.source_id.is_empty() || self.map.layer_id.is_empty() {
            bail!("map.source_id and map.layer_id must not be empty");
        }

        if self.sync.listener_backoff_min.is_zero() {
            bail!("sync.listener_backoff_min must be above zero");
        }

        if self.sync.listener_backoff_min > self.sync.listener_backoff_max {
            bail!(
                "sync.listener_backoff_min ({:?}) exceeds listener_backoff_max ({:?})",
                self.sync.listener_backoff_min,
                self.sync.listener_backoff_max
            );
        }

        if self.sync.event_capacity == 0 {
            bail!("sync.event_capacity must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_yaml(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let cfg = CircecoConfig::default();
        cfg.validate().unwrap();

        assert_eq!(cfg.map.source_id, "favorites");
        assert_eq!(cfg.map.layer_id, "favorites");
        assert!(cfg.firestore.is_none());
        assert!(cfg.auth.is_none());
    }

    #[test]
    fn test_load_yaml() {
        let file = write_yaml(
            r#"
logging:
  level: debug
  sinks:
    - type: stdout
      color: false
    - type: file
      path: logs/circeco.log
      rotation: hourly
      max_files: 3
firestore:
  project_id: circeco-dev
  emulator_host: localhost:8080
auth:
  api_key: key-123
map:
  geojson_path: out/favourites.geojson
sync:
  listener_backoff_min: 250ms
  listener_backoff_max: 10s
  event_capacity: 16
"#,
        );

        let cfg = CircecoConfig::load(file.path()).unwrap();

        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.sinks.len(), 2);
        assert!(matches!(
            cfg.logging.sinks[1],
            LogSink::File { rotation: FileRotation::Hourly, max_files: 3, .. }
        ));

        let firestore = cfg.firestore.unwrap();
        assert_eq!(firestore.project_id, "circeco-dev");
        assert_eq!(firestore.emulator_host.as_deref(), Some("localhost:8080"));

        let auth = cfg.auth.unwrap();
        assert_eq!(auth.api_key, "key-123");
        assert_eq!(auth.identity_url, "https://identitytoolkit.googleapis.com/v1");

        assert_eq!(cfg.map.source_id, "favorites");
        assert_eq!(
            cfg.map.geojson_path,
            Some(PathBuf::from("out/favourites.geojson"))
        );
        assert_eq!(cfg.sync.listener_backoff_min, Duration::from_millis(250));
        assert_eq!(cfg.sync.listener_backoff_max, Duration::from_secs(10));
        assert_eq!(cfg.sync.event_capacity, 16);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = CircecoConfig::load(Path::new("does/not/exist.yaml")).unwrap();
        assert_eq!(cfg.sync.event_capacity, 64);
    }

    #[test]
    fn test_rejects_bad_values() {
        let cfg = CircecoConfigBuilder::default()
            .sync(SyncConfig {
                listener_backoff_min: Duration::from_secs(60),
                listener_backoff_max: Duration::from_secs(1),
                ..Default::default()
            })
            .build()
            .unwrap();
        assert!(cfg.validate().is_err());

        let cfg = CircecoConfigBuilder::default()
            .auth(Some(AuthConfig::default()))
            .build()
            .unwrap();
        assert!(cfg.validate().is_err());

        let cfg = CircecoConfigBuilder::default()
            .logging(LoggingConfig {
                level: "loud".into(),
                ..Default::default()
            })
            .build()
            .unwrap();
        assert!(cfg.validate().is_err());

        let cfg = CircecoConfigBuilder::default()
            .logging(LoggingConfig {
                sinks: vec![
                    LogSink::Otel { endpoint: String::new(), proto: OtelProto::Grpc },
                    LogSink::Otel { endpoint: String::new(), proto: OtelProto::Http },
                ],
                ..Default::default()
            })
            .build()
            .unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_builder_fields() {
        let firestore = FirestoreConfigBuilder::default()
            .project_id("p".to_string())
            .build()
            .unwrap();
        assert!(firestore.database_id.is_none());

        let map = MapConfigBuilder::default()
            .geojson_path(Some(PathBuf::from("fav.geojson")))
            .build()
            .unwrap();
        assert_eq!(map.layer_id, "favorites");
    }
}
