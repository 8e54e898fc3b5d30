use attend_geo::{ConfiguredLocator, FixedLocator, GeoError, IpLocator};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    camera_device: Option<String>,
    model_dir: Option<PathBuf>,
    db_path: Option<PathBuf>,
    similarity_threshold: Option<f32>,
    warmup_frames: Option<usize>,
    frames_per_verify: Option<usize>,
    frames_per_enroll: Option<usize>,
    geo_endpoint: Option<String>,
    geo_token: Option<String>,
    geo_timeout_secs: Option<u64>,
    location_override: Option<String>,
}

/// Resolved configuration: environment over config file over defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Cosine similarity needed for a face to count as the registered student.
    pub similarity_threshold: f32,
    /// Frames discarded after opening the camera (auto exposure settling).
    pub warmup_frames: usize,
    /// Frames captured per attendance verification.
    pub frames_per_verify: usize,
    /// Frames captured when registering a face.
    pub frames_per_enroll: usize,
    pub geo_endpoint: String,
    pub geo_token: Option<String>,
    pub geo_timeout_secs: u64,
    /// Fixed hostel address used instead of IP lookup.
    pub location_override: Option<String>,
    /// Config file that was read, if any.
    pub source: Option<PathBuf>,
}

impl Config {
    /// Load from `explicit`, else `$ATTEND_CONFIG`, else the XDG default path.
    ///
    /// A missing file at the default path is not an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok();

        let (path, required) = match explicit
            .map(Path::to_path_buf)
            .or_else(|| env("ATTEND_CONFIG").map(PathBuf::from))
        {
            Some(p) => (p, true),
            None => (config_dir(&env).join("config.toml"), false),
        };

        let file = match std::fs::read_to_string(&path) {
            Ok(text) => Some(toml::from_str::<FileConfig>(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => None,
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let source = file.is_some().then_some(path);
        let mut cfg = Self::resolve(file.unwrap_or_default(), &env);
        cfg.source = source;
        Ok(cfg)
    }

    fn resolve(file: FileConfig, env: &dyn Fn(&str) -> Option<String>) -> Self {
        let db_path = env("ATTEND_DB_PATH")
            .map(PathBuf::from)
            .or(file.db_path)
            .unwrap_or_else(|| data_dir(env).join("attendance.db"));

        Self {
            camera_device: env("ATTEND_CAMERA_DEVICE")
                .or(file.camera_device)
                .unwrap_or_else(|| "/dev/video0".to_string()),
            model_dir: env("ATTEND_MODEL_DIR")
                .map(PathBuf::from)
                .or(file.model_dir)
                .unwrap_or_else(attend_core::default_model_dir),
            db_path,
            similarity_threshold: parsed(env, "ATTEND_SIMILARITY_THRESHOLD")
                .or(file.similarity_threshold)
                .unwrap_or(0.40),
            warmup_frames: parsed(env, "ATTEND_WARMUP_FRAMES").or(file.warmup_frames).unwrap_or(4),
            frames_per_verify: parsed(env, "ATTEND_FRAMES_PER_VERIFY")
                .or(file.frames_per_verify)
                .unwrap_or(10)
                .max(1),
            frames_per_enroll: parsed(env, "ATTEND_FRAMES_PER_ENROLL")
                .or(file.frames_per_enroll)
                .unwrap_or(5)
                .max(1),
            geo_endpoint: env("ATTEND_GEO_ENDPOINT")
                .or(file.geo_endpoint)
                .unwrap_or_else(|| attend_geo::DEFAULT_ENDPOINT.to_string()),
            geo_token: env("ATTEND_GEO_TOKEN").or(file.geo_token).filter(|t| !t.is_empty()),
            geo_timeout_secs: parsed(env, "ATTEND_GEO_TIMEOUT_SECS")
                .or(file.geo_timeout_secs)
                .unwrap_or(10),
            location_override: env("ATTEND_LOCATION")
                .or(file.location_override)
                .filter(|l| !l.is_empty()),
            source: None,
        }
    }

    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(attend_core::DETECTOR_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    pub fn recognizer_model_path(&self) -> String {
        self.model_dir
            .join(attend_core::RECOGNIZER_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// The locator this configuration asks for.
    pub fn locator(&self) -> Result<ConfiguredLocator, GeoError> {
        if let Some(address) = &self.location_override {
            return Ok(ConfiguredLocator::Fixed(FixedLocator::new(address.clone())));
        }
        Ok(ConfiguredLocator::Ip(IpLocator::new(
            self.geo_endpoint.clone(),
            self.geo_token.clone(),
            Duration::from_secs(self.geo_timeout_secs),
        )?))
    }
}

fn parsed<T: std::str::FromStr>(env: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}

fn home(env: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    PathBuf::from(env("HOME").unwrap_or_else(|| "/tmp".to_string()))
}

fn data_dir(env: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home(env).join(".local/share"))
        .join("attend")
}

fn config_dir(env: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home(env).join(".config"))
        .join("attend")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::resolve(FileConfig::default(), &env_of(&[("HOME", "/home/w")]));
        assert_eq!(cfg.camera_device, "/dev/video0");
        assert_eq!(cfg.db_path, PathBuf::from("/home/w/.local/share/attend/attendance.db"));
        assert!((cfg.similarity_threshold - 0.40).abs() < 1e-6);
        assert_eq!(cfg.frames_per_verify, 10);
        assert_eq!(cfg.frames_per_enroll, 5);
        assert_eq!(cfg.geo_endpoint, attend_geo::DEFAULT_ENDPOINT);
        assert!(cfg.location_override.is_none());
    }

    #[test]
    fn test_file_values() {
        let file: FileConfig = toml::from_str(
            r#"
            camera_device = "/dev/video2"
            db_path = "/srv/attend/hostel.db"
            similarity_threshold = 0.5
            location_override = "Pune, Maharashtra, IN"
            "#,
        )
        .unwrap();
        let cfg = Config::resolve(file, &env_of(&[]));
        assert_eq!(cfg.camera_device, "/dev/video2");
        assert_eq!(cfg.db_path, PathBuf::from("/srv/attend/hostel.db"));
        assert!((cfg.similarity_threshold - 0.5).abs() < 1e-6);
        assert_eq!(cfg.location_override.as_deref(), Some("Pune, Maharashtra, IN"));
    }

    #[test]
    fn test_env_overrides_file() {
        let file: FileConfig = toml::from_str("frames_per_verify = 3\ncamera_device = \"/dev/video2\"").unwrap();
        let cfg = Config::resolve(
            file,
            &env_of(&[("ATTEND_FRAMES_PER_VERIFY", "7"), ("ATTEND_CAMERA_DEVICE", "/dev/video4")]),
        );
        assert_eq!(cfg.frames_per_verify, 7);
        assert_eq!(cfg.camera_device, "/dev/video4");
    }

    #[test]
    fn test_bad_env_value_falls_back() {
        let file: FileConfig = toml::from_str("warmup_frames = 2").unwrap();
        let cfg = Config::resolve(file, &env_of(&[("ATTEND_WARMUP_FRAMES", "lots")]));
        assert_eq!(cfg.warmup_frames, 2);
    }

    #[test]
    fn test_frame_counts_at_least_one() {
        let cfg = Config::resolve(FileConfig::default(), &env_of(&[("ATTEND_FRAMES_PER_VERIFY", "0")]));
        assert_eq!(cfg.frames_per_verify, 1);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(toml::from_str::<FileConfig>("camera = \"/dev/video0\"").is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "model_dir = \"/opt/models\"\n").unwrap();

        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.model_dir, PathBuf::from("/opt/models"));
        assert_eq!(cfg.source.as_deref(), Some(path.as_path()));
        assert!(cfg.detector_model_path().ends_with("det_10g.onnx"));
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "warmup_frames = \"four\"").unwrap();
        assert!(matches!(Config::load(Some(&path)), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_locator_override() {
        let cfg = Config::resolve(FileConfig::default(), &env_of(&[("ATTEND_LOCATION", "Goa, IN")]));
        assert!(matches!(cfg.locator().unwrap(), ConfiguredLocator::Fixed(_)));
    }
}
