use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// File looked up in the working directory when no config path is given.
pub const DEFAULT_CONFIG_FILE: &str = "facematch.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// How a detected face is turned into the 112×112 recognizer input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropMode {
    /// Warp onto the reference landmarks; box crop when landmarks are missing.
    #[default]
    Aligned,
    /// Plain bounding-box crop.
    Box,
}

impl FromStr for CropMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aligned" => Ok(Self::Aligned),
            "box" => Ok(Self::Box),
            other => Err(format!("unknown crop mode {other:?} (expected \"aligned\" or \"box\")")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Minimum SCRFD score for a detection.
    pub confidence_threshold: f32,
    /// IoU above which overlapping detections are suppressed.
    pub nms_threshold: f32,
    /// Square model input edge in pixels.
    pub input_size: usize,
}

/// The SCRFD input edge must be a whole number of cells at the coarsest stride.
pub const INPUT_SIZE_MULTIPLE: usize = 32;

impl DetectorConfig {
    /// Reject thresholds and input sizes the detector cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_size == 0 || self.input_size % INPUT_SIZE_MULTIPLE != 0 {
            return Err(ConfigError::Invalid {
                key: "detector.input_size",
                reason: format!(
                    "must be a positive multiple of {INPUT_SIZE_MULTIPLE}, got {}",
                    self.input_size
                ),
            });
        }
        for (key, value) in [
            ("detector.confidence_threshold", self.confidence_threshold),
            ("detector.nms_threshold", self.nms_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    key,
                    reason: format!("must be between 0 and 1, got {value}"),
                });
            }
        }
        Ok(())
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            nms_threshold: 0.4,
            input_size: 640,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub crop_mode: CropMode,
    /// Best matches below this similarity are labelled unknown. Unset: always
    /// report the closest identity.
    pub min_similarity: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotateConfig {
    /// TrueType font for labels. Unset: search common system locations.
    pub font_path: Option<PathBuf>,
    /// Label glyph height in pixels.
    pub font_scale: f32,
}

impl Default for AnnotateConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            font_scale: 16.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Application configuration: defaults, then an optional TOML file, then
/// `FACEMATCH_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Folder of reference images, one identity per file.
    pub gallery_dir: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    pub detector_model: String,
    pub recognizer_model: String,
    /// ONNX Runtime intra-op threads per session.
    pub intra_threads: usize,
    pub detector: DetectorConfig,
    pub matching: MatchingConfig,
    pub annotate: AnnotateConfig,
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gallery_dir: PathBuf::from("known_faces"),
            model_dir: default_model_dir(),
            detector_model: "det_10g.onnx".to_string(),
            recognizer_model: "w600k_r50.onnx".to_string(),
            intra_threads: 2,
            detector: DetectorConfig::default(),
            matching: MatchingConfig::default(),
            annotate: AnnotateConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// `path` wins over `FACEMATCH_CONFIG`; with neither, `facematch.toml` is
    /// read from the working directory when it exists. Environment overrides
    /// are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("FACEMATCH_CONFIG").map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detector.validate()
    }

    /// Parse a TOML config file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply `FACEMATCH_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FACEMATCH_GALLERY_DIR") {
            self.gallery_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEMATCH_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEMATCH_FONT_PATH") {
            self.annotate.font_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("FACEMATCH_BIND") {
            self.server.bind = v;
        }
        set_parsed(&lookup, "FACEMATCH_CONFIDENCE_THRESHOLD", &mut self.detector.confidence_threshold);
        set_parsed(&lookup, "FACEMATCH_NMS_THRESHOLD", &mut self.detector.nms_threshold);
        set_parsed(&lookup, "FACEMATCH_INTRA_THREADS", &mut self.intra_threads);
        set_parsed(&lookup, "FACEMATCH_CROP_MODE", &mut self.matching.crop_mode);

        if let Some(v) = lookup("FACEMATCH_MIN_SIMILARITY") {
            if v.is_empty() || v.eq_ignore_ascii_case("none") {
                self.matching.min_similarity = None;
            } else if let Ok(parsed) = v.parse() {
                self.matching.min_similarity = Some(parsed);
            }
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.detector_model)
    }

    /// Path to the ArcFace recognition model.
    pub fn recognizer_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.recognizer_model)
    }
}

fn set_parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    if let Some(value) = lookup(key) {
        match value.parse() {
            Ok(parsed) => *slot = parsed,
            Err(_) => tracing::warn!(key, value = %value, "ignoring unparseable override"),
        }
    }
}

/// `$FACEMATCH_MODEL_DIR`, else `$XDG_DATA_HOME/facematch/models`, else
/// `~/.local/share/facematch/models`.
pub fn default_model_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("FACEMATCH_MODEL_DIR") {
        return PathBuf::from(dir);
    }

    std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = std::env::var_os("HOME").unwrap_or_else(|| "/tmp".into());
            PathBuf::from(home).join(".local/share")
        })
        .join("facematch")
        .join("models")
}
