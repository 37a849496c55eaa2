use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_DETECTION_THRESHOLD: f32 = 0.5;
const SCRFD_MODEL_FILE: &str = "det_10g.onnx";

/// CLI configuration.
///
/// Built from defaults, then an optional TOML file, then `PHOTOTAG_*`
/// environment variables, each layer overriding the previous one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    /// Path to the SQLite project database.
    pub db_path: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// App-private export directory.
    pub documents_dir: PathBuf,
    /// Photo library export directory.
    pub library_dir: PathBuf,
    /// Minimum SCRFD score for a face.
    pub detection_threshold: f32,
    /// Keep the name counter across runs so names are never reused.
    pub persist_name_counter: bool,
}

/// The optional config file. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    db_path: Option<PathBuf>,
    model_dir: Option<PathBuf>,
    documents_dir: Option<PathBuf>,
    library_dir: Option<PathBuf>,
    detection_threshold: Option<f32>,
    persist_name_counter: Option<bool>,
}

impl Config {
    /// Load using the process environment.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using `env` to look up variables.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::defaults(&env);

        let (file_path, explicit) = match env("PHOTOTAG_CONFIG") {
            Some(path) => (PathBuf::from(path), true),
            None => (config_home(&env).join("phototag").join("config.toml"), false),
        };
        if explicit || file_path.exists() {
            config.apply_file(&file_path)?;
        }

        config.apply_env(&env);
        Ok(config)
    }

    fn defaults(env: &impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = env("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| home(env).join(".local/share"))
            .join("phototag");
        let pictures = env("XDG_PICTURES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| home(env).join("Pictures"));

        Self {
            db_path: data_dir.join("projects.db"),
            model_dir: data_dir.join("models"),
            documents_dir: data_dir.join("documents"),
            library_dir: pictures.join("phototag"),
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
            persist_name_counter: true,
        }
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let file: FileConfig = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "config file loaded");

        if let Some(v) = file.db_path {
            self.db_path = v;
        }
        if let Some(v) = file.model_dir {
            self.model_dir = v;
        }
        if let Some(v) = file.documents_dir {
            self.documents_dir = v;
        }
        if let Some(v) = file.library_dir {
            self.library_dir = v;
        }
        if let Some(v) = file.detection_threshold {
            self.detection_threshold = v;
        }
        if let Some(v) = file.persist_name_counter {
            self.persist_name_counter = v;
        }
        Ok(())
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("PHOTOTAG_DB_PATH") {
            self.db_path = v.into();
        }
        if let Some(v) = env("PHOTOTAG_MODEL_DIR") {
            self.model_dir = v.into();
        }
        if let Some(v) = env("PHOTOTAG_DOCUMENTS_DIR") {
            self.documents_dir = v.into();
        }
        if let Some(v) = env("PHOTOTAG_LIBRARY_DIR") {
            self.library_dir = v.into();
        }
        self.detection_threshold =
            env_parse(env, "PHOTOTAG_DETECTION_THRESHOLD").unwrap_or(self.detection_threshold);
        if let Some(v) = env("PHOTOTAG_PERSIST_NAME_COUNTER") {
            self.persist_name_counter = !matches!(v.trim(), "0" | "false" | "no");
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join(SCRFD_MODEL_FILE)
    }
}

fn home(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

fn config_home(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home(env).join(".config"))
}

fn env_parse<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment value");
            None
        }
    }
}
