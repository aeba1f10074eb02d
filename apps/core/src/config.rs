use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::history::{DEFAULT_HISTORY_PER_SOURCE, DEFAULT_QUERY_HISTORY_LIMIT};
use crate::matcher::DEFAULT_PHONETIC_MAX_LEN;

const DATA_DIR_ENV: &str = "SIFT_DATA_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid json5: {0}")]
    Json5(#[from] json5::Error),
    #[error("invalid toml: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("failed to encode toml: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("failed to encode json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchEngine {
    pub keyword: String,
    pub title: String,
    // `{q}` is replaced by the url-encoded search text.
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchConfig {
    pub suggestions_enabled: bool,
    pub engines: Vec<SearchEngine>,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            suggestions_enabled: true,
            engines: vec![
                SearchEngine {
                    keyword: "g".to_string(),
                    title: "Google".to_string(),
                    url: "https://www.google.com/search?q={q}".to_string(),
                },
                SearchEngine {
                    keyword: "wiki".to_string(),
                    title: "Wikipedia".to_string(),
                    url: "https://en.wikipedia.org/wiki/Special:Search?search={q}".to_string(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_results: u16,
    pub debounce_ms: u64,
    pub phonetic_max_len: usize,
    pub transliteration_enabled: bool,
    pub history_per_source: usize,
    pub query_history_limit: usize,
    pub plugin_paths: Vec<PathBuf>,
    pub file_roots: Vec<PathBuf>,
    pub file_max_depth: usize,
    pub web_search: WebSearchConfig,
    pub state_db_path: PathBuf,
    pub log_level: String,
    #[serde(skip)]
    pub config_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let base = stable_app_data_dir();
        Self {
            max_results: 20,
            debounce_ms: 200,
            phonetic_max_len: DEFAULT_PHONETIC_MAX_LEN,
            transliteration_enabled: true,
            history_per_source: DEFAULT_HISTORY_PER_SOURCE,
            query_history_limit: DEFAULT_QUERY_HISTORY_LIMIT,
            plugin_paths: vec![base.join("plugins")],
            file_roots: Vec::new(),
            file_max_depth: 3,
            web_search: WebSearchConfig::default(),
            state_db_path: base.join("state.sqlite3"),
            log_level: "info".to_string(),
            config_path: base.join("config.json"),
        }
    }
}

pub fn stable_app_data_dir() -> PathBuf {
    match std::env::var_os(DATA_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => std::env::temp_dir().join("sift"),
    }
}

pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.max_results < 5 || cfg.max_results > 100 {
        return Err(ConfigError::Invalid("max_results out of range".into()));
    }

    if cfg.debounce_ms > 5_000 {
        return Err(ConfigError::Invalid("debounce_ms out of range".into()));
    }

    if cfg.history_per_source == 0 || cfg.history_per_source > 1_000 {
        return Err(ConfigError::Invalid("history_per_source out of range".into()));
    }

    if cfg.query_history_limit == 0 {
        return Err(ConfigError::Invalid("query_history_limit must be positive".into()));
    }

    if cfg.state_db_path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("state_db_path is required".into()));
    }

    if cfg.config_path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("config_path is required".into()));
    }

    for engine in &cfg.web_search.engines {
        if engine.keyword.trim().is_empty() || engine.keyword.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid(format!(
                "web search engine '{}' needs a single-word keyword",
                engine.title
            )));
        }
        if !engine.url.contains("{q}") {
            return Err(ConfigError::Invalid(format!(
                "web search engine '{}' url must contain {{q}}",
                engine.title
            )));
        }
    }

    Ok(())
}

pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| Config::default().config_path);

    let mut cfg = match std::fs::read_to_string(&config_path) {
        Ok(raw) => parse(&raw, &config_path)?,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(source) => {
            return Err(ConfigError::Io {
                path: config_path,
                source,
            })
        }
    };
    cfg.config_path = config_path;
    validate(&cfg)?;
    Ok(cfg)
}

pub fn save(cfg: &Config) -> Result<(), ConfigError> {
    validate(cfg)?;
    if let Some(parent) = cfg.config_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let encoded = if is_toml(&cfg.config_path) {
        toml::to_string_pretty(cfg)?
    } else {
        serde_json::to_string_pretty(cfg)?
    };
    std::fs::write(&cfg.config_path, encoded).map_err(|source| ConfigError::Io {
        path: cfg.config_path.clone(),
        source,
    })
}

fn parse(raw: &str, path: &Path) -> Result<Config, ConfigError> {
    if is_toml(path) {
        Ok(toml::from_str(raw)?)
    } else {
        Ok(json5::from_str(raw)?)
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}
