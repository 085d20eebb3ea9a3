use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::poll::PollPolicy;
use crate::prompt::PromptStyle;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_SEARCH_BASE_URL: &str = "https://api.duckduckgo.com";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerSection {
    pub port: Option<u16>,
    pub scratch_dir: Option<String>,
    pub static_dir: Option<String>,
    pub max_file_size: Option<u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModelSection {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub max_tool_rounds: Option<usize>,
    pub prompt_style: Option<PromptStyle>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PollSection {
    pub interval_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub max_status_errors: Option<u32>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchSection {
    pub enabled: Option<bool>,
    pub base_url: Option<String>,
    pub max_results: Option<usize>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScratchSection {
    pub max_age_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
}

/// Shape of `config.toml`. Every key is optional; env vars win over it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub poll: PollSection,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub scratch: ScratchSection,
}

#[derive(Clone, Debug)]
pub struct ModelConfig {
    /// `None` leaves the hosted service unconfigured; analyses then fail.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tool_rounds: usize,
    pub prompt_style: PromptStyle,
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub enabled: bool,
    pub base_url: String,
    pub max_results: usize,
}

#[derive(Clone, Debug)]
pub struct ScratchConfig {
    pub max_age: Duration,
    pub sweep_interval: Duration,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub scratch_dir: PathBuf,
    /// Directory holding the single-page front end.
    pub static_dir: PathBuf,
    pub max_file_size: u64,
    pub model: ModelConfig,
    pub poll: PollPolicy,
    pub search: SearchConfig,
    pub scratch: ScratchConfig,
}

/// Reads an env var, treating blank values as unset.
fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_var(key).and_then(|v| v.trim().parse().ok())
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        // Try to load config file
        let config_path = base_dir.join("config.toml");
        let file = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<ConfigFile>(&content)?
        } else {
            ConfigFile::default()
        };

        Self::resolve(file, &base_dir)
    }

    /// Layers env vars over `file`, then defaults over both.
    pub fn resolve(file: ConfigFile, base_dir: &std::path::Path) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let port = env_parse("PORT")
            .or(file.server.port)
            .unwrap_or(defaults.port);

        let resolve_dir = |dir: String| {
            let path = PathBuf::from(dir);
            if path.is_absolute() {
                path
            } else {
                base_dir.join(path)
            }
        };
        let scratch_dir = env_var("SCRATCH_DIR")
            .or(file.server.scratch_dir)
            .map(resolve_dir)
            .unwrap_or_else(|| base_dir.join("scratch"));
        let static_dir = env_var("STATIC_DIR")
            .or(file.server.static_dir)
            .map(resolve_dir)
            .unwrap_or_else(|| base_dir.join("static"));

        let max_file_size = env_parse("MAX_FILE_SIZE")
            .or(file.server.max_file_size)
            .unwrap_or(defaults.max_file_size);

        let prompt_style = match env_var("PROMPT_STYLE") {
            Some(raw) => raw.parse::<PromptStyle>().map_err(anyhow::Error::msg)?,
            None => file.model.prompt_style.unwrap_or(defaults.model.prompt_style),
        };

        let model = ModelConfig {
            api_key: env_var("GOOGLE_API_KEY"),
            base_url: env_var("GEMINI_BASE_URL")
                .or(file.model.base_url)
                .unwrap_or(defaults.model.base_url),
            model: env_var("GEMINI_MODEL")
                .or(file.model.model)
                .unwrap_or(defaults.model.model),
            max_tool_rounds: env_parse("AGENT_MAX_TOOL_ROUNDS")
                .or(file.model.max_tool_rounds)
                .unwrap_or(defaults.model.max_tool_rounds),
            prompt_style,
        };

        let interval_ms: u64 = env_parse("POLL_INTERVAL_MS")
            .or(file.poll.interval_ms)
            .unwrap_or(defaults.poll.interval.as_millis() as u64);
        let timeout_secs: u64 = env_parse("POLL_TIMEOUT_SECS")
            .or(file.poll.timeout_secs)
            .unwrap_or(defaults.poll.timeout.as_secs());
        if interval_ms == 0 {
            anyhow::bail!("poll interval must be greater than zero");
        }
        if timeout_secs == 0 {
            anyhow::bail!("poll timeout must be greater than zero");
        }
        let poll = PollPolicy {
            interval: Duration::from_millis(interval_ms),
            timeout: Duration::from_secs(timeout_secs),
            max_status_errors: env_parse("POLL_MAX_STATUS_ERRORS")
                .or(file.poll.max_status_errors)
                .unwrap_or(defaults.poll.max_status_errors),
        };

        let search = SearchConfig {
            enabled: env_parse("SEARCH_ENABLED")
                .or(file.search.enabled)
                .unwrap_or(defaults.search.enabled),
            base_url: env_var("SEARCH_BASE_URL")
                .or(file.search.base_url)
                .unwrap_or(defaults.search.base_url),
            max_results: env_parse("SEARCH_MAX_RESULTS")
                .or(file.search.max_results)
                .unwrap_or(defaults.search.max_results),
        };

        let scratch = ScratchConfig {
            max_age: env_parse("SCRATCH_MAX_AGE_SECS")
                .or(file.scratch.max_age_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.scratch.max_age),
            sweep_interval: env_parse("SCRATCH_SWEEP_INTERVAL_SECS")
                .or(file.scratch.sweep_interval_secs)
                .filter(|&secs: &u64| secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.scratch.sweep_interval),
        };

        Ok(Self {
            port,
            scratch_dir,
            static_dir,
            max_file_size,
            model,
            poll,
            search,
            scratch,
        })
    }

    // Falls back to defaults instead of refusing to start
    pub fn from_env() -> Self {
        Self::load().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        Self {
            port: 3000,
            scratch_dir: base_dir.join("scratch"),
            static_dir: base_dir.join("static"),
            max_file_size: 200 * 1024 * 1024,
            model: ModelConfig {
                api_key: env_var("GOOGLE_API_KEY"),
                base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
                model: DEFAULT_MODEL.to_string(),
                max_tool_rounds: 4,
                prompt_style: PromptStyle::Detailed,
            },
            poll: PollPolicy::default(),
            search: SearchConfig {
                enabled: true,
                base_url: DEFAULT_SEARCH_BASE_URL.to_string(),
                max_results: 5,
            },
            scratch: ScratchConfig {
                max_age: Duration::from_secs(3600),
                sweep_interval: Duration::from_secs(900),
            },
        }
    }
}
