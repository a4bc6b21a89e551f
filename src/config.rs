//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines the
//! model and transport constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub bot_token: String,

    /// Gemini API key
    pub gemini_api_key: String,

    /// List of chat IDs the bot answers in
    #[serde(rename = "allowed_chats")]
    pub allowed_chats_str: Option<String>,

    /// System instruction template
    #[serde(default = "default_system_prompt_path")]
    pub system_prompt_path: String,

    /// Gemini model name
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Gemini API host
    #[serde(default = "default_gemini_api_base")]
    pub gemini_api_base: String,

    /// `ffmpeg` binary used for video stickers
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// Lottie renderer command line, `{frame}` is substituted
    #[serde(default = "default_lottie_render_command")]
    pub lottie_render_command: String,

    /// How long album parts are collected before the turn is sent
    #[serde(default = "default_album_window_ms")]
    pub album_window_ms: u64,
}

fn default_system_prompt_path() -> String {
    DEFAULT_SYSTEM_PROMPT_PATH.to_string()
}

fn default_gemini_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

fn default_gemini_api_base() -> String {
    GEMINI_API_BASE.to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_lottie_render_command() -> String {
    crate::media::tools::DEFAULT_LOTTIE_RENDER_COMMAND.to_string()
}

const fn default_album_window_ms() -> u64 {
    DEFAULT_ALBUM_WINDOW_MS
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use oxide_gemini_chat::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Not checked into git
            .add_source(File::with_name("config/local").required(false))
            // Eg.. `APP__GEMINI_MODEL=gemini-2.0-flash ./target/app`
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Plain `BOT_TOKEN`, `GEMINI_API_KEY`, `ALLOWED_CHATS`; empty vars count as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        s.try_deserialize()
    }

    /// Returns the set of chat IDs the bot is allowed to answer in.
    ///
    /// Accepts comma, semicolon or whitespace separated IDs, optionally
    /// wrapped in a JSON-style list (`[-100123, 456]`).
    #[must_use]
    pub fn allowed_chats(&self) -> HashSet<i64> {
        self.allowed_chats_str
            .as_ref()
            .map(|s| {
                s.split(|c: char| c == ',' || c == ';' || c == '[' || c == ']' || c.is_whitespace())
                    .filter(|token| !token.is_empty())
                    .filter_map(|id| id.parse::<i64>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Chat allow-list, parsed once at startup and shared with the update filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedChats(HashSet<i64>);

impl AllowedChats {
    #[must_use]
    pub fn contains(&self, chat_id: i64) -> bool {
        self.0.contains(&chat_id)
    }

    /// Chat IDs in ascending order, for logging.
    #[must_use]
    pub fn sorted(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.0.iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl From<HashSet<i64>> for AllowedChats {
    fn from(ids: HashSet<i64>) -> Self {
        Self(ids)
    }
}

/// Default Gemini model
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash-latest";
/// Gemini REST API host
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
/// Default system instruction template file
pub const DEFAULT_SYSTEM_PROMPT_PATH: &str = "sys_prompt.md";
/// Default album collection window
pub const DEFAULT_ALBUM_WINDOW_MS: u64 = 1000;

// Generation parameters
/// Sampling temperature
pub const GENERATION_TEMPERATURE: f64 = 0.97;
/// Nucleus sampling threshold
pub const GENERATION_TOP_P: f64 = 0.9;
/// Top-k sampling
pub const GENERATION_TOP_K: u32 = 40;
/// Output token limit per turn
pub const GENERATION_MAX_OUTPUT_TOKENS: u32 = 6144;

/// HTTP timeout for model and geocoding calls (seconds)
pub const LLM_HTTP_TIMEOUT_SECS: u64 = 120;

/// Get the HTTP timeout from env or default.
///
/// Environment variable: `LLM_HTTP_TIMEOUT_SECS`.
#[must_use]
pub fn get_llm_http_timeout_secs() -> u64 {
    std::env::var("LLM_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LLM_HTTP_TIMEOUT_SECS)
}
