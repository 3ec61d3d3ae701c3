//! Configuration types.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::assistant::AssistantType;
use crate::conversation::ContextPolicy;
use crate::error::ConfigError;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_PROVIDER_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Settings for the completion provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: SecretString,
    pub model: String,
    /// Full URL of the chat-completions endpoint.
    pub endpoint: String,
    pub temperature: f32,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_PROVIDER_URL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// Application configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub db_path: PathBuf,
    pub port: u16,
    pub context_policy: ContextPolicy,
    /// Assistant for the terminal chat; `None` runs headless.
    pub cli_assistant: Option<AssistantType>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("OPENAI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))?;

        let model = lookup("ASSISTANT_DESK_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let endpoint = lookup("ASSISTANT_DESK_PROVIDER_URL")
            .unwrap_or_else(|| DEFAULT_PROVIDER_URL.to_string());

        let temperature = match lookup("ASSISTANT_DESK_TEMPERATURE") {
            Some(raw) => parse_value::<f32>("ASSISTANT_DESK_TEMPERATURE", &raw)?,
            None => DEFAULT_TEMPERATURE,
        };

        let db_path = lookup("ASSISTANT_DESK_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/assistant-desk.db"));

        let port = match lookup("ASSISTANT_DESK_PORT") {
            Some(raw) => parse_value::<u16>("ASSISTANT_DESK_PORT", &raw)?,
            None => 8080,
        };

        let context_policy = match lookup("ASSISTANT_DESK_HISTORY_LIMIT") {
            Some(raw) => {
                let n = parse_value::<usize>("ASSISTANT_DESK_HISTORY_LIMIT", &raw)?;
                if n == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "ASSISTANT_DESK_HISTORY_LIMIT".to_string(),
                        message: "must be at least 1".to_string(),
                    });
                }
                ContextPolicy::LastMessages(n)
            }
            None => ContextPolicy::Unbounded,
        };

        let cli_assistant = match lookup("ASSISTANT_DESK_CLI") {
            Some(raw) => Some(raw.trim().parse::<AssistantType>().map_err(|message| {
                ConfigError::InvalidValue {
                    key: "ASSISTANT_DESK_CLI".to_string(),
                    message,
                }
            })?),
            None => None,
        };

        Ok(Self {
            provider: ProviderConfig {
                api_key: SecretString::from(api_key),
                model,
                endpoint,
                temperature,
            },
            db_path,
            port,
            context_policy,
            cli_assistant,
        })
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{e} (got {raw:?})"),
        })
}
