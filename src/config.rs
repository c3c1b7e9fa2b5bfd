use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::assistant::{AssistantKind, AssistantOptions};
use crate::bridge::{DEFAULT_TASK_QUEUE, KeyStrategy};
use crate::error::ConfigError;
use crate::workflow::{DEFAULT_ACTIVITY_TIMEOUT, FailurePolicy};

pub const DEFAULT_LISTEN: &str = "0.0.0.0:3002";

/// Fine-tuned Canada immigration FAQ space.
pub const DEFAULT_BACKEND_URL: &str = "https://ahbarrios-faq-canada-immigration.hf.space/generate";

const CONFIG_FILE: &str = "chatbridge.toml";

/// On-disk shape. Every field is optional; env vars override file values.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    listen: Option<String>,
    task_queue: Option<String>,
    key_strategy: Option<KeyStrategy>,
    on_failure: Option<FailurePolicy>,
    activity_timeout_secs: Option<u64>,
    backend: Option<BackendSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BackendSection {
    kind: Option<AssistantKind>,
    url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub task_queue: String,
    pub key_strategy: KeyStrategy,
    pub on_failure: FailurePolicy,
    pub activity_timeout: Duration,
    pub backend: AssistantKind,
    pub assistant: AssistantOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 3002)),
            task_queue: DEFAULT_TASK_QUEUE.to_string(),
            key_strategy: KeyStrategy::default(),
            on_failure: FailurePolicy::default(),
            activity_timeout: DEFAULT_ACTIVITY_TIMEOUT,
            backend: AssistantKind::default(),
            assistant: AssistantOptions::new(DEFAULT_BACKEND_URL),
        }
    }
}

impl Config {
    /// How long the engine keeps completed executions attachable.
    pub fn retention(&self) -> Duration {
        self.key_strategy.retention()
    }

    /// Load `$CHATBRIDGE_CONFIG` (or `./chatbridge.toml` if present), then apply env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CHATBRIDGE_CONFIG")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from(CONFIG_FILE)).filter(|p| p.exists()));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|name| env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml(&text).map_err(|e| match e {
            ConfigError::File { message, .. } => ConfigError::File {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(text).map_err(|e| ConfigError::File {
            path: CONFIG_FILE.to_string(),
            message: e.to_string(),
        })?;

        let mut config = Self::default();
        if let Some(listen) = file.listen {
            config.listen = parse_listen(&listen)?;
        }
        if let Some(queue) = file.task_queue {
            config.task_queue = queue;
        }
        if let Some(keys) = file.key_strategy {
            config.key_strategy = keys;
        }
        if let Some(policy) = file.on_failure {
            config.on_failure = policy;
        }
        if let Some(secs) = file.activity_timeout_secs {
            config.activity_timeout = activity_timeout(secs, &secs.to_string())?;
        }
        if let Some(backend) = file.backend {
            if let Some(kind) = backend.kind {
                config.backend = kind;
            }
            if let Some(url) = backend.url {
                config.assistant.url = url;
            }
            config.assistant.api_key = backend.api_key.or(config.assistant.api_key);
            config.assistant.model = backend.model.or(config.assistant.model);
        }
        Ok(config)
    }

    /// Apply `CHATBRIDGE_*` overrides read through `var`.
    pub fn apply_env(
        &mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(listen) = var("CHATBRIDGE_LISTEN") {
            self.listen = parse_listen(&listen)?;
        }
        if let Some(queue) = var("CHATBRIDGE_TASK_QUEUE") {
            self.task_queue = queue;
        }
        if let Some(keys) = var("CHATBRIDGE_KEY_STRATEGY") {
            self.key_strategy = keys.parse()?;
        }
        if let Some(policy) = var("CHATBRIDGE_ON_FAILURE") {
            self.on_failure = policy.parse()?;
        }
        if let Some(secs) = var("CHATBRIDGE_ACTIVITY_TIMEOUT_SECS") {
            let parsed = secs.trim().parse::<u64>().map_err(|_| ConfigError::UnknownValue {
                field: "activity_timeout_secs",
                value: secs.clone(),
            })?;
            self.activity_timeout = activity_timeout(parsed, &secs)?;
        }
        if let Some(kind) = var("CHATBRIDGE_BACKEND") {
            self.backend = kind.parse()?;
        }
        if let Some(url) = var("CHATBRIDGE_BACKEND_URL") {
            self.assistant.url = url;
        }
        if let Some(key) = var("CHATBRIDGE_API_KEY") {
            self.assistant.api_key = Some(key);
        }
        if let Some(model) = var("CHATBRIDGE_MODEL") {
            self.assistant.model = Some(model);
        }
        Ok(())
    }
}

/// A zero budget would time every activity out before its first attempt.
fn activity_timeout(secs: u64, raw: &str) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::UnknownValue {
            field: "activity_timeout_secs",
            value: raw.to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn parse_listen(s: &str) -> Result<SocketAddr, ConfigError> {
    s.trim().parse().map_err(|_| ConfigError::UnknownValue {
        field: "listen",
        value: s.to_string(),
    })
}
