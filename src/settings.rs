use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_LANGUAGE: &str = "hiligaynon";
pub const DEFAULT_USER_ID: &str = "demo-user";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// One layer of client configuration. Unset fields defer to the next layer down.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ClientSettings {
    pub api_url: Option<String>,
    pub language: Option<String>,
    pub user_id: Option<String>,
    /// `0` disables the client-side timeout.
    pub timeout_secs: Option<u64>,
    pub include_audio: Option<bool>,
    pub database_url: Option<String>,
}

impl ClientSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            api_url: get("LINGOKA_API_URL"),
            language: get("LINGOKA_LANGUAGE"),
            user_id: get("LINGOKA_USER_ID"),
            timeout_secs: get("LINGOKA_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()),
            include_audio: get("LINGOKA_INCLUDE_AUDIO").and_then(|v| v.trim().parse().ok()),
            database_url: get("LINGOKA_DATABASE_URL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveSettings {
    pub api_url: Url,
    pub language: String,
    pub user_id: String,
    pub request_timeout: Option<Duration>,
    pub include_audio: bool,
    pub database_url: Option<String>,
}

pub fn resolve_effective_settings(
    file: &ClientSettings,
    env: &ClientSettings,
    overrides: &ClientSettings,
) -> anyhow::Result<EffectiveSettings> {
    let pick = |f: fn(&ClientSettings) -> Option<String>| f(overrides).or_else(|| f(env)).or_else(|| f(file));

    let raw_url = pick(|s| s.api_url.clone()).unwrap_or_else(|| DEFAULT_API_URL.into());
    let api_url = Url::parse(&raw_url).with_context(|| format!("invalid api url: {}", raw_url))?;
    if api_url.cannot_be_a_base() || !matches!(api_url.scheme(), "http" | "https") {
        anyhow::bail!("api url must be an http(s) base url: {}", raw_url);
    }

    let timeout_secs = overrides
        .timeout_secs
        .or(env.timeout_secs)
        .or(file.timeout_secs)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);

    Ok(EffectiveSettings {
        api_url,
        language: pick(|s| s.language.clone()).unwrap_or_else(|| DEFAULT_LANGUAGE.into()),
        user_id: pick(|s| s.user_id.clone()).unwrap_or_else(|| DEFAULT_USER_ID.into()),
        request_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        include_audio: overrides
            .include_audio
            .or(env.include_audio)
            .or(file.include_audio)
            .unwrap_or(false),
        database_url: pick(|s| s.database_url.clone()),
    })
}

pub fn default_config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME").ok().map(PathBuf::from).unwrap_or_else(|| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        PathBuf::from(home).join(".config")
    });
    base.join("lingoka").join("config.json")
}

/// Reads the JSON config file. A missing file at the default location is an
/// empty layer; a missing file that was asked for explicitly is an error.
pub fn load_config_file(explicit: Option<&Path>) -> anyhow::Result<ClientSettings> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => {
            let p = default_config_path();
            if !p.exists() {
                return Ok(ClientSettings::default());
            }
            p
        }
    };
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading config {}", path.display()))?;
    let settings = serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(settings)
}
