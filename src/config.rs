// apicctl - CLI for locating hosts and inventorying devices on a network controller
// Copyright (C) 2024 Mathias Uhl <mathiasuhl@gmx.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

pub const DEFAULT_URL: &str = "https://sandboxapic.cisco.com/api/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_tls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    User,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not locate a writable config directory for the current user")]
    MissingConfigDir,
    #[error(
        "controller username and password are required; set them with `apicctl configure --username <user> --password <pass>`"
    )]
    MissingCredentials,
    #[error("timeout must be at least one second")]
    ZeroTimeout,
}

#[derive(Debug)]
pub struct EffectiveConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub verify_tls: bool,
    pub timeout: Duration,
}

pub fn config_path(scope: Scope, cwd: &Path) -> Result<PathBuf> {
    match scope {
        Scope::Local => Ok(cwd.join(".apicctl.yaml")),
        Scope::User => {
            if let Ok(custom) = env::var("APICCTL_CONFIG_DIR") {
                return Ok(PathBuf::from(custom).join("config.yaml"));
            }
            let base = config_dir().ok_or(ConfigError::MissingConfigDir)?;
            Ok(base.join("apicctl").join("config.yaml"))
        }
    }
}

pub fn load(cwd: &Path) -> Result<Config> {
    let user = read_if_exists(&config_path(Scope::User, cwd)?)?.unwrap_or_default();
    let local = read_if_exists(&config_path(Scope::Local, cwd)?)?.unwrap_or_default();
    Ok(merge(user, local))
}

pub fn load_scope(scope: Scope, cwd: &Path) -> Result<Config> {
    Ok(read_if_exists(&config_path(scope, cwd)?)?.unwrap_or_default())
}

pub fn save(scope: Scope, config: &Config, cwd: &Path) -> Result<PathBuf> {
    let path = config_path(scope, cwd)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let serialized = serde_yaml::to_string(config).context("serializing config")?;
    fs::write(&path, serialized).with_context(|| format!("writing {:?}", path))?;
    Ok(path)
}

/// User config, then the project file, then command-line overrides.
pub fn resolve(cwd: &Path, overrides: Config) -> Result<EffectiveConfig> {
    let merged = merge(load(cwd)?, overrides);

    let username = merged
        .username
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or(ConfigError::MissingCredentials)?;
    let password = merged.password.ok_or(ConfigError::MissingCredentials)?;

    let timeout_secs = merged.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(ConfigError::ZeroTimeout.into());
    }

    Ok(EffectiveConfig {
        url: merged.url.unwrap_or_else(|| DEFAULT_URL.to_string()),
        username,
        password,
        verify_tls: merged.verify_tls.unwrap_or(false),
        timeout: Duration::from_secs(timeout_secs),
    })
}

/// Copy of `config` safe to print.
pub fn masked(config: &Config) -> Config {
    let mut masked = config.clone();
    if masked.password.is_some() {
        masked.password = Some("*****".into());
    }
    masked
}

fn read_if_exists(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    let config = serde_yaml::from_str(&contents).with_context(|| format!("parsing {:?}", path))?;
    Ok(Some(config))
}

/// Fields set in `over` win.
pub fn merge(base: Config, over: Config) -> Config {
    Config {
        url: over.url.or(base.url),
        username: over.username.or(base.username),
        password: over.password.or(base.password),
        verify_tls: over.verify_tls.or(base.verify_tls),
        timeout_secs: over.timeout_secs.or(base.timeout_secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;
    use std::{env, fs};
    use tempfile::tempdir;

    static ENV_LOCK: OnceLock<std::sync::Mutex<()>> = OnceLock::new();

    fn isolate(cwd: &Path) {
        unsafe {
            env::set_var("APICCTL_CONFIG_DIR", cwd.join("config"));
        }
        fs::create_dir_all(cwd.join("config")).unwrap();
    }

    #[test]
    fn merges_user_and_local_and_overrides() {
        let _guard = ENV_LOCK
            .get_or_init(|| std::sync::Mutex::new(()))
            .lock()
            .unwrap();
        let cwd = tempdir().unwrap();
        isolate(cwd.path());

        let user_cfg = Config {
            url: Some("https://controller.example/api/v1".into()),
            username: Some("user".into()),
            password: Some("pass-user".into()),
            verify_tls: Some(true),
            timeout_secs: Some(30),
        };
        save(Scope::User, &user_cfg, cwd.path()).unwrap();

        let local_cfg = Config {
            username: Some("localuser".into()),
            password: Some("localpass".into()),
            ..Config::default()
        };
        save(Scope::Local, &local_cfg, cwd.path()).unwrap();

        let effective = resolve(cwd.path(), Config::default()).unwrap();
        assert_eq!(effective.url, "https://controller.example/api/v1");
        assert_eq!(effective.username, "localuser");
        assert_eq!(effective.password, "localpass");
        assert!(effective.verify_tls);
        assert_eq!(effective.timeout, Duration::from_secs(30));

        let overridden = resolve(
            cwd.path(),
            Config {
                url: Some("https://override.example/api/v1".into()),
                verify_tls: Some(false),
                ..Config::default()
            },
        )
        .unwrap();
        assert_eq!(overridden.url, "https://override.example/api/v1");
        assert_eq!(overridden.username, "localuser");
        assert!(!overridden.verify_tls);
    }

    #[test]
    fn defaults_url_and_timeout() {
        let _guard = ENV_LOCK
            .get_or_init(|| std::sync::Mutex::new(()))
            .lock()
            .unwrap();
        let cwd = tempdir().unwrap();
        isolate(cwd.path());

        let effective = resolve(
            cwd.path(),
            Config {
                username: Some("devnetuser".into()),
                password: Some("secret".into()),
                ..Config::default()
            },
        )
        .unwrap();
        assert_eq!(effective.url, DEFAULT_URL);
        assert_eq!(effective.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert!(!effective.verify_tls);
    }

    #[test]
    fn errors_when_missing_credentials() {
        let _guard = ENV_LOCK
            .get_or_init(|| std::sync::Mutex::new(()))
            .lock()
            .unwrap();
        let cwd = tempdir().unwrap();
        isolate(cwd.path());

        let err = resolve(
            cwd.path(),
            Config {
                username: Some("devnetuser".into()),
                ..Config::default()
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("username and password are required"));
    }

    #[test]
    fn rejects_zero_timeout() {
        let _guard = ENV_LOCK
            .get_or_init(|| std::sync::Mutex::new(()))
            .lock()
            .unwrap();
        let cwd = tempdir().unwrap();
        isolate(cwd.path());

        let err = resolve(
            cwd.path(),
            Config {
                username: Some("u".into()),
                password: Some("p".into()),
                timeout_secs: Some(0),
                ..Config::default()
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn masks_password() {
        let shown = masked(&Config {
            username: Some("u".into()),
            password: Some("hunter2".into()),
            ..Config::default()
        });
        assert_eq!(shown.password.as_deref(), Some("*****"));
        assert_eq!(shown.username.as_deref(), Some("u"));
    }
}
