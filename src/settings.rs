use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::SyncError;
use crate::matcher::Matcher;
use crate::rules::loader::load_rules;
use crate::rules::RuleSet;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub directory: DirectorySettings,
    #[serde(default)]
    pub console: ConsoleSettings,
    #[serde(default)]
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorySettings {
    /// Admin Directory API root, e.g. https://admin.googleapis.com/admin/directory/v1
    pub base_url: String,
    /// Domain used when listing the groups of a user
    pub domain: String,
    /// Bearer token; only taken from PERMSYNC__DIRECTORY__ACCESS_TOKEN
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    /// Group keys that are never resolved. `/regex/` entries are patterns.
    pub group_blacklist: Vec<String>,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleSettings {
    pub url: String,
    pub user: String,
    /// Only taken from PERMSYNC__CONSOLE__PASSWORD
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Console API calls per second, 0 disables the limit
    pub requests_per_second: u32,
    pub request_timeout_secs: u64,
}

/// What a sync cycle is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DryRun {
    /// Build, log and apply plans
    #[default]
    Off,
    /// Build and log plans, never apply them
    NoExec,
    /// Skip planning entirely
    NoPlan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Rule file, or directory of `.kdl` rule files
    pub rules_path: PathBuf,
    pub apply_interval_secs: u64,
    pub groups_fetch_interval_secs: u64,
    /// Allow lowering a role, including removal from an organization
    pub can_demote: bool,
    /// Allow removing users from the main organization (id 1)
    pub remove_from_main_org: bool,
    pub dry_run: DryRun,
    /// Minimum time between two "no changes" log lines
    pub no_changes_log_interval_secs: u64,
}

impl SyncSettings {
    pub fn apply_interval(&self) -> Duration {
        Duration::from_secs(self.apply_interval_secs)
    }

    pub fn groups_fetch_interval(&self) -> Duration {
        Duration::from_secs(self.groups_fetch_interval_secs)
    }

    pub fn no_changes_log_interval(&self) -> Duration {
        Duration::from_secs(self.no_changes_log_interval_secs)
    }

    /// Cadences must be positive; zero would mean "unlimited".
    pub fn validate(&self) -> std::result::Result<(), SyncError> {
        for (key, value) in [
            ("sync.apply_interval_secs", self.apply_interval_secs),
            ("sync.groups_fetch_interval_secs", self.groups_fetch_interval_secs),
        ] {
            if value == 0 {
                return Err(SyncError::InvalidSetting {
                    key,
                    reason: "must be at least 1 second".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            base_url: "https://admin.googleapis.com/admin/directory/v1".to_string(),
            domain: String::new(),
            access_token: None,
            group_blacklist: Vec::new(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".to_string(),
            user: "admin".to_string(),
            password: None,
            requests_per_second: 20,
            request_timeout_secs: 30,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            rules_path: PathBuf::from("rules.kdl"),
            apply_interval_secs: 300,
            groups_fetch_interval_secs: 1800,
            can_demote: false,
            remove_from_main_org: false,
            dry_run: DryRun::Off,
            no_changes_log_interval_secs: 600,
        }
    }
}

// Secrets stay out of debug output
impl std::fmt::Debug for DirectorySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectorySettings")
            .field("base_url", &self.base_url)
            .field("domain", &self.domain)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("group_blacklist", &self.group_blacklist)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl std::fmt::Debug for ConsoleSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSettings")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("requests_per_second", &self.requests_per_second)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("server.host", Server::default().host)
            .into_diagnostic()?
            .set_default("server.port", Server::default().port)
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: PERMSYNC__SYNC__CAN_DEMOTE=true, etc.
        builder = builder.add_source(config::Environment::with_prefix("PERMSYNC").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let mut s: Settings = cfg.try_deserialize().into_diagnostic()?;

        // Normalize rules path to be relative to current dir
        if s.sync.rules_path.is_relative() {
            s.sync.rules_path = std::env::current_dir()
                .into_diagnostic()?
                .join(&s.sync.rules_path);
        }

        Ok(s)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// The part of the configuration that can be swapped while running.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub settings: SyncSettings,
    pub rules: RuleSet,
    pub group_blacklist: Vec<Matcher>,
}

impl SyncConfig {
    /// Load the rule file and compile the blacklist. Fails on any invalid role
    /// or pattern.
    pub fn from_settings(settings: &Settings) -> std::result::Result<Self, SyncError> {
        settings.sync.validate()?;
        let rules = load_rules(&settings.sync.rules_path)?;
        let group_blacklist = compile_blacklist(&settings.directory.group_blacklist)?;
        Ok(Self {
            settings: settings.sync.clone(),
            rules,
            group_blacklist,
        })
    }
}

pub fn compile_blacklist(entries: &[String]) -> std::result::Result<Vec<Matcher>, SyncError> {
    entries
        .iter()
        .map(|raw| {
            Matcher::parse(raw).map_err(|e| SyncError::InvalidBlacklist {
                pattern: raw.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}
