//! Runtime configuration for the contact migration.
//!
//! Everything is read once from the environment into plain values that are
//! passed to the migration explicitly.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DEBUG_FILE: &str = "/tmp/rc_debug.log";
pub const DEFAULT_USER_HEADER: &str = "X-Authenticated-User";

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|value| parse_bool(&value))
        .unwrap_or(default)
}

fn env_duration_millis(key: &str, default_millis: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(default_millis))
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// How group rows are turned into membership links.
///
/// The legacy importer created a group on the first row carrying its name
/// and only linked members from the second row on. That stays the default
/// until the intended behavior is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupLinkPolicy {
    /// First row of a group only creates it; later rows are linked.
    #[default]
    SkipFirstRow,
    /// Every row is linked, including the one that created the group.
    EveryRow,
}

impl FromStr for GroupLinkPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skip-first-row" | "skip_first_row" | "legacy" => Ok(Self::SkipFirstRow),
            "every-row" | "every_row" | "all" => Ok(Self::EveryRow),
            other => Err(format!("unknown group link policy '{other}'")),
        }
    }
}

/// How the display name is assembled from first name and surname.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayNamePolicy {
    /// `firstname + " " + surname`, leading/trailing space kept when a part is empty.
    #[default]
    Verbatim,
    /// Same join, with surrounding whitespace trimmed.
    Trimmed,
}

impl FromStr for DisplayNamePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "verbatim" => Ok(Self::Verbatim),
            "trimmed" | "trim" => Ok(Self::Trimmed),
            other => Err(format!("unknown display name policy '{other}'")),
        }
    }
}

/// Connection settings for the legacy address-book database.
#[derive(Debug, Clone)]
pub struct LegacyDbConfig {
    pub database_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Duration,
}

impl LegacyDbConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env_optional("ATMAIL_DATABASE_URL"),
            username: env_optional("ATMAIL_DATABASE_USER"),
            password: env_optional("ATMAIL_DATABASE_PASSWORD"),
            connect_timeout: env_duration_millis("ATMAIL_CONNECT_TIMEOUT_MS", 5_000),
        }
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            database_url: Some(url.into()),
            username: None,
            password: None,
            connect_timeout: Duration::from_millis(5_000),
        }
    }
}

/// Where the per-run diagnostic summary goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugSinkConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for DebugSinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from(DEFAULT_DEBUG_FILE),
        }
    }
}

/// Knobs that change how a run behaves, independent of where data lives.
#[derive(Debug, Clone, Default)]
pub struct MigrationOptions {
    pub group_link_policy: GroupLinkPolicy,
    pub display_name_policy: DisplayNamePolicy,
    pub debug: DebugSinkConfig,
}

/// Complete configuration for the importer.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub legacy: LegacyDbConfig,
    pub options: MigrationOptions,
    pub user_header: String,
}

impl MigrationConfig {
    pub fn from_env() -> Self {
        let group_link_policy = env::var("ATMAIL_GROUP_LINK_POLICY")
            .ok()
            .and_then(|value| match GroupLinkPolicy::from_str(&value) {
                Ok(policy) => Some(policy),
                Err(err) => {
                    log::warn!("{}; using default", err);
                    None
                }
            })
            .unwrap_or_default();

        let display_name_policy = env::var("ATMAIL_DISPLAY_NAME")
            .ok()
            .and_then(|value| match DisplayNamePolicy::from_str(&value) {
                Ok(policy) => Some(policy),
                Err(err) => {
                    log::warn!("{}; using default", err);
                    None
                }
            })
            .unwrap_or_default();

        Self {
            legacy: LegacyDbConfig::from_env(),
            options: MigrationOptions {
                group_link_policy,
                display_name_policy,
                debug: DebugSinkConfig {
                    enabled: env_bool("ATMAIL_DEBUG", false),
                    path: PathBuf::from(env_string("ATMAIL_DEBUG_FILE", DEFAULT_DEBUG_FILE)),
                },
            },
            user_header: env_string("ATMAIL_USER_HEADER", DEFAULT_USER_HEADER),
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_values_accept_common_spellings() {
        for value in ["1", "true", "TRUE", "yes", "On "] {
            assert!(parse_bool(value), "{value} should be true");
        }
        for value in ["0", "false", "no", "", "enabled"] {
            assert!(!parse_bool(value), "{value} should be false");
        }
    }

    #[test]
    fn group_link_policy_parses_both_spellings() {
        assert_eq!(
            "skip-first-row".parse::<GroupLinkPolicy>(),
            Ok(GroupLinkPolicy::SkipFirstRow)
        );
        assert_eq!(
            "EVERY_ROW".parse::<GroupLinkPolicy>(),
            Ok(GroupLinkPolicy::EveryRow)
        );
        assert!("sometimes".parse::<GroupLinkPolicy>().is_err());
    }

    #[test]
    fn defaults_preserve_legacy_behavior() {
        let options = MigrationOptions::default();
        assert_eq!(options.group_link_policy, GroupLinkPolicy::SkipFirstRow);
        assert_eq!(options.display_name_policy, DisplayNamePolicy::Verbatim);
        assert!(!options.debug.enabled);
        assert_eq!(options.debug.path, PathBuf::from("/tmp/rc_debug.log"));
    }
}
