use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::family::{Family, Site};

pub const DEFAULT_USER_AGENT: &str = "wikibot/0.1";
pub const DEFAULT_LANG: &str = "en";
pub const DEFAULT_CACHE_FILE: &str = ".wikibot/category.dump.gz";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub category: CategorySettings,
    #[serde(default)]
    pub welcome: WelcomeSettings,
    #[serde(default)]
    pub accounts: AccountsSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub url: Option<String>,
    pub api_url: Option<String>,
    pub user_agent: Option<String>,
    pub family: Option<Family>,
    pub lang: Option<String>,
    /// Localized names of the category namespace, first one used when writing tags.
    #[serde(default)]
    pub category_aliases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CategorySettings {
    pub cache_file: PathBuf,
    pub tree_max_depth: usize,
    pub inspect_initial_chars: usize,
    pub inspect_step_chars: usize,
}

impl Default for CategorySettings {
    fn default() -> Self {
        Self {
            cache_file: PathBuf::from(DEFAULT_CACHE_FILE),
            tree_max_depth: 10,
            inspect_initial_chars: 1000,
            inspect_step_chars: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct WelcomeSettings {
    /// Minimum edit count before a user is welcomed.
    pub edit_threshold: u64,
    /// Flush queued bad-name reports after this many entries.
    pub log_batch_size: usize,
    /// Only accounts created at or before this `yyyymmddhhmmss` timestamp.
    pub offset: Option<String>,
    /// Look back this many minutes; overrides `offset` when non-zero.
    pub time_offset_minutes: u64,
    pub recursive: bool,
    pub sleep_seconds: u64,
    pub make_log: bool,
    pub confirm_reports: bool,
    pub welcome_auto_created: bool,
    pub filter_bad_names: bool,
    pub random_signature: bool,
    pub signature_file: Option<PathBuf>,
    pub default_signature: String,
    pub query_limit: usize,
}

impl Default for WelcomeSettings {
    fn default() -> Self {
        Self {
            edit_threshold: 1,
            log_batch_size: 15,
            offset: None,
            time_offset_minutes: 0,
            recursive: true,
            sleep_seconds: 3600,
            make_log: true,
            confirm_reports: false,
            welcome_auto_created: false,
            filter_bad_names: false,
            random_signature: false,
            signature_file: None,
            default_signature: "--~~~~".to_string(),
            query_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct AccountsSettings {
    #[serde(default)]
    pub usernames: Vec<String>,
}

impl WikiConfig {
    pub fn family(&self) -> Family {
        self.wiki.family.unwrap_or_default()
    }

    pub fn lang(&self) -> String {
        self.wiki
            .lang
            .as_deref()
            .map(str::trim)
            .filter(|lang| !lang.is_empty())
            .unwrap_or(DEFAULT_LANG)
            .to_string()
    }

    pub fn site(&self) -> Site {
        Site::new(self.family(), &self.lang()).with_category_aliases(self.wiki.category_aliases.clone())
    }

    /// Resolve the API URL: env WIKI_API_URL > config > derived from family and language.
    pub fn api_url(&self) -> String {
        if let Some(value) = env_override("WIKI_API_URL") {
            return value;
        }
        self.wiki
            .api_url
            .clone()
            .unwrap_or_else(|| self.family().api_url(&self.lang()))
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        if let Some(value) = env_override("WIKI_USER_AGENT") {
            return value;
        }
        self.wiki
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// Apply command-line overrides on top of file values.
    pub fn override_site(&mut self, family: Option<Family>, lang: Option<&str>) {
        if let Some(family) = family {
            self.wiki.family = Some(family);
        }
        if let Some(lang) = lang {
            self.wiki.lang = Some(lang.to_string());
        }
    }
}

/// Bot credentials from WIKI_BOT_USER / WIKI_BOT_PASS, when both are set.
pub fn bot_credentials() -> Option<(String, String)> {
    Some((env_override("WIKI_BOT_USER")?, env_override("WIKI_BOT_PASS")?))
}

fn env_override(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Load and parse a WikiConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<WikiConfig> {
    if !config_path.exists() {
        return Ok(WikiConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: WikiConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_targets_english_wikipedia() {
        let config = WikiConfig::default();
        assert_eq!(config.family(), Family::Wikipedia);
        assert_eq!(config.lang(), "en");
        assert_eq!(config.category.tree_max_depth, 10);
        assert_eq!(config.welcome.log_batch_size, 15);
        assert_eq!(config.welcome.default_signature, "--~~~~");
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert_eq!(config, WikiConfig::default());
    }

    #[test]
    fn load_config_parses_all_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[wiki]
api_url = "https://de.wikibooks.org/w/api.php"
user_agent = "test-agent/1.0"
family = "wikibooks"
lang = "de"
category_aliases = ["Kategorie"]

[category]
tree_max_depth = 3

[welcome]
edit_threshold = 5
filter_bad_names = true
offset = "20260101000000"

[accounts]
usernames = ["HelperBot"]
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.family(), Family::Wikibooks);
        assert_eq!(config.lang(), "de");
        assert_eq!(config.site().category_namespace(), "Kategorie");
        assert_eq!(config.wiki.user_agent.as_deref(), Some("test-agent/1.0"));
        assert_eq!(config.category.tree_max_depth, 3);
        assert_eq!(config.category.inspect_initial_chars, 1000);
        assert_eq!(config.welcome.edit_threshold, 5);
        assert!(config.welcome.filter_bad_names);
        assert!(config.welcome.recursive);
        assert_eq!(config.welcome.offset.as_deref(), Some("20260101000000"));
        assert_eq!(config.accounts.usernames, vec!["HelperBot".to_string()]);
    }

    #[test]
    fn load_config_tolerates_partial_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[paths]\nproject_root = \"/foo\"\n").expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert!(config.wiki.api_url.is_none());
        assert_eq!(config.category, CategorySettings::default());
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[wiki\nurl = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn cli_overrides_replace_file_values() {
        let mut config = WikiConfig::default();
        config.wiki.lang = Some("fr".to_string());
        config.override_site(Some(Family::Wikinews), Some("it"));
        let site = config.site();
        assert_eq!(site.family, Family::Wikinews);
        assert_eq!(site.lang, "it");
    }

    #[test]
    fn blank_language_falls_back_to_default() {
        let mut config = WikiConfig::default();
        config.wiki.lang = Some("  ".to_string());
        assert_eq!(config.lang(), DEFAULT_LANG);
    }
}
