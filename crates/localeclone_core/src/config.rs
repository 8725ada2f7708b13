use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = ".localeclone/config.toml";
pub const DEFAULT_AUTH_URL: &str = "https://auth.prismic.io/login";
pub const DEFAULT_MIGRATION_URL: &str = "https://migration.prismic.io/documents";
pub const DEFAULT_CONTENT_API_URL: &str = "https://{repository}.cdn.prismic.io/api/v2";
pub const DEFAULT_USER_AGENT: &str = "prismic-locale-clone/0.1";
pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_CREATE_DELAY_MS: u64 = 2_000;
pub const DEFAULT_UPDATE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_PAGE_SIZE: usize = 100;
/// Largest `pageSize` the content API accepts.
pub const MAX_PAGE_SIZE: usize = 100;

const REPOSITORY_PLACEHOLDER: &str = "{repository}";

/// Optional tunables read from the TOML config file. Secrets never live here.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct FileConfig {
    #[serde(default)]
    pub migration: MigrationSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct MigrationSection {
    pub auth_url: Option<String>,
    pub migration_url: Option<String>,
    pub content_api_url: Option<String>,
    pub user_agent: Option<String>,
    pub batch_size: Option<usize>,
    pub create_delay_ms: Option<u64>,
    pub update_delay_ms: Option<u64>,
    pub page_size: Option<usize>,
    pub http_timeout_ms: Option<u64>,
}

/// Load and parse the config file. Returns default if the file doesn't exist.
pub fn load_file_config(config_path: &Path) -> Result<FileConfig> {
    if !config_path.exists() {
        return Ok(FileConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: FileConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Values given on the command line; they win over everything else.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub target_locale: Option<String>,
    pub batch_size: Option<usize>,
}

/// Everything a run needs, resolved once and passed by reference.
#[derive(Clone)]
pub struct CloneConfig {
    pub target_locale: String,
    pub source_repository: String,
    pub api_key: String,
    pub email: String,
    pub password: String,
    pub auth_url: String,
    pub migration_url: String,
    pub content_api_url: String,
    pub user_agent: String,
    pub batch_size: usize,
    pub create_delay_ms: u64,
    pub update_delay_ms: u64,
    pub page_size: usize,
    pub http_timeout_ms: Option<u64>,
}

impl CloneConfig {
    /// Resolve from CLI overrides, the process environment and the file.
    pub fn resolve(file: &FileConfig, overrides: &ConfigOverrides) -> Result<Self> {
        Self::resolve_with(file, overrides, |key| env::var(key).ok())
    }

    pub fn resolve_with(
        file: &FileConfig,
        overrides: &ConfigOverrides,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let target_locale = overrides
            .target_locale
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
            .or_else(|| non_empty("NEW_LOCALE"));
        let source_repository = non_empty("TEMPLATE_DOMAIN");
        let api_key = non_empty("MIGRATION_API_BETA_KEY");
        let email = non_empty("EMAIL");
        let password = lookup("PASSWORD").filter(|value| !value.is_empty());

        let mut missing = Vec::new();
        if target_locale.is_none() {
            missing.push("NEW_LOCALE (or the LOCALE argument)");
        }
        if source_repository.is_none() {
            missing.push("TEMPLATE_DOMAIN");
        }
        if api_key.is_none() {
            missing.push("MIGRATION_API_BETA_KEY");
        }
        if email.is_none() {
            missing.push("EMAIL");
        }
        if password.is_none() {
            missing.push("PASSWORD");
        }
        let (
            Some(target_locale),
            Some(source_repository),
            Some(api_key),
            Some(email),
            Some(password),
        ) = (target_locale, source_repository, api_key, email, password)
        else {
            bail!(
                "undefined configuration, please configure your .env file (missing: {})",
                missing.join(", ")
            );
        };

        let section = &file.migration;
        let parsed_u64 =
            |key: &str| non_empty(key).and_then(|value| value.parse::<u64>().ok());
        let parsed_usize =
            |key: &str| non_empty(key).and_then(|value| value.parse::<usize>().ok());

        let batch_size = overrides
            .batch_size
            .or_else(|| parsed_usize("LOCALE_CLONE_BATCH_SIZE"))
            .or(section.batch_size)
            .unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            bail!("batch size must be at least 1");
        }
        let page_size = parsed_usize("LOCALE_CLONE_PAGE_SIZE")
            .or(section.page_size)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            bail!("page size must be between 1 and {MAX_PAGE_SIZE}, got {page_size}");
        }

        let content_api_template = non_empty("LOCALE_CLONE_CONTENT_API_URL")
            .or_else(|| section.content_api_url.clone())
            .unwrap_or_else(|| DEFAULT_CONTENT_API_URL.to_string());

        Ok(Self {
            content_api_url: content_api_template
                .replace(REPOSITORY_PLACEHOLDER, &source_repository)
                .trim_end_matches('/')
                .to_string(),
            auth_url: non_empty("LOCALE_CLONE_AUTH_URL")
                .or_else(|| section.auth_url.clone())
                .unwrap_or_else(|| DEFAULT_AUTH_URL.to_string()),
            migration_url: non_empty("LOCALE_CLONE_MIGRATION_URL")
                .or_else(|| section.migration_url.clone())
                .unwrap_or_else(|| DEFAULT_MIGRATION_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            user_agent: non_empty("LOCALE_CLONE_USER_AGENT")
                .or_else(|| section.user_agent.clone())
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            create_delay_ms: parsed_u64("LOCALE_CLONE_CREATE_DELAY_MS")
                .or(section.create_delay_ms)
                .unwrap_or(DEFAULT_CREATE_DELAY_MS),
            update_delay_ms: parsed_u64("LOCALE_CLONE_UPDATE_DELAY_MS")
                .or(section.update_delay_ms)
                .unwrap_or(DEFAULT_UPDATE_DELAY_MS),
            http_timeout_ms: parsed_u64("LOCALE_CLONE_HTTP_TIMEOUT_MS")
                .or(section.http_timeout_ms)
                .filter(|timeout| *timeout > 0),
            target_locale,
            source_repository,
            api_key,
            email,
            password,
            batch_size,
            page_size,
        })
    }

    /// Number of create batches needed for `documents` documents.
    pub fn batch_count(&self, documents: usize) -> usize {
        documents.div_ceil(self.batch_size)
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "target_locale={}\nsource_repository={}\nemail={}\napi_key=<redacted>\npassword=<redacted>\nauth_url={}\nmigration_url={}\ncontent_api_url={}\nuser_agent={}\nbatch_size={}\ncreate_delay_ms={}\nupdate_delay_ms={}\npage_size={}\nhttp_timeout_ms={}",
            self.target_locale,
            self.source_repository,
            self.email,
            self.auth_url,
            self.migration_url,
            self.content_api_url,
            self.user_agent,
            self.batch_size,
            self.create_delay_ms,
            self.update_delay_ms,
            self.page_size,
            self.http_timeout_ms
                .map(|timeout| timeout.to_string())
                .unwrap_or_else(|| "none".to_string()),
        )
    }
}

impl fmt::Debug for CloneConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CloneConfig")
            .field("target_locale", &self.target_locale)
            .field("source_repository", &self.source_repository)
            .field("api_key", &"<redacted>")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("auth_url", &self.auth_url)
            .field("migration_url", &self.migration_url)
            .field("content_api_url", &self.content_api_url)
            .field("user_agent", &self.user_agent)
            .field("batch_size", &self.batch_size)
            .field("create_delay_ms", &self.create_delay_ms)
            .field("update_delay_ms", &self.update_delay_ms)
            .field("page_size", &self.page_size)
            .field("http_timeout_ms", &self.http_timeout_ms)
            .finish()
    }
}
