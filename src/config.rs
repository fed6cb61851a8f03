use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::Token;
use crate::error::TestLensError;
use crate::providers::DEFAULT_TTL;

/// Environment variable consulted when neither `--token` nor `pat` is set.
const PAT_ENV_VAR: &str = "AZURE_PAT";

/// Configuration file structure for testlens.
///
/// Mirrors the dashboard's `config.yml`: one Azure DevOps organization, a set
/// of named projects with their pipelines, named build filters and the
/// selectable build counts.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Azure DevOps organization name
    #[serde(default)]
    pub organization: String,

    /// Personal access token (`--token` overrides it, `AZURE_PAT` backs it up)
    #[serde(default)]
    pub pat: Option<String>,

    /// Projects by display name
    #[serde(default)]
    pub projects: IndexMap<String, ProjectConfig>,

    /// Named substring filters applied to build numbers
    #[serde(default)]
    pub build_filters: IndexMap<String, String>,

    /// Selectable maximum numbers of builds per pipeline; the first is the default
    #[serde(default)]
    pub max_builds_option: Vec<u32>,

    /// Refresh interval in milliseconds; absent or 0 disables polling
    #[serde(default)]
    pub auto_refresh_interval: Option<u64>,

    /// Build API host, also used for web links
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Test results API host
    #[serde(default = "default_test_results_base_url")]
    pub test_results_base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Lifetime of cached API responses in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Azure DevOps project name
    pub project: String,

    /// Pipeline display name to definition id
    #[serde(default)]
    pub pipelines: IndexMap<String, u64>,

    /// Pipeline shown first
    #[serde(default)]
    pub default_pipeline: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            organization: String::new(),
            pat: None,
            projects: IndexMap::new(),
            build_filters: IndexMap::new(),
            max_builds_option: Vec::new(),
            auto_refresh_interval: None,
            api_base_url: default_api_base_url(),
            test_results_base_url: default_test_results_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("organization", &self.organization)
            .field("pat", &self.pat.as_ref().map(|_| "<redacted>"))
            .field("projects", &self.projects)
            .field("build_filters", &self.build_filters)
            .field("max_builds_option", &self.max_builds_option)
            .field("auto_refresh_interval", &self.auto_refresh_interval)
            .field("api_base_url", &self.api_base_url)
            .field("test_results_base_url", &self.test_results_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .finish()
    }
}

fn default_api_base_url() -> String {
    "https://dev.azure.com".to_string()
}

fn default_test_results_base_url() -> String {
    "https://vstmr.dev.azure.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_TTL.as_secs()
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./testlens.yaml, ./testlens.yml, ./testlens.toml, ./testlens.json
    /// 3. ./config.yml
    /// 4. `{config_dir}/testlens/config.yaml`
    ///
    /// # Errors
    ///
    /// Returns an error if no file is found or the file cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = [
            "testlens.yaml",
            "testlens.yml",
            "testlens.toml",
            "testlens.json",
            "config.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        if let Some(path) = user_config_path().filter(|path| path.exists()) {
            return Self::load_from_path(&path);
        }

        Err(TestLensError::Config(
            "No configuration file found. Create testlens.yaml (or config.yml) with the required fields"
                .to_string(),
        )
        .into())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => {
                // Try YAML first, then TOML, then JSON
                serde_yaml::from_str(&contents)
                    .or_else(|_| toml::from_str(&contents))
                    .or_else(|_| serde_json::from_str(&contents))
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))
            }
        }
    }

    /// Checks the fields every command relies on.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first problem found.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.organization.trim().is_empty() {
            return Err(TestLensError::Config("'organization' is required".to_string()));
        }
        if self.projects.is_empty() {
            return Err(TestLensError::Config(
                "No Azure projects defined under 'projects'".to_string(),
            ));
        }
        for (name, project) in &self.projects {
            if project.project.trim().is_empty() {
                return Err(TestLensError::Config(format!(
                    "Project '{name}' has an empty 'project' field"
                )));
            }
            if project.pipelines.is_empty() {
                return Err(TestLensError::Config(format!(
                    "No pipeline configuration found for project '{name}'"
                )));
            }
            if let Some(default) = &project.default_pipeline {
                if !project.pipelines.contains_key(default) {
                    return Err(TestLensError::Config(format!(
                        "Default pipeline '{default}' of project '{name}' is not listed under 'pipelines'"
                    )));
                }
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(TestLensError::Config(
                "'request_timeout_secs' must be greater than zero".to_string(),
            ));
        }
        if self.max_builds_option.contains(&0) {
            return Err(TestLensError::Config(
                "'max_builds_option' values must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Selects a project by display name, or the first configured one.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the project is unknown or none exist.
    pub fn project(&self, name: Option<&str>) -> crate::error::Result<(&str, &ProjectConfig)> {
        match name {
            Some(name) => self
                .projects
                .get_key_value(name)
                .map(|(key, project)| (key.as_str(), project))
                .ok_or_else(|| {
                    let known: Vec<&str> = self.projects.keys().map(String::as_str).collect();
                    TestLensError::Config(format!(
                        "Unknown project '{name}' (known projects: {})",
                        known.join(", ")
                    ))
                }),
            None => self
                .projects
                .first()
                .map(|(key, project)| (key.as_str(), project))
                .ok_or_else(|| TestLensError::Config("No Azure projects defined".to_string())),
        }
    }

    /// Picks the build cap for a render.
    ///
    /// Defaults to the first entry of `max_builds_option` (no cap when the list
    /// is empty). An explicit value must be one of the options when any are
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a value outside the configured options.
    pub fn resolve_max_builds(&self, requested: Option<u32>) -> crate::error::Result<Option<u32>> {
        match requested {
            Some(count) if self.max_builds_option.is_empty() || self.max_builds_option.contains(&count) => {
                Ok(Some(count))
            }
            Some(count) => Err(TestLensError::Config(format!(
                "Max builds {count} is not one of the configured options {:?}",
                self.max_builds_option
            ))),
            None => Ok(self.max_builds_option.first().copied()),
        }
    }

    /// Resolves the token: `--token`, then the file's `pat`, then `AZURE_PAT`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no non-empty token is available.
    pub fn token(&self, override_token: Option<&str>) -> crate::error::Result<Token> {
        let from_env = std::env::var(PAT_ENV_VAR).ok();
        self.resolve_token(override_token, from_env.as_deref())
    }

    fn resolve_token(
        &self,
        override_token: Option<&str>,
        from_env: Option<&str>,
    ) -> crate::error::Result<Token> {
        [override_token, self.pat.as_deref(), from_env]
            .into_iter()
            .flatten()
            .find(|token| !token.is_empty())
            .map(Token::from)
            .ok_or_else(|| {
                TestLensError::Config(format!(
                    "No personal access token: pass --token, set 'pat' or {PAT_ENV_VAR}"
                ))
            })
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.auto_refresh_interval
            .filter(|&millis| millis > 0)
            .map(Duration::from_millis)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("testlens").join("config.yaml"))
}
