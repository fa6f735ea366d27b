//! Application configuration for the code.json exporter.
//!
//! User config lives at `~/.codejson/codejson.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CodeJsonError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "codejson.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".codejson";

// ---------------------------------------------------------------------------
// Config structs (matching codejson.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Publishing organization and contact details.
    #[serde(default)]
    pub organization: OrganizationConfig,

    /// License and disclaimer defaults.
    #[serde(default)]
    pub licensing: LicensingConfig,

    /// SharePoint site and list identifiers.
    #[serde(default)]
    pub sharepoint: SharePointConfig,

    /// Repository metadata API.
    #[serde(default)]
    pub github: GitHubConfig,

    /// Fixed pre-filter applied to the import collection.
    #[serde(default)]
    pub import_filter: ImportFilterConfig,
}

/// `[organization]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationConfig {
    #[serde(default = "default_organization")]
    pub name: String,
    #[serde(default = "default_contact_name")]
    pub contact_name: String,
    #[serde(default = "default_contact_email")]
    pub contact_email: String,
    /// Fallback `homepageURL` for releases that carry none.
    #[serde(default = "default_home_link")]
    pub home_link: String,
    /// Fallback VCS label.
    #[serde(default = "default_vcs")]
    pub vcs: String,
}

impl Default for OrganizationConfig {
    fn default() -> Self {
        Self {
            name: default_organization(),
            contact_name: default_contact_name(),
            contact_email: default_contact_email(),
            home_link: default_home_link(),
            vcs: default_vcs(),
        }
    }
}

fn default_organization() -> String {
    "OIT EPMO".into()
}
fn default_contact_name() -> String {
    "EPMO Code Sharing Services".into()
}
fn default_contact_email() -> String {
    "OSSOFT@va.gov".into()
}
fn default_home_link() -> String {
    "https://github.com/department-of-veterans-affairs".into()
}
fn default_vcs() -> String {
    "git".into()
}

/// `[licensing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicensingConfig {
    #[serde(default = "default_license_name")]
    pub default_name: String,
    #[serde(default = "default_license_url")]
    pub default_url: String,
    /// Disclaimer text used when a record has none.
    #[serde(default = "default_disclaimer")]
    pub disclaimer: String,
}

impl Default for LicensingConfig {
    fn default() -> Self {
        Self {
            default_name: default_license_name(),
            default_url: default_license_url(),
            disclaimer: default_disclaimer(),
        }
    }
}

fn default_license_name() -> String {
    "Creative Commons Zero v1.0 Universal".into()
}
fn default_license_url() -> String {
    "https://creativecommons.org/publicdomain/zero/1.0/".into()
}
fn default_disclaimer() -> String {
    "License information not currently available. Information forthcoming.".into()
}

/// `[sharepoint]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharePointConfig {
    /// Site URL, e.g. `https://tenant.sharepoint.com/sites/epmo`.
    #[serde(default)]
    pub site_url: Option<String>,

    /// List GUID of the import (reference) collection.
    #[serde(default)]
    pub import_list: Option<String>,

    /// List GUID of the append (user-maintained) collection.
    #[serde(default)]
    pub append_list: Option<String>,

    /// Name of the env var holding the bearer token (never store the token itself).
    #[serde(default = "default_sharepoint_token_env")]
    pub token_env: String,

    #[serde(default = "default_import_page_size")]
    pub import_page_size: u32,

    #[serde(default = "default_append_page_size")]
    pub append_page_size: u32,
}

impl Default for SharePointConfig {
    fn default() -> Self {
        Self {
            site_url: None,
            import_list: None,
            append_list: None,
            token_env: default_sharepoint_token_env(),
            import_page_size: default_import_page_size(),
            append_page_size: default_append_page_size(),
        }
    }
}

fn default_sharepoint_token_env() -> String {
    "SHAREPOINT_TOKEN".into()
}
fn default_import_page_size() -> u32 {
    1000
}
fn default_append_page_size() -> u32 {
    100
}

/// `[github]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Name of the env var holding the API token.
    #[serde(default = "default_github_token_env")]
    pub token_env: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            token_env: default_github_token_env(),
        }
    }
}

fn default_github_api_url() -> String {
    "https://api.github.com".into()
}
fn default_github_token_env() -> String {
    "GITHUB_TOKEN".into()
}

/// `[import_filter]` section. Empty values disable that half of the filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportFilterConfig {
    #[serde(default = "default_software_type")]
    pub software_type: String,
    #[serde(default = "default_statuses")]
    pub statuses: Vec<String>,
}

impl Default for ImportFilterConfig {
    fn default() -> Self {
        Self {
            software_type: default_software_type(),
            statuses: default_statuses(),
        }
    }
}

impl ImportFilterConfig {
    /// A filter that admits every import record.
    pub fn allow_all() -> Self {
        Self {
            software_type: String::new(),
            statuses: Vec::new(),
        }
    }
}

fn default_software_type() -> String {
    "Custom Development".into()
}
fn default_statuses() -> Vec<String> {
    vec!["Development".into(), "Production".into(), "Inactive".into()]
}

// ---------------------------------------------------------------------------
// Export settings (runtime, immutable for one export)
// ---------------------------------------------------------------------------

/// Values the export pipeline reads, resolved once per run.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub organization: String,
    pub contact_name: String,
    pub contact_email: String,
    pub home_link: String,
    pub vcs: String,
    pub default_license_name: String,
    pub default_license_url: String,
    pub default_disclaimer: String,
    pub import_page_size: u32,
    pub append_page_size: u32,
    pub import_filter: ImportFilterConfig,
}

impl From<&AppConfig> for ExportSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            organization: config.organization.name.clone(),
            contact_name: config.organization.contact_name.clone(),
            contact_email: config.organization.contact_email.clone(),
            home_link: config.organization.home_link.clone(),
            vcs: config.organization.vcs.clone(),
            default_license_name: config.licensing.default_name.clone(),
            default_license_url: config.licensing.default_url.clone(),
            default_disclaimer: config.licensing.disclaimer.clone(),
            import_page_size: config.sharepoint.import_page_size,
            append_page_size: config.sharepoint.append_page_size,
            import_filter: config.import_filter.clone(),
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.codejson/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CodeJsonError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.codejson/codejson.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CodeJsonError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| CodeJsonError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CodeJsonError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CodeJsonError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CodeJsonError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the env var named in config. Empty values count as unset.
pub fn resolve_token(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().filter(|v| !v.is_empty())
}

/// Check that the SharePoint site and both list ids are configured.
pub fn validate_sharepoint(config: &SharePointConfig) -> Result<()> {
    let missing: Vec<&str> = [
        ("site_url", &config.site_url),
        ("import_list", &config.import_list),
        ("append_list", &config.append_list),
    ]
    .into_iter()
    .filter(|(_, v)| v.as_deref().is_none_or(str::is_empty))
    .map(|(k, _)| k)
    .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(CodeJsonError::config(format!(
            "[sharepoint] is missing {}. Run `codejson config init` and edit the file, \
             or pass the values as flags.",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("contact_email"));
        assert!(toml_str.contains("GITHUB_TOKEN"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.sharepoint.import_page_size, 1000);
        assert_eq!(parsed.github.api_url, "https://api.github.com");
        assert_eq!(parsed.import_filter.statuses.len(), 3);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[organization]
name = "Test Org"

[sharepoint]
site_url = "https://tenant.sharepoint.com/sites/test"
import_list = "11111111-1111-1111-1111-111111111111"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.organization.name, "Test Org");
        assert_eq!(config.organization.vcs, "git");
        assert_eq!(config.sharepoint.append_page_size, 100);
        assert_eq!(config.licensing.default_name, "Creative Commons Zero v1.0 Universal");
    }

    #[test]
    fn export_settings_from_app_config() {
        let settings = ExportSettings::default();
        assert_eq!(settings.organization, "OIT EPMO");
        assert_eq!(settings.import_page_size, 1000);
        assert_eq!(settings.import_filter.software_type, "Custom Development");
    }

    #[test]
    fn sharepoint_validation_names_missing_keys() {
        let mut config = SharePointConfig::default();
        config.site_url = Some("https://tenant.sharepoint.com".into());
        config.import_list = Some(String::new());
        let err = validate_sharepoint(&config).unwrap_err().to_string();
        assert!(err.contains("import_list"));
        assert!(err.contains("append_list"));
        assert!(!err.contains("site_url"));
    }

    #[test]
    fn empty_token_counts_as_unset() {
        // Unique env var name to avoid interfering with other tests
        assert!(resolve_token("CJ_TEST_NONEXISTENT_TOKEN_12345").is_none());
    }
}
