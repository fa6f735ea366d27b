//! Derivation of a manifest release entry from one joined record.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use codejson_shared::{
    AppendRecord, Contact, ExportSettings, ImportRecord, License, Permissions, ReleaseDates,
    ReleaseEntry,
};

/// Added to the stored labor hours on export.
pub const LABOR_HOURS_OFFSET: i64 = 1;

/// Language list used when a system lists no technology components.
pub const LANGUAGE_PLACEHOLDER: &str = "Not Available";

/// Status values renamed on export; everything else passes through.
pub fn release_status(system_status: &str) -> String {
    match system_status {
        "Inactive" => "Archival".to_string(),
        other => other.to_string(),
    }
}

/// Split a delimited technology list (`;#`, `;` or `,`).
pub fn split_languages(technology_components: Option<&str>) -> Vec<String> {
    static DELIMITER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r";#|;|,").expect("valid regex"));

    let languages: Vec<String> = technology_components
        .map(|raw| {
            DELIMITER_RE
                .split(raw)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    if languages.is_empty() {
        vec![LANGUAGE_PLACEHOLDER.to_string()]
    } else {
        languages
    }
}

/// Build a release entry for an import row and its matched append row.
pub fn build_release(
    import: &ImportRecord,
    append: &AppendRecord,
    description: String,
    settings: &ExportSettings,
) -> ReleaseEntry {
    let status = release_status(&import.system_status);
    let tags = collect_tags(append.tags.as_deref(), &status, append.usage_type.as_str());

    ReleaseEntry {
        id: import.vasi_id.map(|id| id.to_string()).unwrap_or_default(),
        name: import.system_name.clone(),
        organization: settings.organization.clone(),
        version: text_or(&append.code_version, ""),
        status,
        permissions: Permissions {
            usage_type: append.usage_type,
            licenses: vec![License {
                name: text_or(&append.license_name, &settings.default_license_name),
                url: text_or(&append.license_url, &settings.default_license_url),
            }],
        },
        homepage_url: text_or(&append.homepage_url, &settings.home_link),
        download_url: text_or(&append.download_url, ""),
        disclaimer_url: text_or(&append.disclaimer_url, ""),
        repository_url: text_or(&append.repository_url, ""),
        disclaimer_text: text_or(&append.disclaimer, &settings.default_disclaimer),
        vcs: text_or(&append.vcs, &settings.vcs).to_lowercase(),
        labor_hours: append.labor_hours.saturating_add(LABOR_HOURS_OFFSET),
        tags,
        languages: split_languages(import.technology_components.as_deref()),
        contact: Contact {
            name: settings.contact_name.clone(),
            email: settings.contact_email.clone(),
        },
        date: ReleaseDates {
            created: iso_date(append.created),
            last_modified: iso_date(append.modified),
            metadata_last_updated: iso_date(append.modified),
        },
        description,
    }
}

/// The trimmed value, or `default` when absent or blank.
fn text_or(value: &Option<String>, default: &str) -> String {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

/// User tags (comma separated), then the status and usage type.
///
/// The two computed tags always close the list; a user tag equal to either
/// is dropped from the user part instead.
fn collect_tags(user_tags: Option<&str>, status: &str, usage_type: &str) -> Vec<String> {
    let computed: Vec<&str> = [status, usage_type]
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    let mut tags: Vec<String> = Vec::new();
    for tag in user_tags.unwrap_or_default().split(',').map(str::trim) {
        if tag.is_empty() || computed.contains(&tag) || tags.iter().any(|t| t == tag) {
            continue;
        }
        tags.push(tag.to_string());
    }
    for tag in computed {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

fn iso_date(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
