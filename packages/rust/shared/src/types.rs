//! Core domain types: list records on the way in, the code.json manifest on
//! the way out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Agency reported in every manifest header.
pub const AGENCY: &str = "VA";

/// code.json schema version written to the manifest header.
pub const MANIFEST_VERSION: &str = "2.0.0";

/// Measurement method written to the manifest header.
pub const MEASUREMENT_METHOD: &str = "modules";

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 identifier for one export run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ImportRecord
// ---------------------------------------------------------------------------

/// One row of the reference (import) collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    /// Numeric system identifier; the join key. `None` when the cell is
    /// blank or not a number, so the row never joins.
    #[serde(rename = "VASI_x0020_Id", default, deserialize_with = "de_optional_int")]
    pub vasi_id: Option<i64>,
    #[serde(rename = "System_x0020_Name", default)]
    pub system_name: String,
    #[serde(rename = "Software_x0020_Type", default)]
    pub software_type: Option<String>,
    /// Development / Production / Inactive / ...
    #[serde(rename = "System_x0020_Status", default)]
    pub system_status: String,
    /// Delimited list of technologies, if any.
    #[serde(
        rename = "Technology_x0020_Components",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub technology_components: Option<String>,
}

// ---------------------------------------------------------------------------
// AppendRecord
// ---------------------------------------------------------------------------

/// Permission model of a release.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UsageType {
    #[serde(rename = "openSource")]
    OpenSource,
    #[default]
    #[serde(rename = "governmentWideReuse", alias = "governmentWideResuse")]
    GovernmentWideReuse,
}

impl UsageType {
    /// Wire spelling, as written to code.json.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenSource => "openSource",
            Self::GovernmentWideReuse => "governmentWideReuse",
        }
    }
}

impl std::fmt::Display for UsageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user-maintained augmentation row of the append collection.
///
/// Column names follow the list's internal field names. Absent columns
/// deserialize to their defaults; the pipeline never assumes a column the
/// read allow-list did not select.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppendRecord {
    /// List item id. `None` for rows not yet created.
    #[serde(rename = "Id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// String-encoded import key (`vasi_id`).
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "codeVersion", default)]
    pub code_version: Option<String>,
    #[serde(rename = "usageType", default, deserialize_with = "de_usage_type")]
    pub usage_type: UsageType,
    #[serde(rename = "licenseName", default)]
    pub license_name: Option<String>,
    #[serde(rename = "opRL", default)]
    pub license_url: Option<String>,
    #[serde(rename = "homepageURL", default)]
    pub homepage_url: Option<String>,
    #[serde(rename = "downloadURL", default)]
    pub download_url: Option<String>,
    #[serde(rename = "disclaimerURL", default)]
    pub disclaimer_url: Option<String>,
    #[serde(rename = "repositoryURL", default)]
    pub repository_url: Option<String>,
    #[serde(default)]
    pub vcs: Option<String>,
    #[serde(rename = "laborHours", default, deserialize_with = "de_lenient_int")]
    pub labor_hours: i64,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub disclaimer: Option<String>,
    #[serde(
        rename = "Created",
        default,
        deserialize_with = "de_lenient_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub created: Option<DateTime<Utc>>,
    #[serde(
        rename = "Modified",
        default,
        deserialize_with = "de_lenient_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub modified: Option<DateTime<Utc>>,
}

impl AppendRecord {
    /// The minimal shape persisted to the append list on create/update.
    ///
    /// Only user-editable columns are emitted; identity, timestamps and any
    /// derived values stay out of the write body.
    pub fn persisted_fields(&self) -> serde_json::Map<String, serde_json::Value> {
        use serde_json::Value;

        fn text(v: &Option<String>) -> Value {
            v.as_ref().map_or(Value::Null, |s| Value::String(s.clone()))
        }

        let mut fields = serde_json::Map::new();
        fields.insert("Title".into(), Value::String(self.title.clone()));
        fields.insert("codeVersion".into(), text(&self.code_version));
        fields.insert(
            "usageType".into(),
            Value::String(self.usage_type.as_str().into()),
        );
        fields.insert("licenseName".into(), text(&self.license_name));
        fields.insert("opRL".into(), text(&self.license_url));
        fields.insert("downloadURL".into(), text(&self.download_url));
        fields.insert("homepageURL".into(), text(&self.homepage_url));
        fields.insert("disclaimerURL".into(), text(&self.disclaimer_url));
        fields.insert("repositoryURL".into(), text(&self.repository_url));
        fields.insert("vcs".into(), text(&self.vcs));
        fields.insert("laborHours".into(), Value::from(self.labor_hours));
        fields.insert("tags".into(), text(&self.tags));
        fields.insert("disclaimer".into(), text(&self.disclaimer));
        fields
    }
}

// ---------------------------------------------------------------------------
// ManifestDocument
// ---------------------------------------------------------------------------

/// The exported `code.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDocument {
    pub agency: String,
    pub version: String,
    pub measurement_type: MeasurementType,
    pub releases: Vec<ReleaseEntry>,
}

impl ManifestDocument {
    /// Build a manifest with the fixed header around `releases`.
    pub fn new(releases: Vec<ReleaseEntry>) -> Self {
        Self {
            agency: AGENCY.into(),
            version: MANIFEST_VERSION.into(),
            measurement_type: MeasurementType {
                method: MEASUREMENT_METHOD.into(),
            },
            releases,
        }
    }
}

/// `measurementType` header object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementType {
    pub method: String,
}

/// One `releases[]` entry of the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseEntry {
    pub id: String,
    pub name: String,
    pub organization: String,
    pub version: String,
    pub status: String,
    pub permissions: Permissions,
    #[serde(rename = "homepageURL")]
    pub homepage_url: String,
    #[serde(rename = "downloadURL")]
    pub download_url: String,
    #[serde(rename = "disclaimerURL")]
    pub disclaimer_url: String,
    #[serde(rename = "repositoryURL")]
    pub repository_url: String,
    #[serde(rename = "disclaimerText")]
    pub disclaimer_text: String,
    pub vcs: String,
    #[serde(rename = "laborHours")]
    pub labor_hours: i64,
    pub tags: Vec<String>,
    pub languages: Vec<String>,
    pub contact: Contact,
    pub date: ReleaseDates,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub usage_type: UsageType,
    pub licenses: Vec<License>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub name: String,
    #[serde(rename = "URL")]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
}

/// ISO `YYYY-MM-DD` dates; empty when the source row carried none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseDates {
    pub created: String,
    pub last_modified: String,
    pub metadata_last_updated: String,
}

// ---------------------------------------------------------------------------
// Lenient list-column decoding
// ---------------------------------------------------------------------------

/// List number columns arrive as JSON numbers, floats or numeric strings.
/// Values outside the `i64` range count as unreadable.
fn value_to_int(value: &serde_json::Value) -> Option<i64> {
    let float = match value {
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => return Some(i),
            None => n.as_f64()?,
        },
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    float_to_int(float)
}

fn float_to_int(f: f64) -> Option<i64> {
    // 2^63 is exactly representable; anything at or past it would saturate.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    let t = f.trunc();
    (t.is_finite() && t >= -LIMIT && t < LIMIT).then(|| t as i64)
}

fn de_lenient_int<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<i64, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    Ok(value.as_ref().and_then(value_to_int).unwrap_or(0))
}

fn de_optional_int<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<i64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    let parsed = value.as_ref().and_then(value_to_int);
    if parsed.is_none() {
        if let Some(raw) = value.as_ref().filter(|v| !v.is_null()) {
            tracing::warn!(value = %raw, "unreadable numeric id, row will not join");
        }
    }
    Ok(parsed)
}

/// A bad date cell degrades that one value to `None`.
fn de_lenient_datetime<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
            .map(|d| d.with_timezone(&Utc))
            .ok(),
        _ => None,
    })
}

fn de_usage_type<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<UsageType, D::Error> {
    Ok(Option::<UsageType>::deserialize(d)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn import_record_from_list_json() {
        let json = r#"{
            "VASI_x0020_Id": 1234,
            "System_x0020_Name": "Alpha",
            "Software_x0020_Type": "Custom Development",
            "System_x0020_Status": "Production",
            "Technology_x0020_Components": "Java;#Oracle"
        }"#;
        let record: ImportRecord = serde_json::from_str(json).expect("deserialize");
        assert_eq!(record.vasi_id, Some(1234));
        assert_eq!(record.system_name, "Alpha");
        assert_eq!(record.technology_components.as_deref(), Some("Java;#Oracle"));
    }

    #[test]
    fn import_record_accepts_string_and_float_ids() {
        let a: ImportRecord =
            serde_json::from_str(r#"{"VASI_x0020_Id": "42"}"#).expect("string id");
        let b: ImportRecord =
            serde_json::from_str(r#"{"VASI_x0020_Id": 42.0}"#).expect("float id");
        assert_eq!(a.vasi_id, Some(42));
        assert_eq!(b.vasi_id, Some(42));
    }

    #[test]
    fn unreadable_import_ids_decode_as_none() {
        for raw in [r#"null"#, r#""""#, r#""  ""#, r#""abc""#, r#"1e30"#, r#"{}"#] {
            let json = format!(r#"{{"VASI_x0020_Id": {raw}, "System_x0020_Name": "X"}}"#);
            let record: ImportRecord = serde_json::from_str(&json).expect("row still decodes");
            assert_eq!(record.vasi_id, None, "id {raw}");
            assert_eq!(record.system_name, "X");
        }
        let missing: ImportRecord = serde_json::from_str(r#"{"System_x0020_Name": "Y"}"#).unwrap();
        assert_eq!(missing.vasi_id, None);
    }

    #[test]
    fn out_of_range_labor_hours_default_to_zero() {
        for raw in ["1e30", "-1e30", r#""1e19""#, "9223372036854775808"] {
            let json = format!(r#"{{"Title": "1", "laborHours": {raw}}}"#);
            let record: AppendRecord = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(record.labor_hours, 0, "laborHours {raw}");
        }
        let max: AppendRecord =
            serde_json::from_str(r#"{"Title": "1", "laborHours": 9223372036854775807}"#).unwrap();
        assert_eq!(max.labor_hours, i64::MAX);
        let float: AppendRecord =
            serde_json::from_str(r#"{"Title": "1", "laborHours": "12.7"}"#).unwrap();
        assert_eq!(float.labor_hours, 12);
    }

    #[test]
    fn bad_date_cells_degrade_to_none() {
        let record: AppendRecord = serde_json::from_str(
            r#"{"Title": "1", "Created": "not a date", "Modified": "2023-06-07T08:09:10Z"}"#,
        )
        .expect("deserialize");
        assert!(record.created.is_none());
        assert_eq!(
            record.modified,
            Some(Utc.with_ymd_and_hms(2023, 6, 7, 8, 9, 10).unwrap())
        );

        let odd: AppendRecord =
            serde_json::from_str(r#"{"Title": "1", "Created": 17, "Modified": null}"#).unwrap();
        assert!(odd.created.is_none());
        assert!(odd.modified.is_none());
    }

    #[test]
    fn append_record_defaults_missing_columns() {
        let record: AppendRecord =
            serde_json::from_str(r#"{"Id": 7, "Title": "100", "usageType": null}"#)
                .expect("deserialize");
        assert_eq!(record.id, Some(7));
        assert_eq!(record.usage_type, UsageType::GovernmentWideReuse);
        assert_eq!(record.labor_hours, 0);
        assert!(record.repository_url.is_none());
    }

    #[test]
    fn usage_type_accepts_legacy_spelling() {
        let record: AppendRecord =
            serde_json::from_str(r#"{"Title": "1", "usageType": "governmentWideResuse"}"#)
                .expect("deserialize");
        assert_eq!(record.usage_type, UsageType::GovernmentWideReuse);
        assert_eq!(
            serde_json::to_string(&record.usage_type).unwrap(),
            "\"governmentWideReuse\""
        );
    }

    #[test]
    fn persisted_fields_is_an_allow_list() {
        let record = AppendRecord {
            id: Some(3),
            title: "100".into(),
            labor_hours: 12,
            repository_url: Some("https://github.com/org/repo".into()),
            created: Some(Utc::now()),
            ..Default::default()
        };
        let fields = record.persisted_fields();
        assert!(!fields.contains_key("Id"));
        assert!(!fields.contains_key("Created"));
        assert!(!fields.contains_key("Modified"));
        assert_eq!(fields["Title"], "100");
        assert_eq!(fields["laborHours"], 12);
        assert_eq!(fields["repositoryURL"], "https://github.com/org/repo");
        assert_eq!(fields.len(), 13);
    }

    #[test]
    fn empty_manifest_has_fixed_header() {
        let manifest = ManifestDocument::new(vec![]);
        let json = serde_json::to_value(&manifest).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "agency": "VA",
                "version": "2.0.0",
                "measurementType": { "method": "modules" },
                "releases": []
            })
        );
    }
}
