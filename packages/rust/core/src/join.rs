//! Join of the append collection onto the import collection.
//!
//! Append rows carry their import key as a string `Title`; it is parsed as an
//! integer and matched against `vasi_id`. Rows whose key resolves to nothing
//! are kept for display but never reach the manifest.

use std::collections::HashMap;

use tracing::{info, instrument, warn};

use codejson_shared::{AppendRecord, ImportFilterConfig, ImportRecord};

/// An import row and its matched append row, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRecord {
    pub import: ImportRecord,
    pub append: Option<AppendRecord>,
}

/// An append row as shown to an operator: the source row plus the system
/// name derived from its key.
#[derive(Debug, Clone, PartialEq)]
pub struct AppendView {
    pub record: AppendRecord,
    /// `None` when the key does not resolve to an import row.
    pub system_name: Option<String>,
}

impl AppendView {
    /// Whether the row's key resolved to an import row.
    pub fn validated(&self) -> bool {
        self.system_name.is_some()
    }
}

/// An append row whose key matches no import row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchedKey {
    pub id: Option<i64>,
    pub title: String,
}

impl std::fmt::Display for UnmatchedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.id {
            Some(id) => write!(f, "item {id} (key '{}')", self.title),
            None => write!(f, "key '{}'", self.title),
        }
    }
}

/// Everything the join produces.
#[derive(Debug, Clone, Default)]
pub struct JoinOutcome {
    /// Import order; one entry per import row.
    pub records: Vec<JoinedRecord>,
    /// Append order; one entry per append row.
    pub append_view: Vec<AppendView>,
    pub unmatched: Vec<UnmatchedKey>,
}

/// Parse a key the way list titles are typed in: optional leading
/// whitespace and sign, then digits; anything after the digits is ignored.
pub fn parse_key(title: &str) -> Option<i64> {
    let s = title.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return None;
    }
    let value: i64 = rest[..digits_len].parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Keep the import rows admitted by the configured filter.
pub fn apply_import_filter(filter: &ImportFilterConfig, imports: Vec<ImportRecord>) -> Vec<ImportRecord> {
    let before = imports.len();
    let kept: Vec<ImportRecord> = imports
        .into_iter()
        .filter(|r| import_matches(filter, r))
        .collect();
    info!(before, after = kept.len(), "import filter applied");
    kept
}

fn import_matches(filter: &ImportFilterConfig, record: &ImportRecord) -> bool {
    let type_ok = filter.software_type.is_empty()
        || record.software_type.as_deref() == Some(filter.software_type.as_str());
    let status_ok =
        filter.statuses.is_empty() || filter.statuses.iter().any(|s| *s == record.system_status);
    type_ok && status_ok
}

/// Join append rows onto import rows by key.
///
/// For each import row the first append row (in append order) with the same
/// key is attached. Unresolvable append keys are reported, not raised.
#[instrument(skip_all, fields(imports = imports.len(), appends = appends.len()))]
pub fn join(imports: Vec<ImportRecord>, appends: Vec<AppendRecord>) -> JoinOutcome {
    // First import row per key, first append row per key.
    let mut import_by_key: HashMap<i64, usize> = HashMap::new();
    for (i, record) in imports.iter().enumerate() {
        if let Some(key) = record.vasi_id {
            import_by_key.entry(key).or_insert(i);
        }
    }
    let mut append_by_key: HashMap<i64, usize> = HashMap::new();
    for (i, record) in appends.iter().enumerate() {
        if let Some(key) = parse_key(&record.title) {
            append_by_key.entry(key).or_insert(i);
        }
    }

    let mut append_view = Vec::with_capacity(appends.len());
    let mut unmatched = Vec::new();
    for record in &appends {
        let system_name = parse_key(&record.title)
            .and_then(|key| import_by_key.get(&key))
            .map(|&i| imports[i].system_name.clone());

        if system_name.is_none() {
            warn!(id = ?record.id, title = %record.title, "append key matches no import record");
            unmatched.push(UnmatchedKey {
                id: record.id,
                title: record.title.clone(),
            });
        }

        append_view.push(AppendView {
            record: record.clone(),
            system_name,
        });
    }

    let records: Vec<JoinedRecord> = imports
        .into_iter()
        .map(|import| {
            let append = import
                .vasi_id
                .and_then(|key| append_by_key.get(&key))
                .map(|&i| appends[i].clone());
            JoinedRecord { import, append }
        })
        .collect();

    info!(
        matched = records.iter().filter(|r| r.append.is_some()).count(),
        unmatched = unmatched.len(),
        "join complete"
    );

    JoinOutcome {
        records,
        append_view,
        unmatched,
    }
}
