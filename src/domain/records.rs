use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Where the source media of a record lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceRef {
    /// Directly downloadable URL
    Url(String),
    /// Identifier of an object in the object store
    Object(String),
}

fn share_link_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"/file/d/([A-Za-z0-9_-]+)").expect("valid regex"),
            Regex::new(r"[?&]id=([A-Za-z0-9_-]+)").expect("valid regex"),
        ]
    })
}

impl SourceRef {
    /// Interprets a raw table-store value.
    ///
    /// Object-store share links (`/file/d/<id>/` or `?id=<id>`) resolve to the
    /// object id, other http(s) values are plain URLs and anything else is
    /// taken as an object id. Blank values yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            for pattern in share_link_patterns() {
                if let Some(caps) = pattern.captures(raw) {
                    return Some(SourceRef::Object(caps[1].to_string()));
                }
            }
            return Some(SourceRef::Url(raw.to_string()));
        }
        Some(SourceRef::Object(raw.to_string()))
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Url(url) => write!(f, "{}", url),
            SourceRef::Object(id) => write!(f, "object:{}", id),
        }
    }
}

/// A row of the source table describing one video to split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Identifier assigned by the table store
    pub id: String,
    pub source: Option<SourceRef>,
    pub display_name: Option<String>,
    /// Folder the produced segments are uploaded into
    pub destination_folder: Option<String>,
    pub processed: bool,
}

/// Opaque pagination token handed out by the table store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor(pub String);

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of a listing. `next` is `None` on the last page.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<SourceRecord>,
    pub next: Option<PageCursor>,
}

/// Server-side filter applied while listing records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    pub formula: Option<String>,
    pub view: Option<String>,
}

impl RecordFilter {
    /// Only records whose processed flag is still unset.
    pub fn unprocessed(processed_field: &str, view: Option<String>) -> Self {
        Self {
            formula: Some(format!("{{{}}} = FALSE()", processed_field)),
            view,
        }
    }
}

/// Row appended to the destination table for every uploaded segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub name: String,
    pub url: String,
    /// Identifier of the source record this segment was cut from
    pub source_record_id: String,
}

/// Field changes written back to a source record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub processed: Option<bool>,
}

impl RecordPatch {
    pub fn mark_processed() -> Self {
        Self {
            processed: Some(true),
        }
    }
}
