//! Values derived from the mirror: tags and retrieved files.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A version tag resolved to the commit it ultimately points at.
///
/// Tags are recomputed from the mirror on every query and never stored.
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use confmirror_core::Tag;
///
/// let tag = Tag::new("v1.0", "3f2a9c0", Utc.timestamp_opt(1_700_000_000, 0).unwrap());
/// assert_eq!(tag.name(), "v1.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    name: String,
    commit_id: String,
    timestamp: DateTime<Utc>,
}

impl Tag {
    /// Creates a new tag.
    pub fn new(
        name: impl Into<String>,
        commit_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            commit_id: commit_id.into(),
            timestamp,
        }
    }

    /// Returns the short tag name (without `refs/tags/`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the hex id of the peeled commit.
    pub fn commit_id(&self) -> &str {
        &self.commit_id
    }

    /// Returns the author timestamp of the peeled commit.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Orders tags newest first, breaking ties by name descending.
    pub fn timeline_order(a: &Tag, b: &Tag) -> std::cmp::Ordering {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.name.cmp(&a.name))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, &self.commit_id[..8.min(self.commit_id.len())])
    }
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A file as it existed at a given tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedFile {
    file_name: String,
    mime_type: String,
    data: Vec<u8>,
}

impl RetrievedFile {
    /// Creates a retrieved file from raw blob content.
    ///
    /// A leading UTF-8 byte-order mark is stripped and the MIME type is
    /// derived from the extension and the content.
    pub fn from_blob(file_name: impl Into<String>, content: &[u8]) -> Self {
        let file_name = file_name.into();
        let data = content.strip_prefix(UTF8_BOM).unwrap_or(content).to_vec();
        let mime_type = mime_type_for(&file_name, std::str::from_utf8(&data).is_ok());

        Self {
            file_name,
            mime_type: mime_type.to_string(),
            data,
        }
    }

    /// Returns the repository-relative path.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Returns the MIME type.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Returns the content bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the content decoded as UTF-8.
    pub fn text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.data)
    }
}

fn mime_type_for(file_name: &str, is_text: bool) -> &'static str {
    if !is_text {
        return "application/octet-stream";
    }

    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "toml" => "application/toml",
        "json" => "application/json",
        "yaml" | "yml" => "application/yaml",
        "xml" => "application/xml",
        _ => "text/plain",
    }
}
