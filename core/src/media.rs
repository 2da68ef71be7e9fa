//! Media pass-through: link rows to files of an external media batch
//!
//! The engine never opens these files or interprets the batch id; it only
//! matches a row's media column against the catalogue's file names.

use crate::store::Record;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Prefixes that media files commonly carry but data cells don't
const STRIPPED_PREFIXES: [&str; 5] = ["image_", "img_", "cropped_faces_", "crop_", "cropped_"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFile {
    #[serde(default)]
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl MediaFile {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            path: None,
            kind: None,
        }
    }

    fn display_name(&self) -> Option<String> {
        if !self.filename.is_empty() {
            return Some(self.filename.clone());
        }
        self.path
            .as_deref()
            .and_then(|p| Path::new(p).file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
    }
}

/// Files of one media batch, as provided by the media-serving layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaCatalog {
    pub batch_id: String,
    #[serde(default)]
    pub files: Vec<MediaFile>,
}

/// Media attached to a result row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub batch_id: String,
    pub filename: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Dataset whose media column produced the match
    pub dataset_index: usize,
}

/// Lower-cased file name without directory or extension
fn base_name(raw: &str) -> Option<String> {
    let stem = Path::new(raw.trim()).file_stem()?.to_string_lossy().to_lowercase();
    (!stem.is_empty()).then_some(stem)
}

/// Lookup from normalized base names to catalogue files.
///
/// Each file is reachable by its base name, by its base name without a known
/// prefix, and by the part after its last underscore. The first file to claim a
/// key keeps it.
#[derive(Debug, Clone)]
pub struct MediaIndex {
    batch_id: String,
    files: Vec<MediaFile>,
    keys: HashMap<String, usize>,
}

impl MediaIndex {
    pub fn build(catalog: MediaCatalog) -> Self {
        let mut keys = HashMap::new();

        for (position, file) in catalog.files.iter().enumerate() {
            let Some(base) = base_name(&file.filename) else {
                continue;
            };

            for prefix in STRIPPED_PREFIXES {
                if let Some(short) = base.strip_prefix(prefix).filter(|s| !s.is_empty()) {
                    keys.entry(short.to_string()).or_insert(position);
                }
            }
            if let Some((_, suffix)) = base.rsplit_once('_').filter(|(_, s)| !s.is_empty()) {
                keys.entry(suffix.to_string()).or_insert(position);
            }
            keys.entry(base).or_insert(position);
        }

        log::debug!(
            "Indexed {} media file(s) of batch {} under {} key(s)",
            catalog.files.len(),
            catalog.batch_id,
            keys.len()
        );

        Self {
            batch_id: catalog.batch_id,
            files: catalog.files,
            keys,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn lookup(&self, cell: &Value) -> Option<&MediaFile> {
        let text = match cell {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && n.as_i64().is_none() && n.as_u64().is_none() => {
                    format!("{}", f as i64)
                }
                _ => n.to_string(),
            },
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        let base = base_name(&text)?;
        self.keys.get(&base).map(|&position| &self.files[position])
    }

    /// Media for one aligned row: the first dataset, in order, whose media column
    /// resolves to a named file.
    pub fn resolve_row(&self, rows: &[Option<&Record>], media_column: &str) -> Option<MediaRef> {
        rows.iter().enumerate().find_map(|(dataset_index, row)| {
            let cell = row.and_then(|record| record.get(media_column))?;
            let file = self.lookup(cell)?;
            let filename = file.display_name()?;
            Some(MediaRef {
                batch_id: self.batch_id.clone(),
                filename,
                kind: file.kind.clone().unwrap_or_else(|| "unknown".to_string()),
                dataset_index,
            })
        })
    }
}
