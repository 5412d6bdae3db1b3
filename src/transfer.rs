//! Plaintext import and export.
//!
//! Exports are trusted and unbounded. Imports are untrusted: the shape and
//! every size ceiling are checked on the raw JSON before anything is turned
//! into application types, and any violation rejects the whole document.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, VaultError};
use crate::state::{Folder, Note, StoredState, Tag};

pub const MAX_NOTES: usize = 10_000;
pub const MAX_TAGS: usize = 1_000;
pub const MAX_FOLDERS: usize = 1_000;
pub const MAX_TITLE_CHARS: usize = 500;
pub const MAX_CONTENT_CHARS: usize = 1_000_000;
pub const MAX_TAG_NAME_CHARS: usize = 100;
pub const MAX_FOLDER_NAME_CHARS: usize = 200;
/// Raw size cap applied before parsing.
pub const MAX_IMPORT_BYTES: usize = 128 * 1024 * 1024;

/// The export file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: String,
    pub exported_at: i64,
    pub notes: Vec<Note>,
    pub tags: Vec<Tag>,
    pub folders: Vec<Folder>,
}

impl ExportDocument {
    pub fn from_state(state: &StoredState) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now().timestamp_millis(),
            notes: state.notes.clone(),
            tags: state.tags.clone(),
            folders: state.folders.clone(),
        }
    }
}

/// Pretty-printed export of `state`.
pub fn export(state: &StoredState) -> Result<String> {
    Ok(serde_json::to_string_pretty(&ExportDocument::from_state(state))?)
}

/// Parse and validate an import file.
pub fn parse_import(text: &str) -> Result<ExportDocument> {
    if text.len() > MAX_IMPORT_BYTES {
        return Err(invalid(format!(
            "file exceeds {MAX_IMPORT_BYTES} bytes"
        )));
    }

    let value: Value =
        serde_json::from_str(text).map_err(|e| invalid(format!("not valid JSON: {e}")))?;
    validate_import(value)
}

/// Validate untrusted JSON and convert it into an [`ExportDocument`].
///
/// Takes the value by ownership so a large document is converted in place.
pub fn validate_import(value: Value) -> Result<ExportDocument> {
    let root = value
        .as_object()
        .ok_or_else(|| invalid("top level must be an object"))?;

    if !root.get("version").is_some_and(Value::is_string) {
        return Err(invalid("missing or non-string 'version'"));
    }
    if !root.get("exportedAt").is_some_and(Value::is_number) {
        return Err(invalid("missing or non-numeric 'exportedAt'"));
    }

    let notes = array(root.get("notes"), "notes", MAX_NOTES)?;
    let tags = array(root.get("tags"), "tags", MAX_TAGS)?;
    let folders = array(root.get("folders"), "folders", MAX_FOLDERS)?;

    for (i, note) in notes.iter().enumerate() {
        let what = format!("notes[{i}]");
        check_entity(note, &what)?;
        check_text(note, "title", MAX_TITLE_CHARS, true, &what)?;
        check_text(note, "content", MAX_CONTENT_CHARS, false, &what)?;
    }
    for (i, tag) in tags.iter().enumerate() {
        let what = format!("tags[{i}]");
        check_entity(tag, &what)?;
        check_text(tag, "name", MAX_TAG_NAME_CHARS, true, &what)?;
    }
    for (i, folder) in folders.iter().enumerate() {
        let what = format!("folders[{i}]");
        check_entity(folder, &what)?;
        check_text(folder, "name", MAX_FOLDER_NAME_CHARS, true, &what)?;
    }

    serde_json::from_value(value).map_err(|e| invalid(format!("malformed entry: {e}")))
}

/// Validate `text` and merge it into `state`.
///
/// `state` is only touched once the whole document passed validation.
pub fn import_into(state: &mut StoredState, text: &str) -> Result<ImportSummary> {
    let doc = parse_import(text)?;
    let summary = ImportSummary {
        notes: doc.notes.len(),
        tags: doc.tags.len(),
        folders: doc.folders.len(),
    };
    state.merge(doc.notes, doc.tags, doc.folders);

    tracing::info!(
        notes = summary.notes,
        tags = summary.tags,
        folders = summary.folders,
        "imported"
    );
    Ok(summary)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub notes: usize,
    pub tags: usize,
    pub folders: usize,
}

fn invalid(msg: impl Into<String>) -> VaultError {
    VaultError::Validation(msg.into())
}

fn array<'a>(value: Option<&'a Value>, name: &str, max: usize) -> Result<&'a Vec<Value>> {
    let items = value
        .and_then(Value::as_array)
        .ok_or_else(|| invalid(format!("'{name}' must be an array")))?;
    if items.len() > max {
        return Err(invalid(format!(
            "too many {name}: {} (max {max})",
            items.len()
        )));
    }
    Ok(items)
}

fn check_entity(item: &Value, what: &str) -> Result<()> {
    let obj = item
        .as_object()
        .ok_or_else(|| invalid(format!("{what} must be an object")))?;
    match obj.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => Ok(()),
        _ => Err(invalid(format!("{what} needs a non-empty string 'id'"))),
    }
}

fn check_text(item: &Value, field: &str, max_chars: usize, required: bool, what: &str) -> Result<()> {
    match item.get(field) {
        Some(Value::String(s)) => {
            if s.chars().count() > max_chars {
                return Err(invalid(format!(
                    "{what}.{field} exceeds {max_chars} characters"
                )));
            }
            Ok(())
        }
        None if !required => Ok(()),
        _ => Err(invalid(format!("{what}.{field} must be a string"))),
    }
}
