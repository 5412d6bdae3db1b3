use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, VaultError};

/// Everything the editor persists: the plaintext sealed into the state blob.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredState {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub folders: Vec<Folder>,
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for StoredState {
    fn default() -> Self {
        Self {
            language: default_language(),
            notes: Vec::new(),
            tags: Vec::new(),
            folders: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Note {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            content: content.into(),
            tags: Vec::new(),
            folder_id: None,
            pinned: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            color: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Folder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            parent_id: None,
        }
    }
}

impl StoredState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    pub fn add_note(&mut self, note: Note) -> Result<()> {
        if self.note(&note.id).is_some() {
            return Err(VaultError::InvalidState(format!(
                "note '{}' already exists",
                note.id
            )));
        }
        self.notes.push(note);
        Ok(())
    }

    pub fn update_note(&mut self, id: &str, title: Option<&str>, content: Option<&str>) -> Result<()> {
        let note = self
            .notes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| VaultError::NotFound(format!("note '{id}'")))?;

        if let Some(title) = title {
            note.title = title.to_string();
        }
        if let Some(content) = content {
            note.content = content.to_string();
        }
        note.updated_at = Utc::now().timestamp_millis();
        Ok(())
    }

    pub fn remove_note(&mut self, id: &str) -> Result<Note> {
        let idx = self
            .notes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| VaultError::NotFound(format!("note '{id}'")))?;
        Ok(self.notes.remove(idx))
    }

    /// Merge validated import data.
    ///
    /// Entities with an id already present are replaced, others appended.
    /// The language setting is kept.
    pub fn merge(&mut self, notes: Vec<Note>, tags: Vec<Tag>, folders: Vec<Folder>) {
        merge_by_id(&mut self.notes, notes, |n| &n.id);
        merge_by_id(&mut self.tags, tags, |t| &t.id);
        merge_by_id(&mut self.folders, folders, |f| &f.id);
    }
}

fn merge_by_id<T>(existing: &mut Vec<T>, incoming: Vec<T>, id: impl Fn(&T) -> &String) {
    for item in incoming {
        match existing.iter().position(|e| id(e) == id(&item)) {
            Some(idx) => existing[idx] = item,
            None => existing.push(item),
        }
    }
}
