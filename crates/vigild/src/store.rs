//! JSON-file store.
//!
//! One document under the data path holds everything the daemon persists:
//! scoped tokens, the per-identity token index, identity secrets written by
//! the account auth flow, known identities, and saved presence. Writes are
//! best-effort — a failed write is logged and the daemon keeps running on
//! its in-memory state.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use vigil_core::ScopedToken;
use vigil_services::{SavedPresence, Store};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Document {
    tokens: BTreeMap<String, ScopedToken>,
    token_ids: BTreeMap<String, Vec<String>>,
    identity_secrets: BTreeMap<String, String>,
    known_identities: BTreeSet<String>,
    saved_presence: BTreeMap<String, SavedPresence>,
}

pub struct JsonStore {
    path: PathBuf,
    doc: Mutex<Document>,
}

impl JsonStore {
    /// Open (or create) the store at `<data_path>/store.json`.
    pub fn open(data_path: PathBuf) -> Self {
        let path = data_path.join("store.json");
        let doc = Self::load_from_disk(&path);
        Self {
            path,
            doc: Mutex::new(doc),
        }
    }

    fn load_from_disk(path: &PathBuf) -> Document {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Document::default(),
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "failed to read store");
                return Document::default();
            }
        };
        match serde_json::from_str(&text) {
            Ok(doc) => doc,
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "failed to parse store");
                Document::default()
            }
        }
    }

    /// Serialize the document to disk. Best-effort — logs on failure.
    fn save_to_disk(&self, doc: &Document) {
        if let Some(parent) = self.path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                tracing::warn!(error = %err, "failed to create store directory");
                return;
            }
        }
        match serde_json::to_string_pretty(doc) {
            Ok(json) => {
                if let Err(err) = std::fs::write(&self.path, json) {
                    tracing::warn!(error = %err, path = %self.path.display(), "failed to persist store");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize store");
            }
        }
    }

    fn mutate(&self, apply: impl FnOnce(&mut Document)) {
        let mut doc = self.doc.lock().unwrap_or_else(|e| e.into_inner());
        apply(&mut doc);
        self.save_to_disk(&doc);
    }

    fn read<T>(&self, read: impl FnOnce(&Document) -> T) -> T {
        let doc = self.doc.lock().unwrap_or_else(|e| e.into_inner());
        read(&doc)
    }
}

#[async_trait]
impl Store for JsonStore {
    async fn load_token(&self, id: &str) -> Option<ScopedToken> {
        self.read(|doc| doc.tokens.get(id).cloned())
    }

    async fn save_token(&self, token: &ScopedToken) {
        self.mutate(|doc| {
            doc.tokens.insert(token.token.clone(), token.clone());
        });
    }

    async fn delete_token(&self, id: &str) {
        self.mutate(|doc| {
            doc.tokens.remove(id);
        });
    }

    async fn token_ids(&self, identity: &str) -> Vec<String> {
        self.read(|doc| doc.token_ids.get(identity).cloned().unwrap_or_default())
    }

    async fn set_token_ids(&self, identity: &str, ids: &[String]) {
        self.mutate(|doc| {
            doc.token_ids.insert(identity.to_string(), ids.to_vec());
        });
    }

    async fn identity_secret(&self, identity: &str) -> Option<String> {
        self.read(|doc| doc.identity_secrets.get(identity).cloned())
    }

    async fn add_known_identity(&self, identity: &str) {
        self.mutate(|doc| {
            doc.known_identities.insert(identity.to_string());
        });
    }

    async fn known_identities(&self) -> Vec<String> {
        self.read(|doc| doc.known_identities.iter().cloned().collect())
    }

    async fn load_presence(&self, id: &str) -> Option<SavedPresence> {
        self.read(|doc| doc.saved_presence.get(id).cloned())
    }

    async fn save_presence(&self, id: &str, saved: &SavedPresence) {
        self.mutate(|doc| {
            doc.saved_presence.insert(id.to_string(), saved.clone());
        });
    }
}
