//! Durable per-OP registration-secret storage.
//!
//! An RP federating with many OPs holds one registration secret per OP in
//! a single JSON document owned by exactly one RP identity. Every
//! mutation persists the whole document synchronously before returning;
//! this is local-disk I/O off the hot path, so blocking briefly is
//! acceptable.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{FedResult, FederationError};
use crate::models::CredentialRecord;

/// One OP's entry in the on-disk document. The OP identifier is the map
/// key, so it is not repeated here.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCredential {
    client_secret: String,
    registered_at: DateTime<Utc>,
}

/// The on-disk document: `{rpEntityId, ops: {opId: {...}}}`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsFile {
    rp_entity_id: String,
    ops: HashMap<String, StoredCredential>,
}

/// The legacy single-OP layout this store migrates away from.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyCredentialsFile {
    #[allow(dead_code)]
    entity_id: String,
    client_secret: String,
    registered_at: DateTime<Utc>,
}

/// File-backed store of per-OP registration secrets for one RP identity.
pub struct CredentialStore {
    rp_entity_id: String,
    path: PathBuf,
    ops: Mutex<HashMap<String, StoredCredential>>,
}

impl CredentialStore {
    /// Open (or initialize) the store at `path` for `rp_entity_id`.
    ///
    /// A persisted file owned by a *different* RP identity is treated as
    /// foreign and ignored wholesale: the store starts empty and the file
    /// is left untouched until the first mutation. A corrupt file is an
    /// error.
    pub fn new(rp_entity_id: impl Into<String>, path: impl Into<PathBuf>) -> FedResult<Self> {
        let rp_entity_id = rp_entity_id.into();
        let path = path.into();

        let ops = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| {
                FederationError::CredentialsLoadFailed {
                    path: path.display().to_string(),
                    detail: e.to_string(),
                }
            })?;
            let file: CredentialsFile = serde_json::from_str(&raw).map_err(|e| {
                FederationError::CredentialsLoadFailed {
                    path: path.display().to_string(),
                    detail: format!("not a valid credentials document: {e}"),
                }
            })?;
            if file.rp_entity_id == rp_entity_id {
                debug!(
                    rp_entity_id,
                    ops = file.ops.len(),
                    "loaded persisted credentials"
                );
                file.ops
            } else {
                warn!(
                    rp_entity_id,
                    file_owner = file.rp_entity_id,
                    "credential file belongs to a different RP identity, ignoring it"
                );
                HashMap::new()
            }
        } else {
            HashMap::new()
        };

        Ok(Self {
            rp_entity_id,
            path,
            ops: Mutex::new(ops),
        })
    }

    /// Upsert the secret for one OP. `registered_at` is refreshed to now,
    /// including on overwrite.
    pub fn store(&self, op_entity_id: &str, client_secret: impl Into<String>) -> FedResult<()> {
        self.store_at(op_entity_id, client_secret.into(), Utc::now())
    }

    /// The stored record for one OP, if any.
    pub fn get(&self, op_entity_id: &str) -> Option<CredentialRecord> {
        let ops = self.ops.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        ops.get(op_entity_id).map(|stored| CredentialRecord {
            op_entity_id: op_entity_id.to_string(),
            client_secret: stored.client_secret.clone(),
            registered_at: stored.registered_at,
        })
    }

    /// Whether a secret is held for this OP.
    pub fn has(&self, op_entity_id: &str) -> bool {
        let ops = self.ops.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        ops.contains_key(op_entity_id)
    }

    /// Remove one OP's record without touching others. Returns whether it
    /// was present.
    pub fn remove(&self, op_entity_id: &str) -> FedResult<bool> {
        let mut ops = self.ops.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if ops.remove(op_entity_id).is_none() {
            return Ok(false);
        }
        self.persist(&ops)?;
        info!(op_entity_id, "credentials removed");
        Ok(true)
    }

    /// Empty the store.
    pub fn clear_all(&self) -> FedResult<()> {
        let mut ops = self.ops.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        ops.clear();
        self.persist(&ops)?;
        info!("all credentials cleared");
        Ok(())
    }

    /// OP identifiers with stored credentials, in no particular order.
    pub fn registered_ops(&self) -> Vec<String> {
        let ops = self.ops.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        ops.keys().cloned().collect()
    }

    /// One-time upgrade from the legacy single-OP layout
    /// `{entityId, clientSecret, registeredAt}` at `legacy_path`.
    ///
    /// If the file holds that shape, its secret is stored under
    /// `current_op_entity_id` (keeping its original registration time) and
    /// `true` is returned. An absent or already new-shaped file is left
    /// alone and reported as `false`. Idempotent.
    pub fn migrate_from_old_format(
        &self,
        legacy_path: &Path,
        current_op_entity_id: &str,
    ) -> FedResult<bool> {
        if !legacy_path.exists() {
            return Ok(false);
        }
        let raw = fs::read_to_string(legacy_path).map_err(|e| {
            FederationError::CredentialsLoadFailed {
                path: legacy_path.display().to_string(),
                detail: e.to_string(),
            }
        })?;
        let Ok(legacy) = serde_json::from_str::<LegacyCredentialsFile>(&raw) else {
            debug!(
                path = %legacy_path.display(),
                "file is not in the legacy layout, nothing to migrate"
            );
            return Ok(false);
        };

        self.store_at(
            current_op_entity_id,
            legacy.client_secret,
            legacy.registered_at,
        )?;
        info!(
            op_entity_id = current_op_entity_id,
            "migrated legacy single-OP credentials"
        );
        Ok(true)
    }

    fn store_at(
        &self,
        op_entity_id: &str,
        client_secret: String,
        registered_at: DateTime<Utc>,
    ) -> FedResult<()> {
        let mut ops = self.ops.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        ops.insert(
            op_entity_id.to_string(),
            StoredCredential {
                client_secret,
                registered_at,
            },
        );
        self.persist(&ops)?;
        debug!(op_entity_id, "credentials stored");
        Ok(())
    }

    /// Write the whole document to disk. Called under the store lock so
    /// the file always reflects a consistent snapshot.
    fn persist(&self, ops: &HashMap<String, StoredCredential>) -> FedResult<()> {
        let file = CredentialsFile {
            rp_entity_id: self.rp_entity_id.clone(),
            ops: ops.clone(),
        };
        let body = serde_json::to_string_pretty(&file).map_err(|e| {
            FederationError::CredentialsStorageFailed {
                path: self.path.display().to_string(),
                detail: e.to_string(),
            }
        })?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    FederationError::CredentialsStorageFailed {
                        path: self.path.display().to_string(),
                        detail: e.to_string(),
                    }
                })?;
            }
        }
        fs::write(&self.path, body).map_err(|e| FederationError::CredentialsStorageFailed {
            path: self.path.display().to_string(),
            detail: e.to_string(),
        })
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("rp_entity_id", &self.rp_entity_id)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
