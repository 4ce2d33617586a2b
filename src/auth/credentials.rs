//! File-backed credential store
//!
//! Admin and customer identities with their secret keys and activation
//! status, loaded from a JSON file at startup. Every mutation rewrites the
//! whole table through a temp-file-then-atomic-rename, so a crash mid-write
//! can never leave a corrupt store behind. All mutations are serialized
//! through the store's lock, which is held across the file replace; these
//! are rare admin operations, not hot-path work.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::models::{IdentityStatus, Role};
use crate::registry::RelayError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub secret_key: String,
    pub status: IdentityStatus,
}

/// On-disk shape of the credential table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CredentialTable {
    #[serde(default)]
    admins: BTreeMap<String, CredentialRecord>,
    #[serde(default)]
    customers: BTreeMap<String, CredentialRecord>,
}

impl CredentialTable {
    fn namespace(&self, role: Role) -> &BTreeMap<String, CredentialRecord> {
        match role {
            Role::Admin => &self.admins,
            Role::Customer => &self.customers,
        }
    }

    fn namespace_mut(&mut self, role: Role) -> &mut BTreeMap<String, CredentialRecord> {
        match role {
            Role::Admin => &mut self.admins,
            Role::Customer => &mut self.customers,
        }
    }
}

/// Thread-safe credential store with whole-file write-through
pub struct CredentialStore {
    path: PathBuf,
    table: Mutex<CredentialTable>,
}

impl CredentialStore {
    /// Load the store from `path`; a missing file starts an empty table
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let table = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(
                    "credential file {} not found, starting with an empty table",
                    path.display()
                );
                CredentialTable::default()
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    /// Exact-match validation: id exists under the role, key matches and the
    /// identity is active
    ///
    /// The key comparison is constant-time so response timing does not leak
    /// how much of a guessed key was correct.
    pub fn validate(&self, role: Role, id: &str, secret_key: &str) -> bool {
        let table = self.table.lock();
        match table.namespace(role).get(id) {
            Some(record) => {
                constant_time_eq(record.secret_key.as_bytes(), secret_key.as_bytes())
                    && record.status == IdentityStatus::Active
            }
            None => false,
        }
    }

    /// Add a new identity; rejects a duplicate id within the role namespace
    pub fn add(&self, role: Role, id: &str, secret_key: &str) -> Result<(), RelayError> {
        self.mutate(|table| {
            let namespace = table.namespace_mut(role);
            if namespace.contains_key(id) {
                return Err(RelayError::AlreadyExists(format!("{} {}", role, id)));
            }
            namespace.insert(
                id.to_string(),
                CredentialRecord {
                    secret_key: secret_key.to_string(),
                    status: IdentityStatus::Active,
                },
            );
            Ok(())
        })
    }

    /// Remove an identity outright
    pub fn revoke(&self, role: Role, id: &str) -> Result<(), RelayError> {
        self.mutate(|table| {
            table
                .namespace_mut(role)
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| RelayError::NotFound(format!("{} {}", role, id)))
        })
    }

    /// Flip an identity's activation status
    pub fn set_status(&self, role: Role, id: &str, status: IdentityStatus) -> Result<(), RelayError> {
        self.mutate(|table| {
            let record = table
                .namespace_mut(role)
                .get_mut(id)
                .ok_or_else(|| RelayError::NotFound(format!("{} {}", role, id)))?;
            record.status = status;
            Ok(())
        })
    }

    /// Ordered listing of ids with masked keys
    ///
    /// The full key value never leaves the store through this path.
    pub fn list(&self, role: Role) -> Vec<(String, String, IdentityStatus)> {
        let table = self.table.lock();
        table
            .namespace(role)
            .iter()
            .map(|(id, record)| (id.clone(), mask_secret(&record.secret_key), record.status))
            .collect()
    }

    /// Number of identities under a role
    pub fn count(&self, role: Role) -> usize {
        self.table.lock().namespace(role).len()
    }

    /// Apply a mutation to a copy of the table, persist it, then commit
    ///
    /// The in-memory table only changes once the file replace succeeded, so
    /// memory and disk cannot drift apart on a write failure.
    fn mutate<F>(&self, op: F) -> Result<(), RelayError>
    where
        F: FnOnce(&mut CredentialTable) -> Result<(), RelayError>,
    {
        let mut table = self.table.lock();
        let mut updated = table.clone();
        op(&mut updated)?;
        self.persist(&updated)?;
        *table = updated;
        Ok(())
    }

    fn persist(&self, table: &CredentialTable) -> io::Result<()> {
        let raw = serde_json::to_vec_pretty(table)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, &raw)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// Byte-wise comparison that does not short-circuit on the first mismatch
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Reveal only a short prefix and suffix of a secret key
///
/// Counts characters rather than bytes so multi-byte keys mask cleanly.
fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "********".to_string();
    }
    let prefix: String = chars[..3].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("{}***{}", prefix, suffix)
}
