//! Credential storage and persistence.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::auth::identity::{Identity, SubjectId};
use crate::auth::snapshot;
use crate::error::StoreError;
use crate::observability::metrics;

/// Number of random bytes behind a token (rendered as twice as many hex chars).
const TOKEN_BYTES: usize = 20;

/// Opaque bearer token.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// Draw a fresh token from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let mut key = String::with_capacity(TOKEN_BYTES * 2);
        for b in bytes {
            // Writing into a String cannot fail.
            let _ = write!(key, "{:02x}", b);
        }
        Token(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Token {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// Never print a full key into logs.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "Token({}…)", prefix)
    }
}

/// What a token is bound to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub subject_id: SubjectId,
    /// Creation time (seconds since epoch).
    pub created_at: u64,
}

/// Token ↔ identity mapping.
///
/// Each token resolves to exactly one subject and each subject holds at most
/// one live token.
pub trait CredentialStore: Send + Sync {
    /// Resolve a presented token. Unknown tokens yield [`StoreError::NotFound`].
    fn lookup(&self, token: &str) -> Result<Identity, StoreError>;

    /// Create a new token for `subject`, replacing any token it already holds.
    fn issue(&self, subject: SubjectId) -> Result<Token, StoreError>;

    /// Delete a token. Unknown tokens yield [`StoreError::NotFound`].
    fn revoke(&self, token: &str) -> Result<(), StoreError>;

    /// Current token of `subject`, if any.
    fn token_for(&self, subject: SubjectId) -> Result<Option<Token>, StoreError>;

    /// Return the subject's existing token, or issue one.
    fn get_or_issue(&self, subject: SubjectId) -> Result<Token, StoreError>;

    /// Delete whatever token `subject` holds.
    fn revoke_subject(&self, subject: SubjectId) -> Result<(), StoreError>;

    /// Number of live tokens.
    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Invalidate the subject's token and hand out a new one.
    fn rotate(&self, subject: SubjectId) -> Result<Token, StoreError> {
        self.issue(subject)
    }
}

#[derive(Default)]
struct Tables {
    by_token: HashMap<Token, CredentialRecord>,
    by_subject: HashMap<SubjectId, Token>,
}

impl Tables {
    fn insert_fresh(&mut self, subject: SubjectId) -> Token {
        if let Some(old) = self.by_subject.remove(&subject) {
            self.by_token.remove(&old);
            metrics::record_credential_event("revoked");
        }

        // A collision on 160 random bits is not expected, but the mapping
        // must stay 1:1 regardless.
        let token = loop {
            let candidate = Token::generate();
            if !self.by_token.contains_key(&candidate) {
                break candidate;
            }
        };

        self.by_token.insert(
            token.clone(),
            CredentialRecord {
                subject_id: subject,
                created_at: unix_now(),
            },
        );
        self.by_subject.insert(subject, token.clone());
        metrics::record_credential_event("issued");
        token
    }
}

/// In-process credential store with optional JSON persistence.
///
/// Reads share a read lock; writes (issue / revoke) are rare and take the
/// write lock for both indexes at once.
pub struct InMemoryCredentialStore {
    tables: RwLock<Tables>,
    persistence_path: Option<PathBuf>,
}

impl InMemoryCredentialStore {
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            persistence_path,
        }
    }

    /// Load from file if it exists, otherwise start empty.
    pub fn load_from_file(path: &Path) -> Result<Self, StoreError> {
        let store = Self::new(Some(path.to_path_buf()));
        if let Some(records) = snapshot::read_json::<HashMap<Token, CredentialRecord>>(path)? {
            let mut tables = store.write()?;
            for (token, record) in records {
                // Last writer wins if a file was edited into a 1:N state.
                if let Some(old) = tables.by_subject.insert(record.subject_id, token.clone()) {
                    tables.by_token.remove(&old);
                }
                tables.by_token.insert(token, record);
            }
            tracing::info!(count = tables.by_token.len(), path = ?path, "Loaded credentials");
            drop(tables);
        }
        Ok(store)
    }

    /// Write all credentials to the persistence path, if one is configured.
    pub fn save_to_file(&self) -> Result<(), StoreError> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        let tables = self.read()?;
        snapshot::write_json(path, &tables.by_token)?;
        tracing::info!(count = tables.by_token.len(), path = ?path, "Saved credentials");
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables.read().map_err(|_| StoreError::poisoned("credential store"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables.write().map_err(|_| StoreError::poisoned("credential store"))
    }
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn lookup(&self, token: &str) -> Result<Identity, StoreError> {
        self.read()?
            .by_token
            .get(token)
            .map(|record| Identity::authenticated(record.subject_id))
            .ok_or(StoreError::NotFound)
    }

    fn issue(&self, subject: SubjectId) -> Result<Token, StoreError> {
        let token = self.write()?.insert_fresh(subject);
        tracing::info!(subject = %subject, "Issued credential");
        Ok(token)
    }

    fn revoke(&self, token: &str) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let record = tables.by_token.remove(token).ok_or(StoreError::NotFound)?;
        tables.by_subject.remove(&record.subject_id);
        metrics::record_credential_event("revoked");
        tracing::info!(subject = %record.subject_id, "Revoked credential");
        Ok(())
    }

    fn token_for(&self, subject: SubjectId) -> Result<Option<Token>, StoreError> {
        Ok(self.read()?.by_subject.get(&subject).cloned())
    }

    fn get_or_issue(&self, subject: SubjectId) -> Result<Token, StoreError> {
        let mut tables = self.write()?;
        if let Some(existing) = tables.by_subject.get(&subject) {
            return Ok(existing.clone());
        }
        Ok(tables.insert_fresh(subject))
    }

    fn revoke_subject(&self, subject: SubjectId) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let token = tables.by_subject.remove(&subject).ok_or(StoreError::NotFound)?;
        tables.by_token.remove(&token);
        metrics::record_credential_event("revoked");
        tracing::info!(subject = %subject, "Revoked credential");
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.by_token.len())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
