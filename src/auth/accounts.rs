//! Accounts behind the credentials: registration and password login.
//!
//! Passwords are stored only as Argon2id PHC strings. Hashing and
//! verification are slow, so callers on the async runtime run
//! them through `spawn_blocking`; the table lock is never held while hashing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::identity::SubjectId;
use crate::auth::snapshot;
use crate::error::StoreError;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("email address is not valid")]
    InvalidEmail,

    #[error("email already in use")]
    EmailTaken,

    #[error("username already in use")]
    UsernameTaken,

    #[error("passwords don't match")]
    PasswordMismatch,

    #[error("unable to log in with provided credentials")]
    InvalidCredentials,

    #[error("user account is disabled")]
    Inactive,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A sign-up request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub repeated_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub subject_id: SubjectId,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: u64,
}

pub trait AccountStore: Send + Sync {
    /// Validate a registration and create the account.
    fn register(&self, registration: &Registration) -> Result<Account, AccountError>;

    /// Check a username/password pair. Inactive accounts are reported only
    /// after the password matched.
    fn verify(&self, username: &str, password: &str) -> Result<Account, AccountError>;

    fn get(&self, subject: SubjectId) -> Result<Option<Account>, StoreError>;

    /// Enable or disable login. Unknown subjects yield `NotFound`.
    fn set_active(&self, subject: SubjectId, active: bool) -> Result<(), StoreError>;

    fn len(&self) -> Result<usize, StoreError>;
}

#[derive(Default)]
struct AccountTables {
    by_subject: HashMap<SubjectId, Account>,
    by_username: HashMap<String, SubjectId>,
    by_email: HashMap<String, SubjectId>,
    last_id: u64,
}

impl AccountTables {
    fn insert(&mut self, account: Account) {
        self.last_id = self.last_id.max(account.subject_id.0);
        self.by_username
            .insert(account.username.clone(), account.subject_id);
        self.by_email
            .insert(account.email.to_lowercase(), account.subject_id);
        self.by_subject.insert(account.subject_id, account);
    }
}

/// In-process account table with optional JSON persistence.
pub struct InMemoryAccountStore {
    tables: RwLock<AccountTables>,
    min_password_len: usize,
    persistence_path: Option<PathBuf>,
    hasher: Argon2<'static>,
}

impl InMemoryAccountStore {
    pub fn new(min_password_len: usize, persistence_path: Option<PathBuf>) -> Self {
        Self {
            tables: RwLock::new(AccountTables::default()),
            min_password_len,
            persistence_path,
            hasher: Argon2::default(),
        }
    }

    pub fn load_from_file(path: &Path, min_password_len: usize) -> Result<Self, StoreError> {
        let store = Self::new(min_password_len, Some(path.to_path_buf()));
        if let Some(accounts) = snapshot::read_json::<Vec<Account>>(path)? {
            let mut tables = store.write()?;
            for account in accounts {
                tables.insert(account);
            }
            tracing::info!(count = tables.by_subject.len(), path = ?path, "Loaded accounts");
            drop(tables);
        }
        Ok(store)
    }

    pub fn save_to_file(&self) -> Result<(), StoreError> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        let tables = self.read()?;
        let mut accounts: Vec<&Account> = tables.by_subject.values().collect();
        accounts.sort_by_key(|a| a.subject_id);
        snapshot::write_json(path, &accounts)?;
        tracing::info!(count = accounts.len(), path = ?path, "Saved accounts");
        Ok(())
    }

    fn validate(&self, registration: &Registration) -> Result<(), AccountError> {
        if registration.username.trim().is_empty() {
            return Err(AccountError::MissingField("username"));
        }
        if registration.email.trim().is_empty() {
            return Err(AccountError::MissingField("email"));
        }
        if registration.password.is_empty() {
            return Err(AccountError::MissingField("password"));
        }
        if registration.repeated_password.is_empty() {
            return Err(AccountError::MissingField("repeated_password"));
        }
        if registration.password.chars().count() < self.min_password_len {
            return Err(AccountError::PasswordTooShort {
                min: self.min_password_len,
            });
        }
        match registration.email.trim().split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
            _ => Err(AccountError::InvalidEmail),
        }
    }

    fn hash(&self, password: &str) -> Result<String, AccountError> {
        let salt = SaltString::generate(&mut OsRng);
        self.hasher
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AccountError::Hashing(e.to_string()))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, AccountTables>, StoreError> {
        self.tables.read().map_err(|_| StoreError::poisoned("account store"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, AccountTables>, StoreError> {
        self.tables.write().map_err(|_| StoreError::poisoned("account store"))
    }
}

impl AccountStore for InMemoryAccountStore {
    fn register(&self, registration: &Registration) -> Result<Account, AccountError> {
        self.validate(registration)?;
        let username = registration.username.trim();
        let email = registration.email.trim();

        // Cheap checks first so taken names do not cost a hash.
        {
            let tables = self.read()?;
            if tables.by_email.contains_key(&email.to_lowercase()) {
                return Err(AccountError::EmailTaken);
            }
            if tables.by_username.contains_key(username) {
                return Err(AccountError::UsernameTaken);
            }
        }
        if registration.password != registration.repeated_password {
            return Err(AccountError::PasswordMismatch);
        }

        let password_hash = self.hash(&registration.password)?;

        let mut tables = self.write()?;
        // Re-check under the write lock; another registration may have won.
        if tables.by_email.contains_key(&email.to_lowercase()) {
            return Err(AccountError::EmailTaken);
        }
        if tables.by_username.contains_key(username) {
            return Err(AccountError::UsernameTaken);
        }

        let account = Account {
            subject_id: SubjectId(tables.last_id + 1),
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            is_active: true,
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        };
        tables.insert(account.clone());
        tracing::info!(subject = %account.subject_id, "Registered account");
        Ok(account)
    }

    fn verify(&self, username: &str, password: &str) -> Result<Account, AccountError> {
        if username.is_empty() || password.is_empty() {
            return Err(AccountError::InvalidCredentials);
        }

        let tables = self.read()?;
        let found = tables
            .by_username
            .get(username)
            .and_then(|id| tables.by_subject.get(id))
            .cloned();
        drop(tables);
        let account = found.ok_or(AccountError::InvalidCredentials)?;

        let parsed = PasswordHash::new(&account.password_hash)
            .map_err(|e| AccountError::Hashing(e.to_string()))?;
        self.hasher
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AccountError::InvalidCredentials)?;

        if !account.is_active {
            return Err(AccountError::Inactive);
        }
        Ok(account)
    }

    fn get(&self, subject: SubjectId) -> Result<Option<Account>, StoreError> {
        Ok(self.read()?.by_subject.get(&subject).cloned())
    }

    fn set_active(&self, subject: SubjectId, active: bool) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let account = tables.by_subject.get_mut(&subject).ok_or(StoreError::NotFound)?;
        account.is_active = active;
        tracing::info!(subject = %subject, active, "Account activity changed");
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.by_subject.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(username: &str, email: &str, password: &str) -> Registration {
        Registration {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            repeated_password: password.into(),
        }
    }

    #[test]
    fn test_register_and_verify() {
        let store = InMemoryAccountStore::new(8, None);
        let account = store
            .register(&registration("ada", "ada@example.com", "correct horse"))
            .unwrap();
        assert_eq!(account.subject_id, SubjectId(1));
        assert!(account.password_hash.starts_with("$argon2"));
        assert!(!account.password_hash.contains("correct horse"));

        let verified = store.verify("ada", "correct horse").unwrap();
        assert_eq!(verified.subject_id, account.subject_id);
        assert!(matches!(
            store.verify("ada", "wrong horse"),
            Err(AccountError::InvalidCredentials)
        ));
        assert!(matches!(
            store.verify("bob", "correct horse"),
            Err(AccountError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_registration_rules() {
        let store = InMemoryAccountStore::new(8, None);
        store
            .register(&registration("ada", "ada@example.com", "password1"))
            .unwrap();

        let cases = [
            (registration("", "x@example.com", "password1"), "username is required"),
            (registration("bob", "bob@example.com", "short"), "password must be at least 8 characters"),
            (registration("bob", "not-an-email", "password1"), "email address is not valid"),
            (registration("bob", "ADA@example.com", "password1"), "email already in use"),
            (registration("ada", "other@example.com", "password1"), "username already in use"),
        ];
        for (reg, expected) in cases {
            assert_eq!(store.register(&reg).unwrap_err().to_string(), expected);
        }

        let mut mismatch = registration("bob", "bob@example.com", "password1");
        mismatch.repeated_password = "password2".into();
        assert!(matches!(
            store.register(&mismatch),
            Err(AccountError::PasswordMismatch)
        ));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_inactive_account() {
        let store = InMemoryAccountStore::new(8, None);
        let account = store
            .register(&registration("ada", "ada@example.com", "password1"))
            .unwrap();
        store.set_active(account.subject_id, false).unwrap();

        assert!(matches!(
            store.verify("ada", "password1"),
            Err(AccountError::Inactive)
        ));
        // A wrong password never reveals the account state.
        assert!(matches!(
            store.verify("ada", "password2"),
            Err(AccountError::InvalidCredentials)
        ));
        assert!(matches!(
            store.set_active(SubjectId(99), true),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_persistence_keeps_ids_unique() {
        let path = std::env::temp_dir().join(format!("accounts-{}.json", uuid::Uuid::new_v4()));

        let store = InMemoryAccountStore::new(8, Some(path.clone()));
        store
            .register(&registration("ada", "ada@example.com", "password1"))
            .unwrap();
        store.save_to_file().unwrap();

        let loaded = InMemoryAccountStore::load_from_file(&path, 8).unwrap();
        assert!(loaded.verify("ada", "password1").is_ok());
        let next = loaded
            .register(&registration("bob", "bob@example.com", "password2"))
            .unwrap();
        assert_eq!(next.subject_id, SubjectId(2));

        std::fs::remove_file(&path).unwrap_or_default();
    }
}
