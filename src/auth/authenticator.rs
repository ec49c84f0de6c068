//! Resolution of presented credentials into identities.

use std::net::IpAddr;
use std::sync::Arc;

use crate::auth::identity::Identity;
use crate::auth::store::CredentialStore;
use crate::config::AuthConfig;
use crate::error::{GateRejection, StoreError};

/// Resolves the credential header of a request. Never mutates the store.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    schemes: Vec<String>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn CredentialStore>, config: &AuthConfig) -> Self {
        Self {
            store,
            schemes: config.schemes.clone(),
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// No credential → anonymous; unknown or malformed credential →
    /// `Unauthorized`; backing store failure → `Unavailable`.
    pub fn authenticate(
        &self,
        credential: Option<&str>,
        origin: IpAddr,
    ) -> Result<Identity, GateRejection> {
        let Some(raw) = credential else {
            return Ok(Identity::anonymous(origin));
        };

        let token = self.parse(raw).ok_or(GateRejection::Unauthorized)?;

        match self.store.lookup(token) {
            Ok(identity) => Ok(identity),
            Err(StoreError::NotFound) => Err(GateRejection::Unauthorized),
            Err(e) => Err(GateRejection::Unavailable(e)),
        }
    }

    /// Split `<scheme> <token>`, accepting only configured schemes.
    fn parse<'a>(&self, raw: &'a str) -> Option<&'a str> {
        let (scheme, token) = raw.trim().split_once(' ')?;
        let token = token.trim();
        if token.is_empty() || token.contains(char::is_whitespace) {
            return None;
        }
        self.schemes
            .iter()
            .any(|s| s.eq_ignore_ascii_case(scheme))
            .then_some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::identity::SubjectId;
    use crate::auth::store::InMemoryCredentialStore;
    use std::net::Ipv4Addr;

    const ORIGIN: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));

    fn setup() -> (Authenticator, Arc<InMemoryCredentialStore>) {
        let store = Arc::new(InMemoryCredentialStore::default());
        let auth = Authenticator::new(store.clone(), &AuthConfig::default());
        (auth, store)
    }

    #[test]
    fn test_missing_credential_is_anonymous() {
        let (auth, _) = setup();
        assert_eq!(
            auth.authenticate(None, ORIGIN).unwrap(),
            Identity::anonymous(ORIGIN)
        );
    }

    #[test]
    fn test_valid_credential() {
        let (auth, store) = setup();
        let token = store.issue(SubjectId(5)).unwrap();

        for scheme in ["Token", "Bearer", "token"] {
            let header = format!("{} {}", scheme, token.as_str());
            assert_eq!(
                auth.authenticate(Some(&header), ORIGIN).unwrap(),
                Identity::authenticated(SubjectId(5))
            );
        }
    }

    #[test]
    fn test_unknown_or_malformed_credential() {
        let (auth, store) = setup();
        let token = store.issue(SubjectId(5)).unwrap();

        let bad = [
            "Token deadbeef".to_string(),
            "Token".to_string(),
            "Token ".to_string(),
            format!("Basic {}", token.as_str()),
            token.as_str().to_string(),
        ];
        for header in bad {
            assert!(matches!(
                auth.authenticate(Some(&header), ORIGIN),
                Err(GateRejection::Unauthorized)
            ));
        }
    }

    #[test]
    fn test_revoked_credential() {
        let (auth, store) = setup();
        let token = store.issue(SubjectId(8)).unwrap();
        store.revoke(token.as_str()).unwrap();

        let header = format!("Token {}", token.as_str());
        assert!(matches!(
            auth.authenticate(Some(&header), ORIGIN),
            Err(GateRejection::Unauthorized)
        ));
    }
}
