//! Caller identities and policy classes.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Stable identifier of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub u64);

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SubjectId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(SubjectId)
    }
}

/// The resolved caller of a request.
///
/// Anonymous callers have no stable key, so they are grouped by the network
/// origin the request arrived from. Every client behind one origin shares
/// that origin's quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    Anonymous { origin: IpAddr },
    Authenticated { subject_id: SubjectId },
}

impl Identity {
    pub fn anonymous(origin: IpAddr) -> Self {
        Identity::Anonymous { origin }
    }

    pub fn authenticated(subject_id: SubjectId) -> Self {
        Identity::Authenticated { subject_id }
    }

    pub fn policy_class(&self) -> PolicyClass {
        match self {
            Identity::Anonymous { .. } => PolicyClass::Anonymous,
            Identity::Authenticated { .. } => PolicyClass::Authenticated,
        }
    }

    pub fn subject_id(&self) -> Option<SubjectId> {
        match self {
            Identity::Authenticated { subject_id } => Some(*subject_id),
            Identity::Anonymous { .. } => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::Authenticated { .. })
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Anonymous { origin } => write!(f, "anon:{}", origin),
            Identity::Authenticated { subject_id } => write!(f, "user:{}", subject_id),
        }
    }
}

/// Quota class an identity is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyClass {
    Anonymous,
    Authenticated,
}

impl PolicyClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyClass::Anonymous => "anonymous",
            PolicyClass::Authenticated => "authenticated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_policy_class() {
        let anon = Identity::anonymous(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(anon.policy_class(), PolicyClass::Anonymous);
        assert_eq!(anon.subject_id(), None);

        let user = Identity::authenticated(SubjectId(7));
        assert_eq!(user.policy_class(), PolicyClass::Authenticated);
        assert_eq!(user.subject_id(), Some(SubjectId(7)));
        assert_eq!(user.to_string(), "user:7");
    }

    #[test]
    fn test_identity_json_shape() {
        let user = Identity::authenticated(SubjectId(3));
        let value = serde_json::to_value(user).unwrap();
        assert_eq!(value["kind"], "authenticated");
        assert_eq!(value["subject_id"], 3);
    }
}
