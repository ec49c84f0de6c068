//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Authorization: Token <key>
//!     → authenticator.rs (parse scheme, look up key)
//!     → store.rs (token → subject index)
//!     → Identity (Anonymous by origin, or Authenticated)
//! ```
//!
//! # Design Decisions
//! - Tokens are opaque CSPRNG output, never derived from the subject
//! - Lookups are hash-indexed, never a scan over stored keys
//! - A subject holds one live token; issuing again rotates it
//! - Login and registration (accounts.rs) hand out tokens through the same
//!   store, so the gate never sees passwords

pub mod accounts;
pub mod authenticator;
pub mod identity;
pub mod snapshot;
pub mod store;

pub use accounts::{Account, AccountError, AccountStore, InMemoryAccountStore, Registration};
pub use authenticator::Authenticator;
pub use identity::{Identity, PolicyClass, SubjectId};
pub use store::{CredentialStore, InMemoryCredentialStore, Token};
