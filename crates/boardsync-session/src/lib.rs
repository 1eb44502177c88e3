//! Session management for boardsync.
//!
//! This crate decides who is on the other end of a connection:
//!
//! 1. **Tokens**: issuing, verifying, rotating and revoking JWT pairs
//!    ([`TokenAuthority`]), backed by a key-value store ([`SessionStore`])
//! 2. **Resolution**: mapping presented cookies to an identity, creating an
//!    anonymous one when there is no usable session ([`SessionResolver`])
//! 3. **Accounts**: signup, login, refresh, signout and logout-all on top
//!    of both ([`Accounts`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)   ← resolves every new connection, exposes account ops
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol Layer (below)  ← provides IdentityId
//! ```
//!
//! # Feature Flags
//!
//! - `redis` (default): [`RedisStore`], a [`SessionStore`] on Redis

mod accounts;
mod credentials;
mod error;
mod identity;
mod password;
#[cfg(feature = "redis")]
mod redis_store;
mod resolver;
mod store;
mod token;

pub use accounts::{Accounts, LoginForm};
pub use credentials::{
    ACCESS_COOKIE, REFRESH_COOKIE, SessionCredentials, USER_COOKIE,
};
pub use error::{AuthError, StoreError};
pub use identity::{
    Identity, IdentityProvider, IdentityStatus, MemoryIdentities, NewAccount,
    Registration,
};
pub use password::{Passwords, random_secret};
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use resolver::{ResolvedSession, SessionResolver};
pub use store::{MemoryStore, SessionStore};
pub use token::{
    AccessStatus, Claims, TokenAuthority, TokenConfig, TokenKind, TokenPair,
};

/// Re-exported so callers can tune hashing cost without a direct
/// dependency.
pub use argon2::Params as PasswordParams;
