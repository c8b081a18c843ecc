//! Authentication module: session state, credential storage, token inspection.
//!
//! This module provides:
//! - `SessionState`: the single source of truth for "is the user logged in"
//! - `CredentialStore`: the persisted token + user-info record (crate-private;
//!   reachable only through `SessionState`)
//! - `token`: payload decoding and fail-closed expiry checks
//! - `storage`: file, keychain and in-memory key/value backends

pub(crate) mod credentials;
pub mod session;
pub mod storage;
pub mod token;

pub use session::{AuthSnapshot, AuthState, SessionOptions, SessionState, WeakSessionState};
pub use storage::{
    open_backend, FileStore, KeyValueStore, KeyringStore, MemoryStore, StorageError, StorageKind,
};
pub use token::{decode_payload, is_expired, TokenPayload};
