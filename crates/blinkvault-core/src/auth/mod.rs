//! Authentication module for the session lifecycle and token persistence.
//!
//! This module provides:
//! - `SessionManager`: current user and bearer token, bootstrap/login/logout
//! - `TokenStore`: persisted single-slot token storage (file, keyring, memory)
//! - `guard`: view gating derived from a session snapshot

pub mod guard;
pub mod session;
pub mod store;

pub use guard::{admin_view, private_view, Access};
pub use session::{SessionEvent, SessionManager, SessionSnapshot, SignOutReason, IDENTITY_PATH};
pub use store::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, StoreError, TokenStore, TOKEN_SLOT};
