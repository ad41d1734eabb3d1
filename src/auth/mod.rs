//! Public-key authentication subsystem.
//!
//! Decodes OpenSSH one-line public keys, compares them in constant time,
//! and decides login attempts against the single configured account.

pub mod authenticator;
pub mod codec;
pub mod compare;

#[cfg(test)]
pub(crate) mod testutil;

pub use authenticator::{PublicKeyAuthenticator, SessionContext};
