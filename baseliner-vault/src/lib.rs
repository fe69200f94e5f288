//! # baseliner-vault
//!
//! HashiCorp Vault access: a reqwest client for the three calls the run needs
//! and the [`VaultCredentialProvider`] built on top of it.

pub mod client;
pub mod error;
pub mod provider;

pub use client::{LoginAuth, VaultApi, VaultHttp};
pub use error::VaultError;
pub use provider::VaultCredentialProvider;
