//! Error types for the authentication core: one small enum per concern
//! rather than a single crate-wide catch-all.

use thiserror::Error;

/// The NAS `AuthenticationFailure` / EAP-AKA' reject causes this core can
/// emit (spec §6, §7). Kept as a closed, `Display`-rendering enum rather
/// than a bare wire integer at the API boundary.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureCause {
    #[error("semantically incorrect message")]
    SemanticallyIncorrectMessage,
    #[error("unspecified protocol error")]
    UnspecifiedProtocolError,
    #[error("ngKSI already in use")]
    NgksiAlreadyInUse,
    #[error("MAC failure")]
    MacFailure,
    #[error("synch failure")]
    SynchFailure,
    #[error("non-5G authentication unacceptable")]
    Non5gAuthenticationUnacceptable,
}

/// Malformed EAP envelope conditions (spec §4.5, §7 kind 1): these never
/// advance authentication state and are answered with `MmStatus`, not an
/// `AuthenticationFailure`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EapEnvelopeError {
    #[error("EAP payload is not an EAP-AKA' AKA-Challenge")]
    NotAkaChallenge,
    #[error("required EAP-AKA' attribute missing or wrong length: {0}")]
    InvalidAttribute(&'static str),
}

/// USIM/EAP-TLS configuration validation failure (spec §6 configuration).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("malformed configuration document")]
    Malformed(#[from] serde_yaml::Error),
    #[error("invalid USIM configuration")]
    Invalid(#[from] serde_valid::validation::Errors),
}

/// EAP-TLS session setup/teardown failures (spec §4.6), all of which
/// collapse to `SEMANTICALLY_INCORRECT_MESSAGE` at the NAS boundary.
#[cfg(feature = "eap-tls")]
#[derive(Error, Debug)]
pub enum EapTlsError {
    #[error("TLS context setup failed: {0}")]
    Context(#[from] openssl::error::ErrorStack),
    #[error("failed to read {path}: {source}")]
    CertFile {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("private key could not be loaded with or without the configured password")]
    PrivateKey,
}
