//! UE-side 5G NAS Mobility Management authentication core: 5G-AKA,
//! EAP-AKA' and (experimentally, behind the `eap-tls` feature) EAP-TLS.
//!
//! This crate is a single-threaded, synchronous library: every public
//! entry point runs to completion without suspending, consuming host
//! collaborators through the traits in [`controller`] ([`controller::NasHost`]),
//! [`autn`] ([`autn::SqnManager`]) and the USIM configuration in [`usim`].
//! NAS message encoding/decoding, lower-layer transport, timer
//! implementation and configuration loading beyond [`config`]'s YAML
//! convenience are the embedding NAS task's responsibility.

pub mod aka5g;
pub mod autn;
pub mod config;
pub mod controller;
pub mod eap;
pub mod eap_aka_prime;
#[cfg(feature = "eap-tls")]
pub mod eap_tls;
pub mod error;
pub mod kdf;
pub mod messages;
pub mod milenage;
pub mod octet;
pub mod plmn;
pub mod usim;

pub use controller::{Controller, NasHost};
pub use error::{AuthFailureCause, ConfigError, EapEnvelopeError};
pub use plmn::{Mnc, Plmn};
pub use usim::{NasSecurityContext, NgKsi, NgKsiIe, SecurityContextType, UsimAuthState, UsimConfig};
