//! Data model (spec §3): USIM configuration, NAS security-context slots and
//! the volatile authentication state the procedures in C4–C7 read and
//! write.

use std::fmt;

use non_empty_string::NonEmptyString;
use serde::{Deserialize, de::Error as _};
use serde_valid::Validate;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::milenage;

fn de_hex<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let mut out = [0u8; N];
    faster_hex::hex_decode(s.as_bytes(), &mut out)
        .map_err(|e| D::Error::custom(format!("invalid hex: {e}")))?;
    Ok(out)
}

fn de_non_empty<'de, D>(deserializer: D) -> Result<NonEmptyString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    NonEmptyString::new(s).map_err(|_| D::Error::custom("must not be empty"))
}

/// 16 bytes of key material that must not outlive its owning `UsimConfig`
/// in plaintext form longer than necessary. `Debug` never prints the bytes.
#[derive(Clone, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes16(#[serde(deserialize_with = "de_hex")] pub [u8; 16]);

impl fmt::Debug for SecretBytes16 {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "SecretBytes16(16 bytes, redacted)")
    }
}

/// Discriminates whether `op_or_opc` carries the raw operator key `OP` (and
/// `OPc` must be derived via `CalculateOpC`) or the already-derived `OPc`
/// (spec §3, §4.1).
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum OpType {
    Op,
    Opc,
}

/// USIM credentials and, when the `eap-tls` feature is enabled, the EAP-TLS
/// client material (spec §6 Configuration).
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UsimConfig {
    pub k: SecretBytes16,
    pub op_type: OpType,
    pub op_or_opc: SecretBytes16,
    #[serde(deserialize_with = "de_hex")]
    pub amf: [u8; 2],
    #[serde(deserialize_with = "de_non_empty")]
    pub supi: NonEmptyString,
    #[cfg(feature = "eap-tls")]
    pub eap_tls: Option<crate::eap_tls::EapTlsConfig>,
}

impl UsimConfig {
    /// Resolves `OPc`, deriving it from `OP` via the Milenage engine when
    /// `op_type == OpType::Op` (spec §4.1).
    pub fn opc(&self) -> [u8; 16] {
        match self.op_type {
            OpType::Opc => self.op_or_opc.0,
            OpType::Op => milenage::calculate_opc(&self.op_or_opc.0, &self.k.0),
        }
    }
}

/// Type of security context: whether the keys were derived natively by this
/// UE/network pair or mapped in from another access type (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityContextType {
    Native,
    Mapped,
}

/// The three-bit key set identifier (spec §3/§6). `0b111` is the
/// "no key is available" sentinel defined by 3GPP and is never a valid
/// stored ngKSI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NgKsi(u8);

impl NgKsi {
    pub const NOT_AVAILABLE: u8 = 0b111;

    pub fn new(value: u8) -> Self {
        debug_assert!(value <= 0b111, "ngKSI is a 3-bit field");
        NgKsi(value & 0b111)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn is_available(&self) -> bool {
        self.0 != Self::NOT_AVAILABLE
    }
}

/// The full ngKSI IE as carried on the wire: `{tsc, ksi}` (spec §6). Distinct
/// from a `NasSecurityContext`'s own `(tsc, ng_ksi)` pair, which is staged
/// state rather than a message field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NgKsiIe {
    pub tsc: SecurityContextType,
    pub ksi: NgKsi,
}

/// The key material a successful authentication procedure stages (spec §3).
#[derive(Clone)]
pub struct SecurityKeys {
    pub k_ausf: [u8; 32],
    pub k_seaf: [u8; 32],
    pub k_amf: [u8; 32],
    pub abba: Vec<u8>,
}

impl fmt::Debug for SecurityKeys {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SecurityKeys")
            .field("k_ausf", &"[redacted 32B]")
            .field("k_seaf", &"[redacted 32B]")
            .field("k_amf", &"[redacted 32B]")
            .field("abba", &faster_hex::hex_string(&self.abba))
            .finish()
    }
}

/// One NAS security-context slot (spec §3: `currentNsCtx`/`nonCurrentNsCtx`).
#[derive(Debug, Clone)]
pub struct NasSecurityContext {
    pub tsc: SecurityContextType,
    pub ng_ksi: NgKsi,
    pub keys: SecurityKeys,
}

/// The USIM/ME authentication state this core owns (spec §3: "Volatile
/// authentication state" + the two context slots).
#[derive(Default)]
pub struct UsimAuthState {
    /// Last accepted challenge `RAND`, cleared on every failure path.
    pub rand: Option<[u8; 16]>,
    /// Last computed 5G-AKA `RES*`, cleared alongside `rand`.
    pub res_star: Option<[u8; 16]>,
    /// Consecutive network authentication failures, range `0..=3`.
    pub nw_consecutive_auth_failure: u8,
    pub current_ns_ctx: Option<NasSecurityContext>,
    pub non_current_ns_ctx: Option<NasSecurityContext>,
    /// Cleared, along with the rest of USIM state, by Authentication-Reject
    /// (spec §4.7); once invalidated the USIM stays invalid until
    /// power-off/UICC removal, which is a host-level event this core does
    /// not model.
    pub valid: bool,
    /// Per-USIM EAP-TLS session (spec §3), held across successive
    /// `AuthenticationRequest` messages; absent until the first EAP-TLS
    /// fragment arrives.
    #[cfg(feature = "eap-tls")]
    pub eap_tls_session: Option<statig::prelude::StateMachine<crate::eap_tls::EapTlsSession>>,
}

impl fmt::Debug for UsimAuthState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("UsimAuthState")
            .field("rand", &self.rand.map(|_| "[16B]"))
            .field("res_star", &self.res_star.map(|_| "[16B]"))
            .field("nw_consecutive_auth_failure", &self.nw_consecutive_auth_failure)
            .field("current_ns_ctx", &self.current_ns_ctx)
            .field("non_current_ns_ctx", &self.non_current_ns_ctx)
            .field("valid", &self.valid)
            .finish_non_exhaustive()
    }
}

impl UsimAuthState {
    pub fn new() -> Self {
        Self { valid: true, ..Default::default() }
    }

    /// Invariant 1 (spec §3): clear both `rand` and `resStar` together.
    pub fn clear_challenge(&mut self) {
        self.rand = None;
        self.res_star = None;
    }
}
