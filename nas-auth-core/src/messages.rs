//! NAS message contracts (spec §6). Decoding/encoding the surrounding NAS
//! message envelope (security header, message-type octet, IEI framing) is
//! out of this crate's scope (spec §1); these are the already-decoded IE
//! payloads the controller (C7) reads and writes.

use crate::error::AuthFailureCause;
use crate::usim::NgKsiIe;

/// `AUTHENTICATION REQUEST` (spec §4.1/§4.5 precondition checks read these
/// fields).
#[derive(Debug, Clone)]
pub struct AuthenticationRequest {
    pub ng_ksi: NgKsiIe,
    pub abba: Vec<u8>,
    pub rand: Option<[u8; 16]>,
    pub autn: Option<[u8; 16]>,
    /// Present for EAP-AKA'/EAP-TLS; the raw EAP packet.
    pub eap_message: Option<Vec<u8>>,
}

/// `AUTHENTICATION RESULT` (EAP method completion carried over NAS).
#[derive(Debug, Clone)]
pub struct AuthenticationResult {
    pub abba: Option<Vec<u8>>,
    pub eap_message: Vec<u8>,
}

/// `AUTHENTICATION REJECT`.
#[derive(Debug, Clone)]
pub struct AuthenticationReject {
    pub eap_message: Option<Vec<u8>>,
}

/// `AUTHENTICATION RESPONSE`, carrying either the 5G-AKA `RES*` or an EAP
/// packet, never both (spec §4.1/§4.5).
#[derive(Debug, Clone)]
pub enum AuthenticationResponse {
    ResStar([u8; 16]),
    Eap(Vec<u8>),
}

/// `AUTHENTICATION FAILURE` (spec §4.3/§4.4: MAC failure or synchronisation
/// failure, the latter carrying `AUTS`).
#[derive(Debug, Clone)]
pub struct AuthenticationFailure {
    pub cause: AuthFailureCause,
    pub auts: Option<[u8; 14]>,
}

/// `5GMM STATUS`, sent for protocol errors this core detects itself
/// (unexpected ngKSI, malformed request) rather than ones the network
/// reports back (spec §4.1 preconditions).
#[derive(Debug, Clone)]
pub struct MmStatus {
    pub cause: AuthFailureCause,
}
