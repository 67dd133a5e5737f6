//! Shared EAP envelope handling for C5 (EAP-AKA') and, at the header level,
//! C6 (EAP-TLS). RFC 3748 header plus the RFC 4187/5448 AKA' attribute
//! encoding spec §6 requires ("AT_MAC is computed over the entire EAP
//! packet with the MAC field zeroed; AT_AUTS is 14 bytes; AT_KDF is a
//! 2-byte integer").
//!
//! NAS message encoding/decoding is out of this crate's scope (spec §1),
//! but the EAP envelope is not NAS transport — it is the method
//! sub-protocol itself, so this module owns it.

use crate::error::EapEnvelopeError;

pub const EAP_CODE_REQUEST: u8 = 1;
pub const EAP_CODE_RESPONSE: u8 = 2;
pub const EAP_CODE_SUCCESS: u8 = 3;
pub const EAP_CODE_FAILURE: u8 = 4;

pub const EAP_TYPE_AKA_PRIME: u8 = 50;
pub const EAP_TYPE_TLS: u8 = 13;

pub const SUBTYPE_AKA_CHALLENGE: u8 = 1;
pub const SUBTYPE_AKA_AUTHENTICATION_REJECT: u8 = 2;
pub const SUBTYPE_AKA_SYNCHRONIZATION_FAILURE: u8 = 4;
pub const SUBTYPE_AKA_CLIENT_ERROR: u8 = 14;

const AT_RAND: u8 = 1;
const AT_AUTN: u8 = 2;
const AT_RES: u8 = 3;
const AT_AUTS: u8 = 4;
const AT_MAC: u8 = 11;
const AT_CLIENT_ERROR_CODE: u8 = 22;
const AT_KDF_INPUT: u8 = 23;
const AT_KDF: u8 = 24;

/// One parsed EAP-AKA' attribute: `(type, raw value bytes, offset of the
/// value within the packet)`. The offset lets callers that need to mutate
/// an attribute's value in place (AT_MAC zeroing) do so without
/// re-serialising the whole packet.
struct Attr<'a> {
    typ: u8,
    value: &'a [u8],
    value_offset: usize,
}

fn iter_attrs(body: &[u8]) -> impl Iterator<Item = Result<Attr<'_>, EapEnvelopeError>> {
    let mut pos = 0usize;
    std::iter::from_fn(move || {
        if pos >= body.len() {
            return None;
        }
        if pos + 2 > body.len() {
            return Some(Err(EapEnvelopeError::InvalidAttribute("truncated attribute header")));
        }
        let typ = body[pos];
        let len_words = body[pos + 1] as usize;
        if len_words == 0 {
            return Some(Err(EapEnvelopeError::InvalidAttribute("zero-length attribute")));
        }
        let total = len_words * 4;
        if pos + total > body.len() {
            return Some(Err(EapEnvelopeError::InvalidAttribute("attribute overruns packet")));
        }
        let value = &body[pos + 2..pos + total];
        let attr = Attr { typ, value, value_offset: pos + 2 };
        pos += total;
        Some(Ok(attr))
    })
}

/// A parsed EAP-AKA' Challenge request, as sent by the network (spec §4.5).
pub struct AkaChallenge {
    pub identifier: u8,
    pub rand: [u8; 16],
    pub autn: [u8; 16],
    pub mac: [u8; 16],
    pub kdf: u16,
    pub kdf_input: Vec<u8>,
    /// Offset of the AT_MAC value within the original packet, so the
    /// caller can zero it for MAC verification without reparsing.
    mac_value_offset: usize,
    raw: Vec<u8>,
}

impl AkaChallenge {
    /// Parses an inbound EAP packet, enforcing spec §4.5's preconditions:
    /// type is EAP-AKA', subtype is AKA-Challenge, and `AT_RAND`/`AT_AUTN`/
    /// `AT_MAC` are each present and 16 bytes.
    pub fn parse(packet: &[u8]) -> Result<Self, EapEnvelopeError> {
        if packet.len() < 8 {
            return Err(EapEnvelopeError::NotAkaChallenge);
        }
        let identifier = packet[1];
        let eap_type = packet[4];
        let subtype = packet[5];
        if eap_type != EAP_TYPE_AKA_PRIME || subtype != SUBTYPE_AKA_CHALLENGE {
            return Err(EapEnvelopeError::NotAkaChallenge);
        }
        let body = &packet[8..];

        let mut rand = None;
        let mut autn = None;
        let mut mac = None;
        let mut mac_value_offset = None;
        let mut kdf = None;
        let mut kdf_input = None;

        for attr in iter_attrs(body) {
            let attr = attr?;
            match attr.typ {
                AT_RAND if attr.value.len() == 18 => {
                    let mut v = [0u8; 16];
                    v.copy_from_slice(&attr.value[2..18]);
                    rand = Some(v);
                }
                AT_AUTN if attr.value.len() == 18 => {
                    let mut v = [0u8; 16];
                    v.copy_from_slice(&attr.value[2..18]);
                    autn = Some(v);
                }
                AT_MAC if attr.value.len() == 18 => {
                    let mut v = [0u8; 16];
                    v.copy_from_slice(&attr.value[2..18]);
                    mac = Some(v);
                    mac_value_offset = Some(8 + attr.value_offset + 2);
                }
                AT_KDF if attr.value.len() == 2 => {
                    kdf = Some(u16::from_be_bytes([attr.value[0], attr.value[1]]));
                }
                AT_KDF_INPUT if attr.value.len() >= 2 => {
                    let actual_len = u16::from_be_bytes([attr.value[0], attr.value[1]]) as usize;
                    let available = &attr.value[2..];
                    if actual_len > available.len() {
                        return Err(EapEnvelopeError::InvalidAttribute("AT_KDF_INPUT"));
                    }
                    kdf_input = Some(available[..actual_len].to_vec());
                }
                _ => {}
            }
        }

        Ok(AkaChallenge {
            identifier,
            rand: rand.ok_or(EapEnvelopeError::InvalidAttribute("AT_RAND"))?,
            autn: autn.ok_or(EapEnvelopeError::InvalidAttribute("AT_AUTN"))?,
            mac: mac.ok_or(EapEnvelopeError::InvalidAttribute("AT_MAC"))?,
            kdf: kdf.ok_or(EapEnvelopeError::InvalidAttribute("AT_KDF"))?,
            kdf_input: kdf_input.ok_or(EapEnvelopeError::InvalidAttribute("AT_KDF_INPUT"))?,
            mac_value_offset: mac_value_offset.expect("set alongside mac"),
            raw: packet.to_vec(),
        })
    }

    /// The packet bytes with the `AT_MAC` value field zeroed, for MAC
    /// verification (spec §4.2, §6: "AT_MAC is computed over the entire
    /// EAP packet with the MAC field zeroed").
    pub fn bytes_with_zeroed_mac(&self) -> Vec<u8> {
        let mut out = self.raw.clone();
        out[self.mac_value_offset..self.mac_value_offset + 16].fill(0);
        out
    }
}

fn push_attr_with_reserved(
    out: &mut Vec<u8>,
    typ: u8,
    value: &[u8],
) {
    let len_words = (2 + 2 + value.len()) / 4;
    out.push(typ);
    out.push(len_words as u8);
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(value);
}

fn finish_packet(
    code: u8,
    identifier: u8,
    eap_type: u8,
    mut body: Vec<u8>,
) -> Vec<u8> {
    let mut out = vec![code, identifier, 0, 0, eap_type];
    out.append(&mut body);
    let len = out.len() as u16;
    out[2..4].copy_from_slice(&len.to_be_bytes());
    out
}

/// Builds the EAP-AKA' `AKA_CHALLENGE` response with `AT_RES`, `AT_KDF=1`
/// and a zeroed `AT_MAC` placeholder; the caller computes the real MAC over
/// the returned bytes (with the placeholder's zero value already in place)
/// and calls [`patch_mac`] to fill it in (spec §4.5).
pub fn build_challenge_response(
    identifier: u8,
    res: &[u8],
) -> Vec<u8> {
    let mut body = vec![SUBTYPE_AKA_CHALLENGE, 0, 0];
    let actual_len_bits = (res.len() as u16) * 8;
    let mut res_value = actual_len_bits.to_be_bytes().to_vec();
    res_value.extend_from_slice(res);
    while res_value.len() % 4 != 0 {
        res_value.push(0);
    }
    let len_words = (2 + res_value.len()) / 4;
    body.push(AT_RES);
    body.push(len_words as u8);
    body.extend_from_slice(&res_value);

    body.push(AT_KDF);
    body.push(1);
    body.extend_from_slice(&1u16.to_be_bytes());

    body.push(AT_MAC);
    body.push(5);
    body.extend_from_slice(&[0, 0]);
    body.extend_from_slice(&[0u8; 16]);

    finish_packet(EAP_CODE_RESPONSE, identifier, EAP_TYPE_AKA_PRIME, body)
}

/// Overwrites the trailing 16-byte `AT_MAC` value in a packet built by
/// [`build_challenge_response`] with the computed MAC.
pub fn patch_mac(
    packet: &mut [u8],
    mac: &[u8; 16],
) {
    let len = packet.len();
    packet[len - 16..].copy_from_slice(mac);
}

/// Builds the EAP-AKA' `AKA_AUTHENTICATION_REJECT` response (no attributes).
pub fn build_authentication_reject(identifier: u8) -> Vec<u8> {
    finish_packet(
        EAP_CODE_RESPONSE,
        identifier,
        EAP_TYPE_AKA_PRIME,
        vec![SUBTYPE_AKA_AUTHENTICATION_REJECT, 0, 0],
    )
}

/// Builds the EAP-AKA' `AKA_SYNCHRONIZATION_FAILURE` response with
/// `AT_AUTS`.
pub fn build_synchronization_failure(
    identifier: u8,
    auts: &[u8; 14],
) -> Vec<u8> {
    let mut body = vec![SUBTYPE_AKA_SYNCHRONIZATION_FAILURE, 0, 0];
    body.push(AT_AUTS);
    body.push(4);
    body.extend_from_slice(auts);
    finish_packet(EAP_CODE_RESPONSE, identifier, EAP_TYPE_AKA_PRIME, body)
}

/// Builds the EAP-AKA' `AKA_CLIENT_ERROR` response with
/// `AT_CLIENT_ERROR_CODE = 0`.
pub fn build_client_error(identifier: u8) -> Vec<u8> {
    let mut body = vec![SUBTYPE_AKA_CLIENT_ERROR, 0, 0];
    body.push(AT_CLIENT_ERROR_CODE);
    body.push(1);
    body.extend_from_slice(&0u16.to_be_bytes());
    finish_packet(EAP_CODE_RESPONSE, identifier, EAP_TYPE_AKA_PRIME, body)
}
