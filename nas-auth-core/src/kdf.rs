//! C2 — key-derivation functions: 3GPP TS 33.501/33.402 Annex A
//! constructions over HMAC-SHA-256, plus the EAP-AKA' `MK` expansion
//! (RFC 5448 §3.2's `PRF'`).

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::octet::{self, OctetString};

type HmacSha256 = Hmac<Sha256>;

/// 3GPP TS 33.501 Annex A generic KDF: `HMAC-SHA-256(Key, S)` where
/// `S = FC || P0 || len(P0) || P1 || len(P1) || ...`, lengths as big-endian
/// 16-bit counts.
fn kdf(
    key: &[u8],
    fc: u8,
    params: &[&[u8]],
) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(&[fc]);
    for p in params {
        mac.update(p);
        mac.update(&(p.len() as u16).to_be_bytes());
    }
    mac.finalize().into_bytes().into()
}

/// `CalculateKAusfFor5gAka(CK, IK, SNN, SQN⊕AK) -> 32B` (Annex A.2, FC=0x6A).
pub fn calculate_k_ausf_5g_aka(
    ck: &[u8; 16],
    ik: &[u8; 16],
    snn: &str,
    sqn_xor_ak: &[u8; 6],
) -> [u8; 32] {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(ck);
    key.extend_from_slice(ik);
    kdf(&key, 0x6A, &[snn.as_bytes(), sqn_xor_ak])
}

/// `CalculateCkPrimeIkPrime(CK, IK, SNN, SQN⊕AK) -> (CK', IK')` (Annex A.3,
/// FC=0x20). The 256-bit KDF output splits into the left 16 bytes (CK') and
/// the right 16 bytes (IK').
pub fn calculate_ck_prime_ik_prime(
    ck: &[u8; 16],
    ik: &[u8; 16],
    snn: &str,
    sqn_xor_ak: &[u8; 6],
) -> ([u8; 16], [u8; 16]) {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(ck);
    key.extend_from_slice(ik);
    let out = kdf(&key, 0x20, &[snn.as_bytes(), sqn_xor_ak]);
    let mut ck_prime = [0u8; 16];
    let mut ik_prime = [0u8; 16];
    ck_prime.copy_from_slice(&out[0..16]);
    ik_prime.copy_from_slice(&out[16..32]);
    (ck_prime, ik_prime)
}

/// `CalculateResStar(CK‖IK, SNN, RAND, RES) -> 16B` (Annex A.4, FC=0x6B).
/// RES* is the rightmost 128 bits of the KDF output.
pub fn calculate_res_star(
    ck: &[u8; 16],
    ik: &[u8; 16],
    snn: &str,
    rand: &[u8; 16],
    res: &[u8; 8],
) -> [u8; 16] {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(ck);
    key.extend_from_slice(ik);
    let out = kdf(&key, 0x6B, &[snn.as_bytes(), rand, res]);
    let mut res_star = [0u8; 16];
    res_star.copy_from_slice(&out[16..32]);
    res_star
}

/// `CalculateAuts(SQN_MS, AK_R, MAC_S) -> 14B = (SQN_MS ⊕ AK_R) ‖ MAC_S`
/// (spec §4.2).
pub fn calculate_auts(
    sqn_ms: &[u8; 6],
    ak_r: &[u8; 6],
    mac_s: &[u8; 8],
) -> [u8; 14] {
    let sqn_xor_akr = octet::xor_arrays(sqn_ms, ak_r);
    let joined = OctetString::from(sqn_xor_akr).concat(&OctetString::from(*mac_s));
    let mut auts = [0u8; 14];
    auts.copy_from_slice(joined.as_bytes());
    auts
}

/// `DeriveKeysSeafAmf` step 1: `KSEAF` from `KAUSF` and the serving network
/// name (Annex A.6, FC=0x6C).
pub fn calculate_k_seaf(
    k_ausf: &[u8; 32],
    snn: &str,
) -> [u8; 32] {
    kdf(k_ausf, 0x6C, &[snn.as_bytes()])
}

/// `DeriveKeysSeafAmf` step 2: `KAMF` from `KSEAF`, the SUPI and the ABBA
/// parameter (Annex A.7, FC=0x6D).
pub fn calculate_k_amf(
    k_seaf: &[u8; 32],
    supi: &str,
    abba: &[u8],
) -> [u8; 32] {
    kdf(k_seaf, 0x6D, &[supi.as_bytes(), abba])
}

/// RFC 5448 §3.2 `PRF'`: an HMAC-SHA-256-based keyed expansion used to
/// derive `MK` and, from `MK`, the subordinate EAP-AKA' keys.
///
/// `T0` is empty; `T_n = HMAC-SHA-256(key, T_{n-1} || seed || n)`. The
/// concatenation `T1 || T2 || ...` is extended until at least `out_len`
/// bytes have been produced, never truncated below that.
fn prf_prime(
    key: &[u8],
    seed: &[u8],
    out_len: usize,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(out_len + 32);
    let mut prev: Vec<u8> = Vec::new();
    let mut counter: u8 = 1;
    while out.len() < out_len {
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
        mac.update(&prev);
        mac.update(seed);
        mac.update(&[counter]);
        let t = mac.finalize().into_bytes();
        out.extend_from_slice(&t);
        prev = t.to_vec();
        counter = counter.wrapping_add(1);
    }
    out
}

const EAP_AKA_PRIME_LABEL: &[u8] = b"EAP-AKA2";

/// `CalculateMk(CK', IK', SUPI) -> ≥208B` (RFC 5448 §3.2: `MK =
/// PRF'(IK'|CK', "EAP-AKA2" || Identity)`, expanded to cover every
/// subordinate key this core slices out of it).
pub fn calculate_mk(
    ck_prime: &[u8; 16],
    ik_prime: &[u8; 16],
    supi: &str,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(ik_prime);
    key.extend_from_slice(ck_prime);
    let mut seed = Vec::with_capacity(EAP_AKA_PRIME_LABEL.len() + supi.len());
    seed.extend_from_slice(EAP_AKA_PRIME_LABEL);
    seed.extend_from_slice(supi.as_bytes());
    prf_prime(&key, &seed, 208)
}

/// `KAUT = MK[16..48]`.
pub fn k_aut(mk: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&mk[16..48]);
    out
}

/// `CalculateKAusfForEapAkaPrime(MK) -> KAUSF_EAP = MK[144..176)`.
pub fn calculate_k_ausf_eap_aka_prime(mk: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&mk[144..176]);
    out
}

/// `CalculateMacForEapAkaPrime(KAUT, eap)`: HMAC-SHA-256-128 over the
/// entire EAP packet with its `AT_MAC` value field zeroed during
/// computation (spec §4.2, §6).
pub fn calculate_mac_eap_aka_prime(
    k_aut: &[u8; 32],
    eap_with_zeroed_mac: &[u8],
) -> [u8; 16] {
    let mut mac = HmacSha256::new_from_slice(k_aut).expect("HMAC accepts any key length");
    mac.update(eap_with_zeroed_mac);
    let full = mac.finalize().into_bytes();
    let mut truncated = [0u8; 16];
    truncated.copy_from_slice(&full[0..16]);
    truncated
}
