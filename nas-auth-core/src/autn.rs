//! C3 — AUTN validator (spec §4.3).

use subtle::ConstantTimeEq;

use crate::milenage;
use crate::octet::{self, OctetString};

/// Outcome of validating a network-supplied `AUTN` against USIM state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutnOutcome {
    Ok,
    MacFailure,
    SynchronisationFailure,
    AmfSeparationBitFailure,
}

/// Anything that can decide whether a recovered `SQN` is fresh, per the
/// USIM's TS 33.102 Annex C policy (spec §3: "SQN manager").
///
/// `check_sqn` both answers the freshness question *and* is where a
/// conformant implementation advances/brackets the stored SQN per Annex C;
/// this core treats the policy as an opaque collaborator and only consumes
/// the boolean verdict.
pub trait SqnManager {
    fn get_sqn(&self) -> [u8; 6];
    fn check_sqn(
        &mut self,
        received_sqn: [u8; 6],
    ) -> bool;
}

/// Decomposed `AUTN` fields (spec §4.3: `SQN⊕AK (6) ‖ AMF (2) ‖ MAC (8)`).
pub struct AutnParts {
    pub sqn_xor_ak: [u8; 6],
    pub amf: [u8; 2],
    pub mac: [u8; 8],
}

impl AutnParts {
    pub fn split(autn: &[u8; 16]) -> Self {
        let octets = OctetString::from(*autn);
        let mut sqn_xor_ak = [0u8; 6];
        let mut amf = [0u8; 2];
        let mut mac = [0u8; 8];
        sqn_xor_ak.copy_from_slice(octets.sub_range(0, 6).as_bytes());
        amf.copy_from_slice(octets.sub_range(6, 8).as_bytes());
        mac.copy_from_slice(octets.sub_range(8, 16).as_bytes());
        AutnParts { sqn_xor_ak, amf, mac }
    }

    /// Separation bit is bit 7 (MSB-first, 3GPP bit order) of `AMF[0]`.
    fn separation_bit_set(&self) -> bool {
        OctetString::from(self.amf).bit(0, 0)
    }
}

/// Result of a successful validation: the recovered `SQN` and the Milenage
/// record computed against it, which callers need for `RES`/`RES*`/key
/// derivation without recomputing Milenage a third time.
pub struct Validated {
    pub received_sqn: [u8; 6],
    pub milenage: milenage::MilenageOutput,
}

/// Runs the five checks of spec §4.3 in order and returns either the
/// validated record or the failure classification.
pub fn validate(
    sqn_manager: &mut impl SqnManager,
    opc: &[u8; 16],
    k: &[u8; 16],
    rand: &[u8; 16],
    autn: &[u8; 16],
) -> Result<Validated, AutnOutcome> {
    let parts = AutnParts::split(autn);

    if !parts.separation_bit_set() {
        return Err(AutnOutcome::AmfSeparationBitFailure);
    }

    let current_sqn = sqn_manager.get_sqn();
    let provisional = milenage::compute(opc, k, rand, &current_sqn, &parts.amf);
    let received_sqn = octet::xor_arrays(&parts.sqn_xor_ak, &provisional.ak);

    let sqn_acceptable = sqn_manager.check_sqn(received_sqn);

    let recomputed = milenage::compute(opc, k, rand, &received_sqn, &parts.amf);
    if recomputed.mac_a[..].ct_ne(&parts.mac[..]).into() {
        return Err(AutnOutcome::MacFailure);
    }

    if !sqn_acceptable {
        return Err(AutnOutcome::SynchronisationFailure);
    }

    Ok(Validated {
        received_sqn,
        milenage: recomputed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSqn {
        current: [u8; 6],
        accept: bool,
    }
    impl SqnManager for FixedSqn {
        fn get_sqn(&self) -> [u8; 6] {
            self.current
        }
        fn check_sqn(
            &mut self,
            _received: [u8; 6],
        ) -> bool {
            self.accept
        }
    }

    fn hex16(s: &str) -> [u8; 16] {
        let mut out = [0u8; 16];
        faster_hex::hex_decode(s.as_bytes(), &mut out).unwrap();
        out
    }
    fn hex6(s: &str) -> [u8; 6] {
        let mut out = [0u8; 6];
        faster_hex::hex_decode(s.as_bytes(), &mut out).unwrap();
        out
    }

    fn test_vector() -> ([u8; 16], [u8; 16], [u8; 16], [u8; 6]) {
        let k = hex16("465b5ce8b199b49faa5f0a2ee238a6bc");
        let opc = hex16("cd63cb71954a9f4e48a5994e37a02baf");
        let rand = hex16("23553cbe9637a89d218ae64dae47bf35");
        let sqn = hex6("ff9bb4d0b607");
        (k, opc, rand, sqn)
    }

    fn build_autn(
        k: &[u8; 16],
        opc: &[u8; 16],
        rand: &[u8; 16],
        sqn: &[u8; 6],
        amf: &[u8; 2],
    ) -> [u8; 16] {
        let out = milenage::compute(opc, k, rand, sqn, amf);
        let mut autn = [0u8; 16];
        for i in 0..6 {
            autn[i] = sqn[i] ^ out.ak[i];
        }
        autn[6..8].copy_from_slice(amf);
        autn[8..16].copy_from_slice(&out.mac_a);
        autn
    }

    #[test]
    fn valid_autn_is_ok() {
        let (k, opc, rand, sqn) = test_vector();
        let amf = [0xb9, 0xb9];
        let autn = build_autn(&k, &opc, &rand, &sqn, &amf);
        let mut mgr = FixedSqn { current: sqn, accept: true };
        let result = validate(&mut mgr, &opc, &k, &rand, &autn);
        assert!(result.is_ok());
    }

    #[test]
    fn bad_mac_takes_precedence_over_bad_sqn() {
        let (k, opc, rand, sqn) = test_vector();
        let amf = [0xb9, 0xb9];
        let mut autn = build_autn(&k, &opc, &rand, &sqn, &amf);
        autn[15] ^= 0xff;
        let mut mgr = FixedSqn { current: sqn, accept: false };
        let result = validate(&mut mgr, &opc, &k, &rand, &autn);
        assert_eq!(result.unwrap_err(), AutnOutcome::MacFailure);
    }

    #[test]
    fn synch_failure_when_mac_matches_but_sqn_rejected() {
        let (k, opc, rand, sqn) = test_vector();
        let amf = [0xb9, 0xb9];
        let autn = build_autn(&k, &opc, &rand, &sqn, &amf);
        let mut mgr = FixedSqn { current: sqn, accept: false };
        let result = validate(&mut mgr, &opc, &k, &rand, &autn);
        assert_eq!(result.unwrap_err(), AutnOutcome::SynchronisationFailure);
    }

    #[test]
    fn separation_bit_failure_detected_before_crypto() {
        let (k, opc, rand, sqn) = test_vector();
        let amf = [0x39, 0xb9]; // bit 7 of AMF[0] clear
        let autn = build_autn(&k, &opc, &rand, &sqn, &amf);
        let mut mgr = FixedSqn { current: sqn, accept: true };
        let result = validate(&mut mgr, &opc, &k, &rand, &autn);
        assert_eq!(result.unwrap_err(), AutnOutcome::AmfSeparationBitFailure);
    }
}
