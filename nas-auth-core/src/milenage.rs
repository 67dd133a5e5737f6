//! C1 — Milenage engine (3GPP TS 35.206 f1/f1*/f2/f3/f4/f5/f5*, OPc
//! derivation).
//!
//! The AES-128 block cipher underneath is the only piece of 3GPP crypto this
//! module does not hand-roll; it is sourced from the RustCrypto `aes`/
//! `cipher` crates rather than reimplemented, the same way the pack's
//! embedded-security repos reach for `aes`/`cipher`/`sha2` instead of a
//! bespoke AES core.

use aes::Aes128;
use cipher::{BlockEncrypt, KeyInit, generic_array::GenericArray};

use crate::octet;

/// The five outputs f1–f5 (plus f1*/f5*) defined over one `(K, OPc, RAND,
/// SQN, AMF)` tuple.
#[derive(Clone)]
pub struct MilenageOutput {
    pub mac_a: [u8; 8],
    pub mac_s: [u8; 8],
    pub ck: [u8; 16],
    pub ik: [u8; 16],
    pub ak: [u8; 6],
    pub ak_r: [u8; 6],
    pub res: [u8; 8],
}

/// AMF substituted during resynchronisation (spec §4.1): f1* is always
/// computed with a zeroed AMF when producing AUTS.
pub const DUMMY_AMF: [u8; 2] = [0, 0];

const C1: [u8; 16] = [0; 16];
const C2: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
const C3: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2];
const C4: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 4];
const C5: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 8];

const R1: u32 = 64;
const R2: u32 = 0;
const R3: u32 = 32;
const R4: u32 = 64;
const R5: u32 = 96;

fn xor16(
    a: &[u8; 16],
    b: &[u8; 16],
) -> [u8; 16] {
    octet::xor_arrays(a, b)
}

/// Left-rotates a 128-bit value by `bits` bits.
fn rotate_left(
    value: &[u8; 16],
    bits: u32,
) -> [u8; 16] {
    let bytes = (bits / 8) as usize % 16;
    let rem = bits % 8;
    let mut out = [0u8; 16];
    if rem == 0 {
        for i in 0..16 {
            out[i] = value[(i + bytes) % 16];
        }
    } else {
        for i in 0..16 {
            let hi = value[(i + bytes) % 16];
            let lo = value[(i + bytes + 1) % 16];
            out[i] = (hi << rem) | (lo >> (8 - rem));
        }
    }
    out
}

fn aes_encrypt(
    key: &[u8; 16],
    block: &[u8; 16],
) -> [u8; 16] {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut buf = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut buf);
    buf.into()
}

/// `CalculateOpC(OP, K) -> OPC` for configurations where `opType == OP`
/// (spec §4.1).
pub fn calculate_opc(
    op: &[u8; 16],
    k: &[u8; 16],
) -> [u8; 16] {
    xor16(&aes_encrypt(k, op), op)
}

/// Runs the full Milenage computation for one `(OPc, K, RAND, SQN, AMF)`
/// tuple.
pub fn compute(
    opc: &[u8; 16],
    k: &[u8; 16],
    rand: &[u8; 16],
    sqn: &[u8; 6],
    amf: &[u8; 2],
) -> MilenageOutput {
    let temp = aes_encrypt(k, &xor16(rand, opc));

    let mut in1 = [0u8; 16];
    in1[0..6].copy_from_slice(sqn);
    in1[6..8].copy_from_slice(amf);
    in1[8..14].copy_from_slice(sqn);
    in1[14..16].copy_from_slice(amf);

    let out1 = xor16(
        &aes_encrypt(k, &xor16(&xor16(&temp, &rotate_left(&xor16(&in1, opc), R1)), &C1)),
        opc,
    );
    let mut mac_a = [0u8; 8];
    mac_a.copy_from_slice(&out1[0..8]);
    let mut mac_s = [0u8; 8];
    mac_s.copy_from_slice(&out1[8..16]);

    let out2 = xor16(
        &aes_encrypt(k, &xor16(&rotate_left(&xor16(&temp, opc), R2), &C2)),
        opc,
    );
    let mut ak = [0u8; 6];
    ak.copy_from_slice(&out2[0..6]);
    let mut res = [0u8; 8];
    res.copy_from_slice(&out2[8..16]);

    let out3 = xor16(
        &aes_encrypt(k, &xor16(&rotate_left(&xor16(&temp, opc), R3), &C3)),
        opc,
    );
    let ck = out3;

    let out4 = xor16(
        &aes_encrypt(k, &xor16(&rotate_left(&xor16(&temp, opc), R4), &C4)),
        opc,
    );
    let ik = out4;

    let out5 = xor16(
        &aes_encrypt(k, &xor16(&rotate_left(&xor16(&temp, opc), R5), &C5)),
        opc,
    );
    let mut ak_r = [0u8; 6];
    ak_r.copy_from_slice(&out5[0..6]);

    MilenageOutput {
        mac_a,
        mac_s,
        ck,
        ik,
        ak,
        ak_r,
        res,
    }
}
