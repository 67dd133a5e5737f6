//! Octet-string data model (spec §3): an immutable-by-value byte sequence
//! used for all cryptographic material and wire fields carried by the
//! authentication procedures.

use std::fmt;

use bitvec::prelude::*;

/// An immutable-by-value byte sequence.
///
/// Every operation returns a new value rather than mutating in place, which
/// keeps the crypto/validation code in this crate free of aliasing surprises
/// when the same `RAND`/`AUTN` is read by several handlers in one procedure.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct OctetString(Vec<u8>);

impl OctetString {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Concatenates `self` and `other` into a new octet string.
    pub fn concat(&self, other: &OctetString) -> OctetString {
        let mut out = Vec::with_capacity(self.len() + other.len());
        out.extend_from_slice(&self.0);
        out.extend_from_slice(&other.0);
        OctetString(out)
    }

    /// XORs two equal-length octet strings. Returns `None` on length
    /// mismatch rather than panicking, since both operands here are wire- or
    /// USIM-derived and a mismatch is a caller bug worth surfacing.
    pub fn xor(&self, other: &OctetString) -> Option<OctetString> {
        if self.len() != other.len() {
            return None;
        }
        Some(OctetString(
            self.0
                .iter()
                .zip(other.0.iter())
                .map(|(a, b)| a ^ b)
                .collect(),
        ))
    }

    /// Copies out the half-open byte range `[start, end)`.
    pub fn sub_range(&self, start: usize, end: usize) -> OctetString {
        OctetString(self.0[start..end].to_vec())
    }

    /// Reads bit `bit_index` (0 = MSB) of byte `byte_index`, 3GPP bit-order
    /// convention (the same `Msb0` ordering the AMF separation-bit and
    /// ngKSI fields use elsewhere in NAS).
    pub fn bit(&self, byte_index: usize, bit_index: usize) -> bool {
        self.0[byte_index].view_bits::<Msb0>()[bit_index]
    }

    pub fn hex(&self) -> String {
        faster_hex::hex_string(&self.0)
    }
}

impl From<Vec<u8>> for OctetString {
    fn from(v: Vec<u8>) -> Self {
        OctetString(v)
    }
}

impl<const N: usize> From<[u8; N]> for OctetString {
    fn from(v: [u8; N]) -> Self {
        OctetString(v.to_vec())
    }
}

impl AsRef<[u8]> for OctetString {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for OctetString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OctetString({})", self.hex())
    }
}

/// XORs two equal-length fixed-size arrays by routing through
/// `OctetString::xor`, so the one's-and-zeros at every crypto/wire boundary
/// in this crate go through the same `Xor` implementation rather than a
/// hand-rolled loop per call site.
pub fn xor_arrays<const N: usize>(
    a: &[u8; N],
    b: &[u8; N],
) -> [u8; N] {
    let xored = OctetString::from(*a)
        .xor(&OctetString::from(*b))
        .expect("both operands are [u8; N]");
    let mut out = [0u8; N];
    out.copy_from_slice(xored.as_bytes());
    out
}
