//! Fixed-width limb decomposition for 256-bit values.
//!
//! Signature scalars, curve coordinates and message digests are handed to the
//! verifier as four 64-bit limbs with `limb[0]` the most significant.

use num_bigint::BigUint;

use crate::error::CryptoError;

pub const LIMB_BITS: usize = 64;
pub const LIMB_COUNT: usize = 4;
pub const LIMBED_BYTES: usize = LIMB_BITS / 8 * LIMB_COUNT;

pub type Limbs = [u64; LIMB_COUNT];

pub fn bytes_to_limbs(bytes: &[u8; LIMBED_BYTES]) -> Limbs {
    let mut limbs = [0u64; LIMB_COUNT];
    for (limb, chunk) in limbs.iter_mut().zip(bytes.chunks_exact(LIMB_BITS / 8)) {
        let mut buf = [0u8; LIMB_BITS / 8];
        buf.copy_from_slice(chunk);
        *limb = u64::from_be_bytes(buf);
    }
    limbs
}

pub fn limbs_to_bytes(limbs: &Limbs) -> [u8; LIMBED_BYTES] {
    let mut out = [0u8; LIMBED_BYTES];
    for (chunk, limb) in out.chunks_exact_mut(LIMB_BITS / 8).zip(limbs.iter()) {
        chunk.copy_from_slice(&limb.to_be_bytes());
    }
    out
}

pub fn biguint_to_limbs(value: &BigUint) -> Result<Limbs, CryptoError> {
    let bits = value.bits();
    if bits > (LIMB_BITS * LIMB_COUNT) as u64 {
        return Err(CryptoError::ValueTooWide { bits });
    }
    let raw = value.to_bytes_be();
    let mut bytes = [0u8; LIMBED_BYTES];
    bytes[LIMBED_BYTES - raw.len()..].copy_from_slice(&raw);
    Ok(bytes_to_limbs(&bytes))
}

pub fn limbs_to_biguint(limbs: &Limbs) -> BigUint {
    BigUint::from_bytes_be(&limbs_to_bytes(limbs))
}

/// Decimal rendering used by the verifier's JSON inputs.
pub fn limbs_to_decimal(limbs: &Limbs) -> [String; LIMB_COUNT] {
    limbs.map(|limb| limb.to_string())
}
