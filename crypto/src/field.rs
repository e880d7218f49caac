//! Elements of the BN254 scalar field.
//!
//! Values are kept as reduced [`BigUint`]s. Every constructor reduces its
//! input modulo [`modulus`], so two elements compare equal exactly when they
//! denote the same residue.

use core::fmt;
use core::ops::{Add, Mul, Sub};
use std::sync::OnceLock;

use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CryptoError;

/// Decimal form of the BN254 scalar-field prime.
pub const FIELD_MODULUS_DECIMAL: &str =
    "21888242871839275222246405745257275088548364400416034343698204186575808495617";

/// Canonical byte width of an encoded field element.
pub const FIELD_BYTES: usize = 32;

pub fn modulus() -> &'static BigUint {
    static MODULUS: OnceLock<BigUint> = OnceLock::new();
    MODULUS.get_or_init(|| {
        BigUint::parse_bytes(FIELD_MODULUS_DECIMAL.as_bytes(), 10).expect("modulus literal")
    })
}

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldElement(BigUint);

impl FieldElement {
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn one() -> Self {
        Self(BigUint::one())
    }

    pub fn from_u64(value: u64) -> Self {
        Self::from_biguint(BigUint::from(value))
    }

    pub fn from_biguint(value: BigUint) -> Self {
        let modulus = modulus();
        if &value < modulus {
            Self(value)
        } else {
            Self(value % modulus)
        }
    }

    /// Interpret `bytes` as a big-endian integer and reduce it.
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        Self::from_biguint(BigUint::from_bytes_be(bytes))
    }

    /// Parse a base-10 string, reducing values at or above the modulus.
    pub fn from_decimal(text: &str) -> Result<Self, CryptoError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(CryptoError::InvalidEncoding("empty decimal string".into()));
        }
        BigUint::parse_bytes(trimmed.as_bytes(), 10)
            .map(Self::from_biguint)
            .ok_or_else(|| CryptoError::InvalidEncoding(format!("not a decimal integer: {trimmed}")))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    /// Big-endian encoding left-padded to [`FIELD_BYTES`].
    pub fn to_be_bytes(&self) -> [u8; FIELD_BYTES] {
        let raw = self.0.to_bytes_be();
        let mut out = [0u8; FIELD_BYTES];
        out[FIELD_BYTES - raw.len()..].copy_from_slice(&raw);
        out
    }

    pub fn to_decimal(&self) -> String {
        self.0.to_str_radix(10)
    }

    pub fn pow(&self, exponent: u64) -> Self {
        Self(self.0.modpow(&BigUint::from(exponent), modulus()))
    }

    fn add_ref(&self, other: &Self) -> Self {
        Self::from_biguint(&self.0 + &other.0)
    }

    fn sub_ref(&self, other: &Self) -> Self {
        if self.0 >= other.0 {
            Self(&self.0 - &other.0)
        } else {
            Self(modulus() - &other.0 + &self.0)
        }
    }

    fn mul_ref(&self, other: &Self) -> Self {
        Self::from_biguint(&self.0 * &other.0)
    }
}

macro_rules! forward_binop {
    ($trait:ident, $method:ident, $inner:ident) => {
        impl $trait for FieldElement {
            type Output = FieldElement;
            fn $method(self, rhs: FieldElement) -> FieldElement {
                self.$inner(&rhs)
            }
        }

        impl<'a> $trait<&'a FieldElement> for &'a FieldElement {
            type Output = FieldElement;
            fn $method(self, rhs: &'a FieldElement) -> FieldElement {
                self.$inner(rhs)
            }
        }
    };
}

forward_binop!(Add, add, add_ref);
forward_binop!(Sub, sub, sub_ref);
forward_binop!(Mul, mul, mul_ref);

impl From<u64> for FieldElement {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl From<BigUint> for FieldElement {
    fn from(value: BigUint) -> Self {
        Self::from_biguint(value)
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Decimal strings keep wide values intact through JSON consumers.
impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal())
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_decimal(&text).map_err(serde::de::Error::custom)
    }
}
