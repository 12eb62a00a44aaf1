//! Encodings of plaintext vectors into polynomials.

use std::fmt::Display;

#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) enum EncodingEnum {
    Poly,
    Simd,
}

impl Display for EncodingEnum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// An encoding for the plaintext.
///
/// Without an explicit level, plaintexts are encoded at the maximum level of
/// the parameters.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Encoding {
    pub(crate) encoding: EncodingEnum,
    pub(crate) level: Option<usize>,
}

impl Encoding {
    /// A Poly encoding encodes a vector as coefficients of a polynomial;
    /// homomorphic operations are therefore polynomial operations.
    pub fn poly() -> Self {
        Self {
            encoding: EncodingEnum::Poly,
            level: None,
        }
    }

    /// A Simd encoding encodes a vector so that homomorphic operations are
    /// component-wise operations on the coefficients of the underlying vectors.
    /// The Simd encoding require that the plaintext modulus is congruent to 1
    /// modulo the degree of the underlying polynomial.
    pub fn simd() -> Self {
        Self {
            encoding: EncodingEnum::Simd,
            level: None,
        }
    }

    /// A poly encoding at a given level.
    pub fn poly_at_level(level: usize) -> Self {
        Self {
            encoding: EncodingEnum::Poly,
            level: Some(level),
        }
    }

    /// A simd encoding at a given level.
    pub fn simd_at_level(level: usize) -> Self {
        Self {
            encoding: EncodingEnum::Simd,
            level: Some(level),
        }
    }
}

impl From<Encoding> for String {
    fn from(e: Encoding) -> Self {
        String::from(&e)
    }
}

impl From<&Encoding> for String {
    fn from(e: &Encoding) -> Self {
        format!("{e:?}")
    }
}
