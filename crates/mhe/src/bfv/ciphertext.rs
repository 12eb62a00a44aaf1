//! Ciphertext type in the BFV encryption scheme, and its binary codec.

use crate::bfv::parameters::BfvParameters;
use crate::{Error, Result};
use fhe_math::rq::{traits::TryConvertFrom, Poly, Representation};
use fhe_traits::{DeserializeParametrized, FheCiphertext, FheParametrized, Serialize};
use ndarray::Array2;
use std::mem::size_of;
use std::sync::Arc;

/// Byte 0 holds the number of elements, bytes 1..9 the scale, byte 9 is
/// reserved and byte 10 holds the NTT flag.
pub const METADATA_SIZE: usize = 11;
const SCALE_RANGE: std::ops::Range<usize> = 1..9;
const NTT_FLAG_INDEX: usize = 10;
/// Each element starts with log2 of the degree and its number of limbs.
const ELEMENT_HEADER_SIZE: usize = 2;

/// A ciphertext encrypting a plaintext.
#[derive(Debug, Clone)]
pub struct Ciphertext {
    /// The parameters of the underlying BFV encryption scheme.
    pub(crate) par: Arc<BfvParameters>,

    /// The ciphertext elements.
    pub c: Vec<Poly>,

    /// The ciphertext level
    pub level: usize,

    /// Encoding factor carried along the ciphertext.
    pub(crate) scale: f64,
}

impl PartialEq for Ciphertext {
    /// Ciphertexts are equal when they hold the same values; the timing flags
    /// of the underlying polynomials are ignored.
    fn eq(&self, other: &Self) -> bool {
        self.par == other.par
            && self.level == other.level
            && self.scale.to_bits() == other.scale.to_bits()
            && self.c.len() == other.c.len()
            && self.c.iter().zip(other.c.iter()).all(|(a, b)| {
                a.ctx() == b.ctx()
                    && a.representation() == b.representation()
                    && a.coefficients() == b.coefficients()
            })
    }
}

impl Eq for Ciphertext {}

impl Ciphertext {
    /// Create a ciphertext from a vector of polynomials.
    /// A ciphertext must contain at least one polynomial, and all polynomials
    /// must share their representation and their context.
    pub fn new(c: Vec<Poly>, par: &Arc<BfvParameters>) -> Result<Self> {
        if c.is_empty() {
            return Err(Error::TooFewValues(0, 1));
        }

        let ctx = c[0].ctx();
        let level = par.level_of_ctx(ctx)?;
        let representation = c[0].representation().clone();
        if representation == Representation::NttShoup {
            return Err(Error::MathError(fhe_math::Error::IncorrectRepresentation(
                representation,
                Representation::Ntt,
            )));
        }

        // Check that all polynomials have the same representation and context.
        for ci in c.iter() {
            if ci.representation() != &representation {
                return Err(Error::MathError(fhe_math::Error::IncorrectRepresentation(
                    ci.representation().clone(),
                    representation,
                )));
            }
            if ci.ctx() != ctx {
                return Err(Error::MathError(fhe_math::Error::InvalidContext));
            }
        }

        Ok(Self {
            par: par.clone(),
            c,
            level,
            scale: 1.0,
        })
    }

    /// A ciphertext holding no element. It is rejected by every evaluator
    /// operation and is mostly useful as a placeholder.
    pub fn empty(par: &Arc<BfvParameters>) -> Self {
        Self {
            par: par.clone(),
            c: Default::default(),
            level: par.max_level(),
            scale: 1.0,
        }
    }

    /// Generate the ciphertext of the given degree with all elements set to
    /// zero, in NTT representation.
    pub fn zero(par: &Arc<BfvParameters>, degree: usize, level: usize) -> Result<Self> {
        let ctx = par.ctx_at_level(level)?;
        Ok(Self {
            par: par.clone(),
            c: (0..=degree)
                .map(|_| Poly::zero(ctx, Representation::Ntt))
                .collect(),
            level,
            scale: 1.0,
        })
    }

    /// Get the i-th polynomial of the ciphertext.
    pub fn get(&self, i: usize) -> Option<&Poly> {
        self.c.get(i)
    }

    /// Degree of the ciphertext, i.e. its number of elements minus one.
    /// An empty ciphertext has degree 0.
    pub fn degree(&self) -> usize {
        self.c.len().saturating_sub(1)
    }

    /// Whether the ciphertext holds no element.
    pub fn is_empty(&self) -> bool {
        self.c.is_empty()
    }

    /// Whether the elements are in the NTT domain.
    pub fn is_ntt(&self) -> bool {
        self.c
            .first()
            .map_or(true, |c| c.representation() != &Representation::PowerBasis)
    }

    /// Encoding factor of the ciphertext.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Sets the encoding factor of the ciphertext.
    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale
    }

    /// Parameters of the ciphertext.
    pub fn parameters(&self) -> &Arc<BfvParameters> {
        &self.par
    }

    /// Modulo switch the ciphertext to the next (lower) level, dropping the
    /// last ciphertext modulus.
    pub fn mod_switch_to_next_level(&mut self) -> Result<()> {
        if self.level > 0 {
            let ntt = self.is_ntt();
            for ci in self.c.iter_mut() {
                ci.change_representation(Representation::PowerBasis);
                ci.mod_switch_down_next()?;
                if ntt {
                    ci.change_representation(Representation::Ntt);
                }
            }
            self.level -= 1
        }
        Ok(())
    }

    /// Modulo switch the ciphertext down to `level`.
    pub fn mod_switch_to_level(&mut self, level: usize) -> Result<()> {
        if level > self.level {
            return Err(Error::LevelMismatch {
                expected: self.level,
                found: level,
            });
        }
        while self.level > level {
            self.mod_switch_to_next_level()?
        }
        Ok(())
    }

    /// Number of bytes of the encoding, with or without the metadata header.
    pub fn binary_len(&self, with_metadata: bool) -> usize {
        let elements = self
            .c
            .iter()
            .map(|ci| {
                ELEMENT_HEADER_SIZE + ci.ctx().moduli().len() * self.par.degree() * size_of::<u64>()
            })
            .sum::<usize>();
        if with_metadata {
            METADATA_SIZE + elements
        } else {
            elements
        }
    }

    /// Encodes the ciphertext.
    ///
    /// With metadata, the layout is: byte 0 holds `degree + 1`, bytes 1..9
    /// hold the little-endian bits of the scale, byte 10 holds 1 when the
    /// elements are in the NTT domain. The elements follow in order, each as
    /// `[log2(N)][limbs][limbs * N little-endian u64]`.
    pub fn to_bytes_with_metadata(&self, with_metadata: bool) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.binary_len(with_metadata));
        if with_metadata {
            bytes.push(self.c.len() as u8);
            bytes.extend_from_slice(&self.scale.to_bits().to_le_bytes());
            bytes.push(0);
            bytes.push(self.is_ntt() as u8);
        }
        for ci in &self.c {
            write_element(ci, self.par.degree(), &mut bytes);
        }
        bytes
    }

    /// Decodes a ciphertext encoded with its metadata. The buffer must be
    /// consumed exactly.
    pub fn from_bytes_with_metadata(bytes: &[u8], par: &Arc<BfvParameters>) -> Result<Self> {
        if bytes.len() < METADATA_SIZE {
            return Err(Error::truncated(METADATA_SIZE, bytes.len()));
        }
        let num_elements = bytes[0] as usize;
        if num_elements == 0 {
            return Err(Error::Format("a ciphertext has at least one element".to_string()));
        }
        let mut scale_bytes = [0u8; 8];
        scale_bytes.copy_from_slice(&bytes[SCALE_RANGE]);
        let scale = f64::from_bits(u64::from_le_bytes(scale_bytes));
        let representation = match bytes[NTT_FLAG_INDEX] {
            0 => Representation::PowerBasis,
            1 => Representation::Ntt,
            flag => return Err(Error::Format(format!("invalid NTT flag {flag}"))),
        };

        let mut c = Vec::with_capacity(num_elements);
        let mut pointer = METADATA_SIZE;
        for _ in 0..num_elements {
            let (poly, read) = read_element(&bytes[pointer..], par, representation.clone())?;
            pointer += read;
            c.push(poly);
        }
        if pointer != bytes.len() {
            return Err(Error::Format(format!(
                "{} trailing bytes after the last element",
                bytes.len() - pointer
            )));
        }

        let mut ct = Self::new(c, par).map_err(|e| Error::Format(e.to_string()))?;
        ct.scale = scale;
        Ok(ct)
    }

    /// Decodes a ciphertext encoded without metadata. Elements are read until
    /// the buffer is exhausted, and are interpreted in the NTT domain with a
    /// unit scale.
    pub fn from_bytes_without_metadata(bytes: &[u8], par: &Arc<BfvParameters>) -> Result<Self> {
        let mut c = vec![];
        let mut pointer = 0;
        while pointer < bytes.len() {
            let (poly, read) = read_element(&bytes[pointer..], par, Representation::Ntt)?;
            pointer += read;
            c.push(poly);
        }
        Self::new(c, par).map_err(|e| Error::Format(e.to_string()))
    }
}

fn write_element(poly: &Poly, degree: usize, bytes: &mut Vec<u8>) {
    let coefficients = poly.coefficients();
    bytes.push(degree.trailing_zeros() as u8);
    bytes.push(coefficients.nrows() as u8);
    for row in coefficients.outer_iter() {
        for coefficient in row.iter() {
            bytes.extend_from_slice(&coefficient.to_le_bytes());
        }
    }
}

/// Reads one element, returning it with the number of bytes consumed.
fn read_element(
    bytes: &[u8],
    par: &Arc<BfvParameters>,
    representation: Representation,
) -> Result<(Poly, usize)> {
    if bytes.len() < ELEMENT_HEADER_SIZE {
        return Err(Error::truncated(ELEMENT_HEADER_SIZE, bytes.len()));
    }
    let degree = 1usize
        .checked_shl(bytes[0] as u32)
        .ok_or_else(|| Error::Format(format!("invalid log2 degree {}", bytes[0])))?;
    if degree != par.degree() {
        return Err(Error::Format(format!(
            "element of degree {degree}, parameters have degree {}",
            par.degree()
        )));
    }
    let limbs = bytes[1] as usize;
    if limbs == 0 || limbs > par.moduli().len() {
        return Err(Error::Format(format!("invalid number of limbs {limbs}")));
    }
    let len = ELEMENT_HEADER_SIZE + limbs * degree * size_of::<u64>();
    if bytes.len() < len {
        return Err(Error::truncated(len, bytes.len()));
    }

    let ctx = par.ctx_at_level(limbs - 1)?;
    let mut coefficients = Array2::<u64>::zeros((limbs, degree));
    for (i, (chunk, c)) in bytes[ELEMENT_HEADER_SIZE..len]
        .chunks_exact(size_of::<u64>())
        .zip(coefficients.iter_mut())
        .enumerate()
    {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        *c = u64::from_le_bytes(word);
        let modulus = ctx.moduli()[i / degree];
        if *c >= modulus {
            return Err(Error::Format(format!(
                "coefficient {} is not reduced modulo {modulus}",
                *c
            )));
        }
    }

    let poly = Poly::try_convert_from(coefficients, ctx, false, representation)?;
    Ok((poly, len))
}

impl FheCiphertext for Ciphertext {}

impl FheParametrized for Ciphertext {
    type Parameters = BfvParameters;
}

impl Serialize for Ciphertext {
    fn to_bytes(&self) -> Vec<u8> {
        self.to_bytes_with_metadata(true)
    }
}

impl DeserializeParametrized for Ciphertext {
    type Error = Error;

    fn from_bytes(bytes: &[u8], par: &Arc<BfvParameters>) -> Result<Self> {
        Self::from_bytes_with_metadata(bytes, par)
    }
}
