//! Create parameters for the BFV encryption scheme with an auxiliary
//! key-switching modulus.

use crate::proto::bfv::Parameters;
use crate::{Error, ParametersError, Result};
use fhe_math::{
    rns::{RnsContext, ScalingFactor},
    rq::{scaler::Scaler, traits::TryConvertFrom, Context, Poly, Representation},
    zq::{ntt::NttOperator, primes::generate_prime, Modulus},
};
use fhe_traits::{Deserialize, FheParameters, Serialize};
use itertools::Itertools;
use ndarray::Array2;
use num_bigint::BigUint;
use num_traits::{One, ToPrimitive};
use prost::Message;
use std::fmt::Debug;
use std::ops::Range;
use std::sync::Arc;

/// Parameters for the BFV encryption scheme.
///
/// Levels count the ciphertext moduli that are retained: a ciphertext at
/// level `l` lives modulo `q_0 * ... * q_l`, and fresh ciphertexts are at
/// [`BfvParameters::max_level`].
#[derive(PartialEq, Eq)]
pub struct BfvParameters {
    /// Number of coefficients in a polynomial.
    polynomial_degree: usize,

    /// Modulus of the plaintext.
    plaintext_modulus: u64,

    /// Vector of coprime moduli q_i for the ciphertext.
    pub(crate) moduli: Box<[u64]>,

    /// Sizes of the ciphertext moduli.
    moduli_sizes: Box<[usize]>,

    /// Vector of coprime special moduli p_j used during key switching.
    pub(crate) special_moduli: Box<[u64]>,

    /// Sizes of the special moduli.
    special_moduli_sizes: Box<[usize]>,

    /// Error variance
    pub(crate) variance: usize,

    /// Number of bits of the power-of-2 decomposition window, 0 to disable.
    pub(crate) decomposition_base: usize,

    /// Contexts for the ciphertext polynomials, indexed by level.
    pub(crate) ctx: Box<[Arc<Context>]>,

    /// Context over all the ciphertext moduli followed by the special moduli.
    pub(crate) ctx_extended: Arc<Context>,

    /// Product of the special moduli.
    pub(crate) special_modulus: BigUint,

    /// Ntt operator for the SIMD plaintext, if possible.
    pub(crate) op: Option<Arc<NttOperator>>,

    /// Scaling polynomial for the plaintext, per level.
    pub(crate) delta: Box<[Poly]>,

    /// Q modulo the plaintext modulus, per level.
    pub(crate) q_mod_t: Box<[u64]>,

    /// Down scaler for the plaintext, per level.
    pub(crate) scalers: Box<[Scaler]>,

    /// Plaintext Modulus
    pub(crate) plaintext: Modulus,

    /// Parameters for the multiplications, per level.
    pub(crate) mul_params: Box<[MultiplicationParameters]>,

    /// Parameters for the key switching, per level.
    pub(crate) ks_params: Box<[KeySwitchParameters]>,

    /// Gadget constants `P * 2^(w*j) * g_i` in the extended context, indexed
    /// by [digit][window].
    pub(crate) gadget: Box<[Box<[Poly]>]>,

    pub(crate) matrix_reps_index_map: Box<[usize]>,
}

impl Debug for BfvParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BfvParameters")
            .field("polynomial_degree", &self.polynomial_degree)
            .field("plaintext_modulus", &self.plaintext_modulus)
            .field("moduli", &self.moduli)
            .field("special_moduli", &self.special_moduli)
            .field("decomposition_base", &self.decomposition_base)
            .finish()
    }
}

impl FheParameters for BfvParameters {}

impl BfvParameters {
    /// Returns the underlying polynomial degree
    pub const fn degree(&self) -> usize {
        self.polynomial_degree
    }

    /// Returns a reference to the ciphertext moduli
    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    /// Returns a reference to the ciphertext moduli sizes
    pub fn moduli_sizes(&self) -> &[usize] {
        &self.moduli_sizes
    }

    /// Returns a reference to the special moduli
    pub fn special_moduli(&self) -> &[u64] {
        &self.special_moduli
    }

    /// Returns a reference to the special moduli sizes
    pub fn special_moduli_sizes(&self) -> &[usize] {
        &self.special_moduli_sizes
    }

    /// Returns the plaintext modulus
    pub const fn plaintext(&self) -> u64 {
        self.plaintext_modulus
    }

    /// Returns the variance
    pub const fn variance(&self) -> usize {
        self.variance
    }

    /// Returns the power-of-2 decomposition base in bits, or 0 when the
    /// gadget decomposition only uses RNS digits.
    pub const fn decomposition_base(&self) -> usize {
        self.decomposition_base
    }

    /// Returns the maximum level allowed by these parameters. Fresh
    /// ciphertexts are at this level.
    pub fn max_level(&self) -> usize {
        self.moduli.len() - 1
    }

    /// Returns the context corresponding to the level.
    pub fn ctx_at_level(&self, level: usize) -> Result<&Arc<Context>> {
        self.ctx
            .get(level)
            .ok_or_else(|| Error::DefaultError(format!("No context at level {level}")))
    }

    /// Returns the context over the ciphertext and special moduli.
    pub fn ctx_extended(&self) -> &Arc<Context> {
        &self.ctx_extended
    }

    /// Returns the level of a given context
    pub(crate) fn level_of_ctx(&self, ctx: &Arc<Context>) -> Result<usize> {
        self.ctx
            .iter()
            .position(|c| c == ctx)
            .ok_or_else(|| Error::DefaultError("Context not in the modulus chain".to_string()))
    }

    /// Number of RNS moduli grouped in one decomposition digit.
    pub fn digit_size(&self) -> usize {
        self.special_moduli.len()
    }

    /// Number of RNS digits of the gadget decomposition at a level.
    pub fn rns_digits(&self, level: usize) -> usize {
        (level + 1).div_ceil(self.digit_size())
    }

    /// Number of power-of-2 windows per RNS digit.
    pub fn pow2_windows(&self) -> usize {
        if self.decomposition_base == 0 {
            1
        } else {
            let max_bits = self.moduli_sizes.iter().max().copied().unwrap_or(0);
            max_bits.div_ceil(self.decomposition_base)
        }
    }

    /// Returns the 2N-th root of unity order used for Galois elements.
    pub fn nth_root(&self) -> usize {
        2 * self.polynomial_degree
    }

    /// Galois element rotating the SIMD columns to the left by `steps`.
    pub fn galois_element_for_column_rotation(&self, steps: usize) -> usize {
        let m = self.nth_root();
        let mut g = 1usize;
        for _ in 0..(steps % (self.polynomial_degree >> 1)) {
            g = (g * 3) % m;
        }
        g
    }

    /// Galois element swapping the two SIMD rows.
    pub fn galois_element_for_row_rotation(&self) -> usize {
        self.nth_root() - 1
    }

    /// Inverse of a Galois element modulo 2N.
    pub fn inverse_galois_element(&self, galois_element: usize) -> usize {
        // The multiplicative group modulo 2N has order N, so g^(N-1) = g^-1.
        let m = self.nth_root() as u128;
        let mut result = 1u128;
        let mut base = galois_element as u128 % m;
        let mut exponent = self.polynomial_degree - 1;
        while exponent > 0 {
            if exponent & 1 == 1 {
                result = result * base % m;
            }
            base = base * base % m;
            exponent >>= 1;
        }
        result as usize
    }

    #[cfg(test)]
    #[allow(missing_docs)]
    pub fn default_arc(num_moduli: usize, degree: usize) -> Arc<Self> {
        if !degree.is_power_of_two() || degree < 8 {
            panic!("Invalid degree");
        }
        BfvParametersBuilder::new()
            .set_degree(degree)
            .set_plaintext_modulus(1153)
            .set_moduli_sizes(&vec![62usize; num_moduli])
            .set_special_moduli_sizes(&[62])
            .build_arc()
            .unwrap()
    }
}

/// Builder for parameters for the Bfv encryption scheme.
#[derive(Debug)]
pub struct BfvParametersBuilder {
    degree: usize,
    plaintext: u64,
    variance: usize,
    decomposition_base: usize,
    ciphertext_moduli: Vec<u64>,
    ciphertext_moduli_sizes: Vec<usize>,
    special_moduli: Vec<u64>,
    special_moduli_sizes: Vec<usize>,
}

impl BfvParametersBuilder {
    /// Creates a new instance of the builder
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            degree: Default::default(),
            plaintext: Default::default(),
            variance: 10,
            decomposition_base: 0,
            ciphertext_moduli: Default::default(),
            ciphertext_moduli_sizes: Default::default(),
            special_moduli: Default::default(),
            special_moduli_sizes: Default::default(),
        }
    }

    /// Sets the polynomial degree. Returns an error if the degree is not
    /// a power of two larger or equal to 8.
    pub fn set_degree(&mut self, degree: usize) -> &mut Self {
        self.degree = degree;
        self
    }

    /// Sets the plaintext modulus. Returns an error if the plaintext is not
    /// between 2 and 2^62 - 1.
    pub fn set_plaintext_modulus(&mut self, plaintext: u64) -> &mut Self {
        self.plaintext = plaintext;
        self
    }

    /// Sets the sizes of the ciphertext moduli.
    /// Only one of `set_moduli_sizes` and `set_moduli`
    /// can be specified.
    pub fn set_moduli_sizes(&mut self, sizes: &[usize]) -> &mut Self {
        self.ciphertext_moduli_sizes = sizes.to_owned();
        self
    }

    /// Sets the ciphertext moduli to use.
    /// Only one of `set_moduli_sizes` and `set_moduli`
    /// can be specified.
    pub fn set_moduli(&mut self, moduli: &[u64]) -> &mut Self {
        self.ciphertext_moduli = moduli.to_owned();
        self
    }

    /// Sets the sizes of the special moduli used by key switching.
    /// Only one of `set_special_moduli_sizes` and `set_special_moduli`
    /// can be specified.
    pub fn set_special_moduli_sizes(&mut self, sizes: &[usize]) -> &mut Self {
        self.special_moduli_sizes = sizes.to_owned();
        self
    }

    /// Sets the special moduli used by key switching.
    pub fn set_special_moduli(&mut self, moduli: &[u64]) -> &mut Self {
        self.special_moduli = moduli.to_owned();
        self
    }

    /// Sets the error variance. Returns an error if the variance is not between
    /// one and sixteen.
    pub fn set_variance(&mut self, variance: usize) -> &mut Self {
        self.variance = variance;
        self
    }

    /// Sets the number of bits of the power-of-2 decomposition window. A
    /// non-zero base requires exactly one special modulus.
    pub fn set_decomposition_base(&mut self, bits: usize) -> &mut Self {
        self.decomposition_base = bits;
        self
    }

    /// Generate moduli with the specified sizes, skipping the ones listed in
    /// `exclude`.
    fn generate_moduli(moduli_sizes: &[usize], degree: usize, exclude: &[u64]) -> Result<Vec<u64>> {
        let mut moduli = vec![];
        for size in moduli_sizes {
            if *size > 62 || *size < 10 {
                return Err(Error::ParametersError(ParametersError::InvalidModulusSize(
                    *size, 10, 62,
                )));
            }

            let mut upper_bound = 1 << size;
            loop {
                if let Some(prime) = generate_prime(*size, 2 * degree as u64, upper_bound) {
                    if !moduli.contains(&prime) && !exclude.contains(&prime) {
                        moduli.push(prime);
                        break;
                    } else {
                        upper_bound = prime;
                    }
                } else {
                    return Err(Error::ParametersError(ParametersError::NotEnoughPrimes(
                        *size, degree,
                    )));
                }
            }
        }

        Ok(moduli)
    }

    fn resolve_moduli(
        explicit: &[u64],
        sizes: &[usize],
        degree: usize,
        exclude: &[u64],
        what: &str,
    ) -> Result<Vec<u64>> {
        if !explicit.is_empty() && !sizes.is_empty() {
            return Err(Error::ParametersError(ParametersError::TooManySpecified(
                format!("Only one of the {what} moduli and their sizes can be specified"),
            )));
        } else if explicit.is_empty() && sizes.is_empty() {
            return Err(Error::ParametersError(ParametersError::TooFewSpecified(
                format!("One of the {what} moduli and their sizes must be specified"),
            )));
        }
        if sizes.is_empty() {
            Ok(explicit.to_vec())
        } else {
            Self::generate_moduli(sizes, degree, exclude)
        }
    }

    /// Build a new `BfvParameters` inside an `Arc`.
    pub fn build_arc(&self) -> Result<Arc<BfvParameters>> {
        self.build().map(Arc::new)
    }

    /// Build a new `BfvParameters`.
    pub fn build(&self) -> Result<BfvParameters> {
        // Check that the degree is a power of 2 (and large enough).
        if self.degree < 8 || !self.degree.is_power_of_two() {
            return Err(Error::ParametersError(ParametersError::InvalidDegree(
                self.degree,
            )));
        }

        if !(1..=16).contains(&self.variance) {
            return Err(Error::ParametersError(ParametersError::InvalidVariance(
                self.variance,
            )));
        }

        let plaintext_modulus = Modulus::new(self.plaintext).map_err(|e| {
            Error::ParametersError(ParametersError::InvalidPlaintext(e.to_string()))
        })?;

        let moduli = Self::resolve_moduli(
            &self.ciphertext_moduli,
            &self.ciphertext_moduli_sizes,
            self.degree,
            &[],
            "ciphertext",
        )?;
        let special_moduli = Self::resolve_moduli(
            &self.special_moduli,
            &self.special_moduli_sizes,
            self.degree,
            &moduli,
            "special",
        )?;
        if special_moduli.iter().any(|p| moduli.contains(p)) {
            return Err(Error::ParametersError(ParametersError::InvalidDecomposition(
                "the special moduli must be distinct from the ciphertext moduli".to_string(),
            )));
        }
        if self.decomposition_base != 0 {
            if special_moduli.len() != 1 {
                return Err(Error::ParametersError(
                    ParametersError::InvalidDecomposition(format!(
                        "a power-of-2 window requires exactly one special modulus, found {}",
                        special_moduli.len()
                    )),
                ));
            }
            if self.decomposition_base > 62 {
                return Err(Error::ParametersError(
                    ParametersError::InvalidDecomposition(format!(
                        "window of {} bits exceeds 62 bits",
                        self.decomposition_base
                    )),
                ));
            }
        }

        let bit_size = |m: &u64| 64 - m.leading_zeros() as usize;
        let moduli_sizes = moduli.iter().map(bit_size).collect_vec();
        let special_moduli_sizes = special_moduli.iter().map(bit_size).collect_vec();

        // Create n+1 moduli of 62 bits for multiplication.
        let mut extended_basis = Vec::with_capacity(moduli.len() + 1);
        let mut upper_bound = 1 << 62;
        while extended_basis.len() != moduli.len() + 1 {
            upper_bound = generate_prime(62, 2 * self.degree as u64, upper_bound).ok_or(
                Error::ParametersError(ParametersError::NotEnoughPrimes(62, self.degree)),
            )?;
            if !extended_basis.contains(&upper_bound)
                && !moduli.contains(&upper_bound)
                && !special_moduli.contains(&upper_bound)
            {
                extended_basis.push(upper_bound)
            }
        }

        let op = NttOperator::new(&plaintext_modulus, self.degree);

        let mut delta_rests = vec![];
        for m in &moduli {
            let q = Modulus::new(*m)?;
            delta_rests.push(q.inv(q.neg(plaintext_modulus.modulus())).ok_or(
                Error::ParametersError(ParametersError::InvalidPlaintext(
                    "the plaintext modulus is not invertible modulo the ciphertext moduli"
                        .to_string(),
                )),
            )?)
        }

        let ctx = (0..moduli.len())
            .map(|level| Context::new(&moduli[..level + 1], self.degree).map(Arc::new))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let plaintext_ctx = ctx[0].clone();

        let extended_moduli = [moduli.as_slice(), special_moduli.as_slice()].concat();
        let ctx_extended = Arc::new(Context::new(&extended_moduli, self.degree)?);
        let special_rns = RnsContext::new(&special_moduli)?;
        let special_modulus = special_rns.modulus().clone();

        let mut delta = Vec::with_capacity(moduli.len());
        let mut q_mod_t = Vec::with_capacity(moduli.len());
        let mut scalers = Vec::with_capacity(moduli.len());
        let mut mul_params = Vec::with_capacity(moduli.len());
        let mut ks_params = Vec::with_capacity(moduli.len());
        for (level, ctx_i) in ctx.iter().enumerate() {
            let rns = RnsContext::new(&moduli[..level + 1])?;
            let mut p = Poly::try_convert_from(
                &[rns.lift((&delta_rests[..level + 1]).into())],
                ctx_i,
                true,
                Representation::PowerBasis,
            )?;
            p.change_representation(Representation::NttShoup);
            delta.push(p);

            q_mod_t.push(
                (rns.modulus() % plaintext_modulus.modulus())
                    .to_u64()
                    .ok_or_else(|| Error::DefaultError("Q mod t does not fit".to_string()))?,
            );

            scalers.push(Scaler::new(
                ctx_i,
                &plaintext_ctx,
                ScalingFactor::new(&BigUint::from(plaintext_modulus.modulus()), rns.modulus()),
            )?);

            // For the first multiplication, we want to extend to a context that
            // is ~60 bits larger.
            let modulus_size = moduli_sizes[..level + 1].iter().sum::<usize>();
            let n_moduli = (modulus_size + 60).div_ceil(62);
            let mut mul_1_moduli = vec![];
            mul_1_moduli.extend_from_slice(&moduli[..level + 1]);
            mul_1_moduli.extend_from_slice(&extended_basis[..n_moduli]);
            let mul_1_ctx = Arc::new(Context::new(&mul_1_moduli, self.degree)?);
            mul_params.push(MultiplicationParameters::new(
                ctx_i,
                &mul_1_ctx,
                ScalingFactor::one(),
                ScalingFactor::new(&BigUint::from(plaintext_modulus.modulus()), ctx_i.modulus()),
            )?);

            ks_params.push(KeySwitchParameters::new(
                &moduli,
                level,
                special_moduli.len(),
                self.degree,
                ctx_i,
                &ctx_extended,
                &special_modulus,
            )?);
        }

        let gadget = Self::gadget_constants(
            &moduli,
            &special_moduli,
            &special_modulus,
            self.decomposition_base,
            &moduli_sizes,
            &ctx_extended,
            self.degree,
        )?;

        // We use the same code as SEAL
        // https://github.com/microsoft/SEAL/blob/82b07db635132e297282649e2ab5908999089ad2/native/src/seal/batchencoder.cpp
        let row_size = self.degree >> 1;
        let m = self.degree << 1;
        let gen = 3;
        let mut pos = 1;
        let mut matrix_reps_index_map = vec![0usize; self.degree];
        for i in 0..row_size {
            let index1 = (pos - 1) >> 1;
            let index2 = (m - pos - 1) >> 1;
            matrix_reps_index_map[i] = index1.reverse_bits() >> (self.degree.leading_zeros() + 1);
            matrix_reps_index_map[row_size | i] =
                index2.reverse_bits() >> (self.degree.leading_zeros() + 1);
            pos *= gen;
            pos &= m - 1;
        }

        Ok(BfvParameters {
            polynomial_degree: self.degree,
            plaintext_modulus: self.plaintext,
            moduli: moduli.into_boxed_slice(),
            moduli_sizes: moduli_sizes.into_boxed_slice(),
            special_moduli: special_moduli.into_boxed_slice(),
            special_moduli_sizes: special_moduli_sizes.into_boxed_slice(),
            variance: self.variance,
            decomposition_base: self.decomposition_base,
            ctx: ctx.into_boxed_slice(),
            ctx_extended,
            special_modulus,
            op: op.map(Arc::new),
            delta: delta.into_boxed_slice(),
            q_mod_t: q_mod_t.into_boxed_slice(),
            scalers: scalers.into_boxed_slice(),
            plaintext: plaintext_modulus,
            mul_params: mul_params.into_boxed_slice(),
            ks_params: ks_params.into_boxed_slice(),
            gadget,
            matrix_reps_index_map: matrix_reps_index_map.into_boxed_slice(),
        })
    }

    /// Computes `P * 2^(w*j) * g_i` for every digit `i` and window `j`, as
    /// constant polynomials in NTT representation over the extended context.
    /// The CRT unit `g_i` is 1 modulo the moduli of digit `i` and 0 modulo
    /// every other modulus, so only the rows of digit `i` are non-zero.
    fn gadget_constants(
        moduli: &[u64],
        special_moduli: &[u64],
        special_modulus: &BigUint,
        decomposition_base: usize,
        moduli_sizes: &[usize],
        ctx_extended: &Arc<Context>,
        degree: usize,
    ) -> Result<Box<[Box<[Poly]>]>> {
        let digit_size = special_moduli.len();
        let digits = moduli.len().div_ceil(digit_size);
        let windows = if decomposition_base == 0 {
            1
        } else {
            moduli_sizes
                .iter()
                .max()
                .copied()
                .unwrap_or(0)
                .div_ceil(decomposition_base)
        };
        let rows = moduli.len() + special_moduli.len();

        let mut gadget = Vec::with_capacity(digits);
        for i in 0..digits {
            let range = digit_range(i, digit_size, moduli.len());
            let mut per_window = Vec::with_capacity(windows);
            for j in 0..windows {
                let factor = special_modulus << (decomposition_base * j);
                let mut coeffs = Array2::<u64>::zeros((rows, degree));
                for k in range.clone() {
                    let residue = (&factor % moduli[k])
                        .to_u64()
                        .ok_or_else(|| Error::DefaultError("Residue overflow".to_string()))?;
                    coeffs.row_mut(k).fill(residue);
                }
                per_window.push(Poly::try_convert_from(
                    coeffs,
                    ctx_extended,
                    true,
                    Representation::Ntt,
                )?);
            }
            gadget.push(per_window.into_boxed_slice());
        }
        Ok(gadget.into_boxed_slice())
    }
}

/// Indices of the ciphertext moduli forming RNS digit `i` when `available`
/// moduli are retained.
pub(crate) fn digit_range(i: usize, digit_size: usize, available: usize) -> Range<usize> {
    let start = i * digit_size;
    start..((i + 1) * digit_size).min(available)
}

impl Serialize for BfvParameters {
    fn to_bytes(&self) -> Vec<u8> {
        Parameters {
            degree: self.polynomial_degree as u32,
            plaintext: self.plaintext_modulus,
            moduli: self.moduli.to_vec(),
            special_moduli: self.special_moduli.to_vec(),
            variance: self.variance as u32,
            decomposition_base: self.decomposition_base as u32,
        }
        .encode_to_vec()
    }
}

impl Deserialize for BfvParameters {
    fn try_deserialize(bytes: &[u8]) -> Result<Self> {
        let params: Parameters = Message::decode(bytes).map_err(|_| Error::SerializationError)?;
        BfvParametersBuilder::new()
            .set_degree(params.degree as usize)
            .set_plaintext_modulus(params.plaintext)
            .set_moduli(&params.moduli)
            .set_special_moduli(&params.special_moduli)
            .set_variance(params.variance as usize)
            .set_decomposition_base(params.decomposition_base as usize)
            .build()
    }
    type Error = Error;
}

/// Multiplication parameters
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct MultiplicationParameters {
    pub(crate) extender: Scaler,
    pub(crate) down_scaler: Scaler,
    pub(crate) from: Arc<Context>,
    pub(crate) to: Arc<Context>,
}

impl MultiplicationParameters {
    fn new(
        from: &Arc<Context>,
        to: &Arc<Context>,
        up_self_factor: ScalingFactor,
        down_factor: ScalingFactor,
    ) -> Result<Self> {
        Ok(Self {
            extender: Scaler::new(from, to, up_self_factor)?,
            down_scaler: Scaler::new(to, from, down_factor)?,
            from: from.clone(),
            to: to.clone(),
        })
    }
}

/// Basis extension of one RNS digit into the extended context.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct DigitParameters {
    /// Indices of the ciphertext moduli forming the digit.
    pub(crate) range: Range<usize>,
    /// Context over the moduli of the digit.
    pub(crate) ctx: Arc<Context>,
    /// Centered lift from the digit context to the extended context.
    pub(crate) extender: Scaler,
}

/// Key switching parameters for ciphertexts at one level.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct KeySwitchParameters {
    pub(crate) digits: Box<[DigitParameters]>,
    /// Divide-and-round by the special modulus, from the extended context
    /// down to the context of the level.
    pub(crate) down_scaler: Scaler,
}

impl KeySwitchParameters {
    fn new(
        moduli: &[u64],
        level: usize,
        digit_size: usize,
        degree: usize,
        ctx_level: &Arc<Context>,
        ctx_extended: &Arc<Context>,
        special_modulus: &BigUint,
    ) -> Result<Self> {
        let digits = (0..(level + 1).div_ceil(digit_size))
            .map(|i| {
                let range = digit_range(i, digit_size, level + 1);
                let ctx = Arc::new(Context::new(&moduli[range.clone()], degree)?);
                let extender = Scaler::new(&ctx, ctx_extended, ScalingFactor::one())?;
                Ok(DigitParameters {
                    range,
                    ctx,
                    extender,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            digits: digits.into_boxed_slice(),
            down_scaler: Scaler::new(
                ctx_extended,
                ctx_level,
                ScalingFactor::new(&BigUint::one(), special_modulus),
            )?,
        })
    }
}
