//! Smudging noise for the collective key switching protocols.
//!
//! A key switching share is revealed to the other parties, so it carries a
//! noise term large enough to statistically hide the noise of the ciphertext
//! being switched. With `2^log2_noise` bounding the ciphertext noise and a
//! statistical security parameter `lambda`, a standard deviation of
//! `2^(lambda + log2_noise)` gives a statistical distance of about
//! `2^-lambda`.

use crate::{Error, Result};
use fhe_math::rq::{traits::TryConvertFrom, Context, Poly, Representation};
use rand::{CryptoRng, RngCore};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zeroize::Zeroizing;

/// Largest bound on the smudging noise, so that samples fit in an `i64`.
const MAX_BOUND: f64 = 4611686018427387904.0; // 2^62

/// Configuration of the truncated discrete Gaussian used as smudging noise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmudgingConfig {
    sigma: f64,
    bound: f64,
}

impl Default for SmudgingConfig {
    fn default() -> Self {
        let sigma = (1u64 << 30) as f64;
        Self {
            sigma,
            bound: 6.0 * sigma,
        }
    }
}

impl SmudgingConfig {
    /// A configuration with standard deviation `sigma`, truncated to
    /// `[-bound, bound]`.
    pub fn new(sigma: f64, bound: f64) -> Result<Self> {
        let config = Self { sigma, bound };
        config.validate()?;
        Ok(config)
    }

    /// The configuration for a statistical security parameter and a bound
    /// `2^log2_noise` on the noise of the switched ciphertexts.
    pub fn derive(statistical_security: u32, log2_noise: f64) -> Result<Self> {
        let sigma = (statistical_security as f64 + log2_noise).exp2();
        Self::new(sigma, 6.0 * sigma)
    }

    /// Checks that `0 < sigma <= bound < 2^62`.
    pub fn validate(&self) -> Result<()> {
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(Error::UnspecifiedInput(format!(
                "Invalid smudging standard deviation {}",
                self.sigma
            )));
        }
        if !(self.bound >= self.sigma && self.bound < MAX_BOUND) {
            return Err(Error::UnspecifiedInput(format!(
                "Invalid smudging bound {}: expected a value in [{}, 2^62)",
                self.bound, self.sigma
            )));
        }
        Ok(())
    }

    /// Standard deviation of the noise.
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Bound on the absolute value of the noise.
    pub fn bound(&self) -> f64 {
        self.bound
    }

    /// Samples `n` values from the truncated Gaussian.
    pub fn sample_vec<R: RngCore + CryptoRng>(&self, n: usize, rng: &mut R) -> Result<Vec<i64>> {
        self.validate()?;
        let normal = Normal::new(0.0, self.sigma)
            .map_err(|e| Error::DefaultError(format!("Smudging distribution: {e}")))?;
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            let x = normal.sample(rng).round();
            if x.abs() <= self.bound {
                out.push(x as i64);
            }
        }
        Ok(out)
    }

    /// Samples a smudging polynomial of `degree` coefficients over `ctx`, in
    /// NTT representation.
    pub(crate) fn sample_poly<R: RngCore + CryptoRng>(
        &self,
        ctx: &Arc<Context>,
        degree: usize,
        rng: &mut R,
    ) -> Result<Poly> {
        let coeffs = Zeroizing::new(self.sample_vec(degree, rng)?);
        let mut p = Poly::try_convert_from(
            coeffs.as_slice(),
            ctx,
            false,
            Representation::PowerBasis,
        )?;
        p.change_representation(Representation::Ntt);
        Ok(p)
    }
}
