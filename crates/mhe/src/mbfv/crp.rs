use std::sync::Arc;

use crate::bfv::BfvParameters;
use crate::Result;
use fhe_math::rq::{Poly, Representation};
use fhe_traits::{DeserializeWithContext, Serialize};
use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A polynomial sampled from a random _common reference string_.
///
/// Every party derives the same polynomial from a shared seed, so the
/// polynomial itself never needs to be exchanged.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CommonRandomPoly {
    pub(crate) poly: Poly,
}

impl CommonRandomPoly {
    /// Generate a new random CRP at the maximum level.
    pub fn new<R: RngCore + CryptoRng>(par: &Arc<BfvParameters>, rng: &mut R) -> Result<Self> {
        Self::new_leveled(par, par.max_level(), rng)
    }

    /// Generate a new CRP at the maximum level from a shared deterministic
    /// seed.
    pub fn new_deterministic(
        par: &Arc<BfvParameters>,
        seed: <ChaCha8Rng as SeedableRng>::Seed,
    ) -> Result<Self> {
        Self::new_leveled_deterministic(par, par.max_level(), seed)
    }

    /// Generate a new random leveled CRP.
    pub fn new_leveled<R: RngCore + CryptoRng>(
        par: &Arc<BfvParameters>,
        level: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let ctx = par.ctx_at_level(level)?;
        let poly = Poly::random(ctx, Representation::Ntt, rng);
        Ok(Self { poly })
    }

    /// Generate a new deterministic leveled CRP.
    pub fn new_leveled_deterministic(
        par: &Arc<BfvParameters>,
        level: usize,
        seed: <ChaCha8Rng as SeedableRng>::Seed,
    ) -> Result<Self> {
        let ctx = par.ctx_at_level(level)?;
        let poly = Poly::random_from_seed(ctx, Representation::Ntt, seed);
        Ok(Self { poly })
    }

    /// Generate a new deterministic CRP over the ciphertext and special
    /// moduli.
    pub fn new_extended_deterministic(
        par: &Arc<BfvParameters>,
        seed: <ChaCha8Rng as SeedableRng>::Seed,
    ) -> Result<Self> {
        let poly = Poly::random_from_seed(par.ctx_extended(), Representation::Ntt, seed);
        Ok(Self { poly })
    }

    /// The polynomial, in NTT representation.
    pub fn poly(&self) -> &Poly {
        &self.poly
    }

    /// Deserialize a CRP sampled at `level`.
    pub fn deserialize(bytes: &[u8], par: &Arc<BfvParameters>, level: usize) -> Result<Self> {
        let poly = Poly::from_bytes(bytes, par.ctx_at_level(level)?)?;
        Ok(Self { poly })
    }
}

impl Serialize for CommonRandomPoly {
    fn to_bytes(&self) -> Vec<u8> {
        self.poly.to_bytes()
    }
}

/// The random polynomials `a_ij` of an evaluation key, indexed by RNS digit
/// and power-of-2 window, over the ciphertext and special moduli.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct EvaluationKeyCrp {
    pub(crate) par: Arc<BfvParameters>,
    pub(crate) value: Vec<Vec<Poly>>,
}

/// CRP of the relinearization key generation protocol.
pub type RelinKeyCrp = EvaluationKeyCrp;

/// CRP of the Galois key generation protocol.
pub type GaloisKeyCrp = EvaluationKeyCrp;

impl EvaluationKeyCrp {
    /// Generate a new random CRP matrix.
    pub fn new<R: RngCore + CryptoRng>(par: &Arc<BfvParameters>, rng: &mut R) -> Result<Self> {
        let mut seed = <ChaCha8Rng as SeedableRng>::Seed::default();
        rng.fill_bytes(&mut seed);
        Self::new_deterministic(par, seed)
    }

    /// Generate a new CRP matrix from a shared deterministic seed.
    pub fn new_deterministic(
        par: &Arc<BfvParameters>,
        seed: <ChaCha8Rng as SeedableRng>::Seed,
    ) -> Result<Self> {
        let mut rng = ChaCha8Rng::from_seed(seed);
        let ctx = par.ctx_extended();
        let value = (0..par.gadget.len())
            .map(|_| {
                (0..par.pow2_windows())
                    .map(|_| Poly::random(ctx, Representation::Ntt, &mut rng))
                    .collect()
            })
            .collect();
        Ok(Self {
            par: par.clone(),
            value,
        })
    }

    /// Number of RNS digits.
    pub fn digits(&self) -> usize {
        self.value.len()
    }

    /// Number of power-of-2 windows per digit.
    pub fn windows(&self) -> usize {
        self.value.first().map_or(0, |row| row.len())
    }

    /// The polynomial of digit `i` and window `j`.
    pub fn get(&self, i: usize, j: usize) -> Option<&Poly> {
        self.value.get(i).and_then(|row| row.get(j))
    }
}
