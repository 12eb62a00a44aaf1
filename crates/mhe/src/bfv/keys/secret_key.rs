//! Secret keys for the BFV encryption scheme

use crate::bfv::{BfvParameters, Ciphertext, Plaintext};
use crate::{Error, Result};
use fhe_math::rq::{traits::TryConvertFrom, Context, Poly, Representation, SubstitutionExponent};
use fhe_traits::FheParametrized;
use fhe_util::sample_vec_cbd;
use num_bigint::BigUint;
use rand::{thread_rng, CryptoRng, Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Secret key for the BFV encryption scheme.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SecretKey {
    /// The BFV parameters
    pub(crate) par: Arc<BfvParameters>,
    /// The secret key coefficients
    pub coeffs: Box<[i64]>,
}

impl Zeroize for SecretKey {
    fn zeroize(&mut self) {
        self.coeffs.zeroize();
    }
}

impl ZeroizeOnDrop for SecretKey {}

impl SecretKey {
    /// Generate a random [`SecretKey`].
    pub fn random<R: RngCore + CryptoRng>(par: &Arc<BfvParameters>, rng: &mut R) -> Self {
        let s_coefficients = sample_vec_cbd(par.degree(), par.variance, rng)
            .expect("the variance is validated when building the parameters");
        Self::new(s_coefficients, par)
    }

    /// Generate a [`SecretKey`] from its coefficients.
    pub fn new(coeffs: Vec<i64>, par: &Arc<BfvParameters>) -> Self {
        Self {
            par: par.clone(),
            coeffs: coeffs.into_boxed_slice(),
        }
    }

    /// Parameters of the key.
    pub fn parameters(&self) -> &Arc<BfvParameters> {
        &self.par
    }

    /// The key as a polynomial in NTT representation over `ctx`.
    pub(crate) fn poly_in(&self, ctx: &Arc<Context>) -> Result<Zeroizing<Poly>> {
        let mut s = Zeroizing::new(Poly::try_convert_from(
            self.coeffs.as_ref(),
            ctx,
            false,
            Representation::PowerBasis,
        )?);
        s.change_representation(Representation::Ntt);
        Ok(s)
    }

    /// The key over the ciphertext moduli of `level`.
    pub(crate) fn poly_at_level(&self, level: usize) -> Result<Zeroizing<Poly>> {
        self.poly_in(self.par.ctx_at_level(level)?)
    }

    /// The key over the ciphertext and special moduli.
    pub(crate) fn poly_extended(&self) -> Result<Zeroizing<Poly>> {
        self.poly_in(self.par.ctx_extended())
    }

    /// The square of the key over the ciphertext and special moduli.
    pub(crate) fn poly_squared_extended(&self) -> Result<Zeroizing<Poly>> {
        let s = self.poly_extended()?;
        Ok(Zeroizing::new(s.as_ref() * s.as_ref()))
    }

    /// The image of the key by the automorphism `x -> x^galois_element`, over
    /// the ciphertext and special moduli.
    pub(crate) fn poly_substituted_extended(
        &self,
        galois_element: usize,
    ) -> Result<Zeroizing<Poly>> {
        let exponent = SubstitutionExponent::new(self.par.ctx_extended(), galois_element)?;
        let s = self.poly_extended()?;
        Ok(Zeroizing::new(s.substitute(&exponent)?))
    }

    /// Computes `c_0 + c_1 * s + ... + c_d * s^d` in power basis.
    pub(crate) fn phase(&self, ct: &Ciphertext) -> Result<Zeroizing<Poly>> {
        if self.par != ct.par {
            return Err(Error::DefaultError(
                "Incompatible BFV parameters".to_string(),
            ));
        }
        if ct.c.is_empty() {
            return Err(Error::empty_operand("ciphertext"));
        }

        let s = self.poly_in(ct.c[0].ctx())?;
        let mut si = s.clone();

        let to_ntt = |p: &Poly| {
            let mut p = Zeroizing::new(p.clone());
            p.disallow_variable_time_computations();
            if p.representation() != &Representation::Ntt {
                p.change_representation(Representation::Ntt);
            }
            p
        };

        let mut c = to_ntt(&ct.c[0]);
        for ci in ct.c.iter().skip(1) {
            let mut cis = to_ntt(ci);
            *cis.as_mut() *= si.as_ref();
            *c.as_mut() += &cis;
            *si.as_mut() *= s.as_ref();
        }
        c.change_representation(Representation::PowerBasis);
        Ok(c)
    }

    /// Measure the noise in a [`Ciphertext`], in bits.
    pub fn measure_noise(&self, ct: &Ciphertext) -> Result<usize> {
        let plaintext = Zeroizing::new(self.try_decrypt(ct)?);
        let mut m = Zeroizing::new(plaintext.to_poly().clone());
        m.change_representation(Representation::PowerBasis);

        let mut c = self.phase(ct)?;
        *c.as_mut() -= m.as_ref();

        let ciphertext_modulus = ct.c[0].ctx().modulus();
        let mut noise = 0usize;
        for coeff in Vec::<BigUint>::from(c.as_ref()) {
            noise = std::cmp::max(
                noise,
                std::cmp::min(coeff.bits(), (ciphertext_modulus - &coeff).bits()) as usize,
            )
        }

        Ok(noise)
    }

    /// Encrypt a polynomial using a provided seed for deterministic generation
    /// of the random polynomial `a`.
    pub(crate) fn encrypt_poly_with_seed<R: RngCore + CryptoRng>(
        &self,
        p: &Poly,
        seed: <ChaCha8Rng as SeedableRng>::Seed,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        if p.representation() != &Representation::Ntt {
            return Err(Error::MathError(fhe_math::Error::IncorrectRepresentation(
                p.representation().clone(),
                Representation::Ntt,
            )));
        }

        let level = self.par.level_of_ctx(p.ctx())?;
        let s = self.poly_in(p.ctx())?;

        let a = Poly::random_from_seed(p.ctx(), Representation::Ntt, seed);
        let a_s = Zeroizing::new(&a * s.as_ref());

        let mut b = Poly::small(p.ctx(), Representation::Ntt, self.par.variance, rng)
            .map_err(Error::MathError)?;
        b -= &a_s;
        b += p;

        Ok(Ciphertext {
            par: self.par.clone(),
            c: vec![b, a],
            level,
            scale: 1.0,
        })
    }

    /// Encrypt a plaintext.
    pub fn try_encrypt<R: RngCore + CryptoRng>(
        &self,
        pt: &Plaintext,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        let mut seed = <ChaCha8Rng as SeedableRng>::Seed::default();
        thread_rng().fill(&mut seed);
        self.try_encrypt_with_seed(pt, seed, rng)
    }

    /// Encrypt a plaintext using a provided seed for deterministic generation
    /// of random polynomials
    pub fn try_encrypt_with_seed<R: RngCore + CryptoRng>(
        &self,
        pt: &Plaintext,
        seed: <ChaCha8Rng as SeedableRng>::Seed,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        if self.par != pt.par {
            return Err(Error::DefaultError(
                "Incompatible BFV parameters".to_string(),
            ));
        }
        self.encrypt_poly_with_seed(pt.to_poly(), seed, rng)
    }

    /// Decrypt a ciphertext of any degree.
    pub fn try_decrypt(&self, ct: &Ciphertext) -> Result<Plaintext> {
        let c = self.phase(ct)?;
        Plaintext::from_phase(&c, ct.level, &self.par)
    }
}

impl FheParametrized for SecretKey {
    type Parameters = BfvParameters;
}
