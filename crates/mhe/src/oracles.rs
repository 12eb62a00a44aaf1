//! Statistical checks of keys and ciphertexts against a known secret.
//!
//! The checks decrypt a key with the secret and measure the residual noise.
//! They return a verdict rather than an error: an internal failure, such as
//! a key built for other parameters, is reported as an incorrect key.

use std::sync::Arc;

use fhe_math::rq::{Poly, Representation};
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{Signed, ToPrimitive, Zero};
use tracing::debug;
use zeroize::Zeroizing;

use crate::bfv::{
    BfvParameters, Ciphertext, EvaluationKey, GaloisKey, PublicKey, RelinearizationKey, SecretKey,
};
use crate::{Error, Result};

/// Summary of the centered coefficients of a noise polynomial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseStats {
    /// Log2 of the standard deviation.
    pub log2_std: f64,
    /// Log2 of the smallest absolute value.
    pub log2_min: f64,
    /// Log2 of the largest absolute value.
    pub log2_max: f64,
    /// Mean of the values.
    pub mean: f64,
}

/// Computes the statistics of `values`. Sums are exact; the conversion to
/// `f64` happens last. The logarithm of zero is `-inf`.
pub fn norm_stats(values: &[BigInt]) -> NoiseStats {
    if values.is_empty() {
        return NoiseStats {
            log2_std: f64::NEG_INFINITY,
            log2_min: f64::NEG_INFINITY,
            log2_max: f64::NEG_INFINITY,
            mean: 0.0,
        };
    }

    let n = BigInt::from(values.len());
    let mut sum = BigInt::zero();
    let mut sum_squares = BigInt::zero();
    let mut min = values[0].abs();
    let mut max = BigInt::zero();
    for v in values {
        sum += v;
        sum_squares += v * v;
        let a = v.abs();
        if a < min {
            min = a.clone();
        }
        if a > max {
            max = a;
        }
    }

    // n^2 * variance = n * sum(x^2) - sum(x)^2
    let scaled_variance = &n * &sum_squares - &sum * &sum;
    let n = n.to_f64().unwrap_or(f64::INFINITY);
    let log2_variance = log2_of(&scaled_variance) - 2.0 * n.log2();
    NoiseStats {
        log2_std: log2_variance / 2.0,
        log2_min: log2_of(&min),
        log2_max: log2_of(&max),
        mean: sum.to_f64().unwrap_or(f64::NAN) / n,
    }
}

/// Log2 of a non-negative integer, accurate for integers beyond the range of
/// `f64`.
fn log2_of(x: &BigInt) -> f64 {
    if x.sign() != Sign::Plus {
        return f64::NEG_INFINITY;
    }
    let bits = x.bits();
    if bits <= 1000 {
        x.to_f64().map_or(f64::INFINITY, f64::log2)
    } else {
        let shift = bits - 64;
        let top: BigInt = x >> shift;
        top.to_f64().map_or(f64::INFINITY, f64::log2) + shift as f64
    }
}

/// Lifts a polynomial in power basis to its centered integer coefficients.
fn centered_coefficients(p: &Poly) -> Vec<BigInt> {
    let modulus = BigInt::from(p.ctx().modulus().clone());
    let half = &modulus >> 1;
    Vec::<BigUint>::from(p)
        .into_iter()
        .map(|c| {
            let c = BigInt::from(c);
            if c > half {
                c - &modulus
            } else {
                c
            }
        })
        .collect()
}

fn stats_of(p: &Poly) -> NoiseStats {
    let mut p = Zeroizing::new(p.clone());
    if p.representation() != &Representation::PowerBasis {
        p.change_representation(Representation::PowerBasis);
    }
    norm_stats(&centered_coefficients(&p))
}

/// Statistics of the phase `c_0 + c_1 * s + ...` of `ct`, centered modulo
/// the ciphertext modulus. For an encryption of zero, this is the noise.
pub fn norm(ct: &Ciphertext, sk: &SecretKey) -> Result<NoiseStats> {
    let phase = sk.phase(ct)?;
    Ok(stats_of(&phase))
}

/// Bound on the log2 of the standard deviation of the sum of the fresh
/// errors of `parties` parties over `windows` key entries, each with
/// standard deviation `sigma` and truncated to `6 * sigma`.
pub fn log2_bound(parties: usize, sigma: f64, windows: usize) -> f64 {
    (parties.max(1) as f64 * windows.max(1) as f64 * 6.0 * sigma).log2()
}

/// Whether `b + a * s` is below `2^log2_bound` in standard deviation.
pub fn public_key_is_correct(pk: &PublicKey, sk: &SecretKey, log2_bound: f64) -> bool {
    let residual = || -> Result<NoiseStats> {
        if pk.par != *sk.parameters() {
            return Err(Error::DefaultError(
                "Incompatible BFV parameters".to_string(),
            ));
        }
        let s = sk.poly_in(pk.b().ctx())?;
        let mut e = pk.b().clone();
        e += &(pk.a() * s.as_ref());
        Ok(stats_of(&e))
    };
    verdict("public key", residual(), log2_bound)
}

/// Whether `evk` switches from `s_in`, in NTT representation over the
/// extended context, to `sk_out`: for every window `j`, the sum over the
/// digits `i` of `b_ij + a_ij * s_out - P * 2^(wj) * g_i * s_in` must be
/// below `2^log2_bound` in standard deviation.
pub fn evaluation_key_is_correct(
    evk: &EvaluationKey,
    s_in: &Poly,
    sk_out: &SecretKey,
    log2_bound: f64,
) -> bool {
    let par = evk.par.clone();
    let stats = || -> Result<Vec<NoiseStats>> {
        if par != *sk_out.parameters() {
            return Err(Error::DefaultError(
                "Incompatible BFV parameters".to_string(),
            ));
        }
        let s_out = sk_out.poly_extended()?;
        residuals(&par, evk, s_in, &s_out)
    };
    match stats() {
        Ok(stats) => stats
            .into_iter()
            .enumerate()
            .all(|(j, s)| verdict(&format!("evaluation key window {j}"), Ok(s), log2_bound)),
        Err(e) => verdict("evaluation key", Err(e), log2_bound),
    }
}

fn residuals(
    par: &Arc<BfvParameters>,
    evk: &EvaluationKey,
    s_in: &Poly,
    s_out: &Poly,
) -> Result<Vec<NoiseStats>> {
    if evk.digits() != par.gadget.len() || evk.windows() != par.pow2_windows() {
        return Err(Error::share_dimension_mismatch(
            (par.gadget.len(), par.pow2_windows()),
            (evk.digits(), evk.windows()),
        ));
    }
    let ctx = par.ctx_extended();
    (0..evk.windows())
        .map(|j| {
            let mut e = Zeroizing::new(Poly::zero(ctx, Representation::Ntt));
            for (i, gadget_row) in par.gadget.iter().enumerate() {
                let [b, a] = evk
                    .get(i, j)
                    .ok_or_else(|| Error::DefaultError(format!("Missing key entry ({i}, {j})")))?;
                *e.as_mut() += b;
                *e.as_mut() += &(a * s_out);
                *e.as_mut() -= &(&gadget_row[j] * s_in);
            }
            Ok(stats_of(&e))
        })
        .collect()
}

/// Whether `rk` is a relinearization key for `sk`.
pub fn relinearization_key_is_correct(
    rk: &RelinearizationKey,
    sk: &SecretKey,
    log2_bound: f64,
) -> bool {
    match sk.poly_squared_extended() {
        Ok(s2) => evaluation_key_is_correct(rk.evaluation_key(), &s2, sk, log2_bound),
        Err(e) => verdict("relinearization key", Err(e), log2_bound),
    }
}

/// Whether `gk` is a Galois key for `sk` and its Galois element.
pub fn galois_key_is_correct(gk: &GaloisKey, sk: &SecretKey, log2_bound: f64) -> bool {
    match sk.poly_substituted_extended(gk.element()) {
        Ok(s_sub) => evaluation_key_is_correct(gk.evaluation_key(), &s_sub, sk, log2_bound),
        Err(e) => verdict("Galois key", Err(e), log2_bound),
    }
}

fn verdict(what: &str, stats: Result<NoiseStats>, log2_bound: f64) -> bool {
    match stats {
        Ok(stats) => {
            debug!(
                what,
                log2_std = stats.log2_std,
                log2_max = stats.log2_max,
                log2_bound,
                "measured residual noise"
            );
            stats.log2_std < log2_bound
        }
        Err(e) => {
            debug!(what, error = %e, "cannot measure residual noise");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bfv::{BfvParameters, Encoding, Plaintext};
    use crate::mbfv::{AggregateIter, CommonRandomPoly, PublicKeyShare};
    use num_bigint::BigInt;
    use rand::thread_rng;
    use std::error::Error as StdError;

    #[test]
    fn stats_of_known_vectors() {
        let v = [1, -1, 1, -1].map(BigInt::from);
        let stats = norm_stats(&v);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.log2_std, 0.0);
        assert_eq!(stats.log2_min, 0.0);
        assert_eq!(stats.log2_max, 0.0);

        let v = [0, 4, 8, -4].map(BigInt::from);
        let stats = norm_stats(&v);
        assert_eq!(stats.mean, 2.0);
        // variance = (4 + 4 + 36 + 36) / 4 = 20
        assert!((stats.log2_std - 20f64.log2() / 2.0).abs() < 1e-12);
        assert_eq!(stats.log2_min, f64::NEG_INFINITY);
        assert_eq!(stats.log2_max, 3.0);

        let big = BigInt::from(1u8) << 2000u32;
        let stats = norm_stats(&[big.clone(), -big]);
        assert!((stats.log2_std - 2000.0).abs() < 1e-9);
        assert!((stats.log2_max - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn collective_public_key() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(2, 16);
        let parties = 11;
        let sk_shares = (0..parties)
            .map(|_| SecretKey::random(&par, &mut rng))
            .collect::<Vec<_>>();
        let crp = CommonRandomPoly::new(&par, &mut rng)?;
        let pk: PublicKey = sk_shares
            .iter()
            .map(|sk| PublicKeyShare::new(sk, crp.clone(), &mut rng))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .aggregate()?;
        let coeffs = (0..par.degree())
            .map(|i| sk_shares.iter().map(|sk| sk.coeffs[i]).sum())
            .collect();
        let sk = SecretKey::new(coeffs, &par);

        let sigma = (par.variance() as f64).sqrt();
        assert!(public_key_is_correct(&pk, &sk, log2_bound(parties, sigma, 1)));
        assert!(!public_key_is_correct(&pk, &sk, 1.0));
        let other = SecretKey::random(&par, &mut rng);
        assert!(!public_key_is_correct(&pk, &other, log2_bound(parties, sigma, 1)));
        Ok(())
    }

    #[test]
    fn single_party_keys() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(3, 16);
        let sk = SecretKey::random(&par, &mut rng);
        let other = SecretKey::random(&par, &mut rng);
        let sigma = (par.variance() as f64).sqrt();
        let bound = log2_bound(1, sigma, par.gadget.len());

        let rk = RelinearizationKey::new(&sk, &mut rng)?;
        assert!(relinearization_key_is_correct(&rk, &sk, bound));
        assert!(!relinearization_key_is_correct(&rk, &other, bound));

        let gk = GaloisKey::new(&sk, 3, &mut rng)?;
        assert!(galois_key_is_correct(&gk, &sk, bound));
        let wrong = GaloisKey::from_evaluation_key(5, gk.evaluation_key().clone())?;
        assert!(!galois_key_is_correct(&wrong, &sk, bound));
        Ok(())
    }

    #[test]
    fn noise_of_fresh_encryptions() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(2, 16);
        let sk = SecretKey::random(&par, &mut rng);
        let zero = Plaintext::zero(Encoding::poly(), &par)?;
        let ct = sk.try_encrypt(&zero, &mut rng)?;
        let stats = norm(&ct, &sk)?;
        // Centered binomial samples lie in [-2 * variance, 2 * variance].
        assert!(stats.log2_max <= ((2 * par.variance()) as f64).log2());
        assert!(stats.log2_std < 4.0);
        Ok(())
    }
}
