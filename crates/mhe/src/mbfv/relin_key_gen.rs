//! Collective relinearization key generation, in two rounds.
//!
//! Round 1 shares encrypt an ephemeral key `u_i` and the gadget multiples of
//! `s_i`; round 2 shares re-encrypt the aggregated round 1 under `s_i` and
//! `u_i - s_i`. The sum of the round 2 shares, with the second component of
//! the aggregated round 1, is a key switching key from `s^2` to `s` for the
//! collective secret `s = sum(s_i)`.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::bfv::{BfvParameters, EvaluationKey, RelinearizationKey, SecretKey};
use crate::proto::bfv::RelinKeyShare as RelinKeyShareProto;
use crate::{Error, Result};
use fhe_math::rq::{Poly, Representation};
use fhe_traits::{DeserializeWithContext, Serialize};
use itertools::{izip, Itertools};
use prost::Message;
use rand::{CryptoRng, RngCore};
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use super::{Aggregate, RelinKeyCrp, ShareAccumulator};

/// A round of the relinearization key generation protocol.
pub trait KeyGenRound {
    /// Number of the round, starting at 1.
    const ROUND: u32;
}

/// Marker for the shares of the first round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round1;

/// Marker for the shares of the second round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round2;

impl KeyGenRound for Round1 {
    const ROUND: u32 = 1;
}

impl KeyGenRound for Round2 {
    const ROUND: u32 = 2;
}

/// A share of one round of the relinearization key generation protocol:
/// pairs of polynomials indexed by RNS digit and power-of-2 window, over the
/// ciphertext and special moduli.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelinKeyShare<R: KeyGenRound> {
    pub(crate) par: Arc<BfvParameters>,
    pub(crate) value: Vec<Vec<[Poly; 2]>>,
    round: PhantomData<R>,
}

impl<R: KeyGenRound> RelinKeyShare<R> {
    /// A zero share.
    pub fn allocate(par: &Arc<BfvParameters>) -> Self {
        let ctx = par.ctx_extended();
        let value = (0..par.gadget.len())
            .map(|_| {
                (0..par.pow2_windows())
                    .map(|_| {
                        [
                            Poly::zero(ctx, Representation::Ntt),
                            Poly::zero(ctx, Representation::Ntt),
                        ]
                    })
                    .collect()
            })
            .collect();
        Self {
            par: par.clone(),
            value,
            round: PhantomData,
        }
    }

    /// Number of RNS digits of the share.
    pub fn digits(&self) -> usize {
        self.value.len()
    }

    /// Number of power-of-2 windows per digit.
    pub fn windows(&self) -> usize {
        self.value.first().map_or(0, |row| row.len())
    }

    fn shape(&self) -> (usize, usize) {
        (self.digits(), self.windows())
    }

    /// Deserialize a share of this round.
    pub fn deserialize(bytes: &[u8], par: &Arc<BfvParameters>) -> Result<Self> {
        let proto: RelinKeyShareProto =
            Message::decode(bytes).map_err(|_| Error::SerializationError)?;
        let (digits, windows) = (proto.digits as usize, proto.windows as usize);
        if proto.round != R::ROUND
            || digits != par.gadget.len()
            || windows != par.pow2_windows()
            || proto.h0.len() != digits * windows
            || proto.h1.len() != digits * windows
        {
            return Err(Error::SerializationError);
        }
        let ctx = par.ctx_extended();
        let mut entries = izip!(&proto.h0, &proto.h1)
            .map(|(h0, h1)| Ok([Poly::from_bytes(h0, ctx)?, Poly::from_bytes(h1, ctx)?]))
            .collect::<Result<Vec<_>>>()?
            .into_iter();
        let value = (0..digits)
            .map(|_| entries.by_ref().take(windows).collect_vec())
            .collect();
        Ok(Self {
            par: par.clone(),
            value,
            round: PhantomData,
        })
    }
}

impl<R: KeyGenRound> ShareAccumulator for RelinKeyShare<R> {
    fn aggregate_share(&mut self, share: &Self) -> Result<()> {
        if self.par != share.par {
            return Err(Error::Aggregation("incompatible parameters".to_string()));
        }
        if self.shape() != share.shape() {
            return Err(Error::share_dimension_mismatch(self.shape(), share.shape()));
        }
        for (acc, sh) in self.value.iter_mut().flatten().zip(share.value.iter().flatten()) {
            acc[0] += &sh[0];
            acc[1] += &sh[1];
        }
        Ok(())
    }
}

impl<R: KeyGenRound> Serialize for RelinKeyShare<R> {
    fn to_bytes(&self) -> Vec<u8> {
        let mut proto = RelinKeyShareProto {
            digits: self.digits() as u32,
            windows: self.windows() as u32,
            round: R::ROUND,
            ..Default::default()
        };
        for [h0, h1] in self.value.iter().flatten() {
            proto.h0.push(h0.to_bytes());
            proto.h1.push(h1.to_bytes());
        }
        proto.encode_to_vec()
    }
}

/// A party of the relinearization key generation protocol. It owns the
/// party's ephemeral key, which is zeroized when the generator is dropped.
pub struct RelinKeyGenerator {
    par: Arc<BfvParameters>,
    s: Zeroizing<Poly>,
    u: Zeroizing<Poly>,
}

impl std::fmt::Debug for RelinKeyGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelinKeyGenerator")
            .field("par", &self.par)
            .finish_non_exhaustive()
    }
}

impl RelinKeyGenerator {
    /// Starts a session for the secret key share `sk_share`, sampling a new
    /// ephemeral key.
    pub fn new<R: RngCore + CryptoRng>(sk_share: &SecretKey, rng: &mut R) -> Result<Self> {
        let par = sk_share.parameters().clone();
        let s = sk_share.poly_extended()?;
        let u = SecretKey::random(&par, rng).poly_extended()?;
        Ok(Self { par, s, u })
    }

    fn small(&self, rng: &mut (impl RngCore + CryptoRng)) -> Result<Zeroizing<Poly>> {
        Ok(Zeroizing::new(Poly::small(
            self.par.ctx_extended(),
            Representation::Ntt,
            self.par.variance,
            rng,
        )?))
    }

    /// Computes the round 1 share `(-u_i * a + P * 2^(wj) * g_i * s_i + e,
    /// s_i * a + e')` for every digit `i` and window `j`.
    pub fn round_1<R: RngCore + CryptoRng>(
        &self,
        crp: &RelinKeyCrp,
        rng: &mut R,
    ) -> Result<RelinKeyShare<Round1>> {
        if crp.par != self.par {
            return Err(Error::DefaultError(
                "Incompatible BFV parameters".to_string(),
            ));
        }
        let value = izip!(&crp.value, self.par.gadget.iter())
            .map(|(crp_row, gadget_row)| {
                izip!(crp_row, gadget_row.iter())
                    .map(|(a, g)| {
                        let mut h0 = -(a * self.u.as_ref());
                        h0.disallow_variable_time_computations();
                        h0 += &(g * self.s.as_ref());
                        h0 += self.small(rng)?.as_ref();

                        let mut h1 = a * self.s.as_ref();
                        h1.disallow_variable_time_computations();
                        h1 += self.small(rng)?.as_ref();
                        Ok([h0, h1])
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(digits = value.len(), "generated relinearization key round 1 share");
        Ok(RelinKeyShare {
            par: self.par.clone(),
            value,
            round: PhantomData,
        })
    }

    /// Computes the round 2 share `(s_i * r1_0 + e, (u_i - s_i) * r1_1 + e')`
    /// from the aggregated round 1 shares `r1`.
    pub fn round_2<R: RngCore + CryptoRng>(
        &self,
        r1: &Arc<RelinKeyShare<Round1>>,
        rng: &mut R,
    ) -> Result<RelinKeyRound2Share> {
        if r1.par != self.par {
            return Err(Error::DefaultError(
                "Incompatible BFV parameters".to_string(),
            ));
        }
        let u_minus_s = Zeroizing::new(self.u.as_ref() - self.s.as_ref());
        let value = r1
            .value
            .iter()
            .map(|row| {
                row.iter()
                    .map(|[r1_0, r1_1]| {
                        let mut h0 = r1_0 * self.s.as_ref();
                        h0.disallow_variable_time_computations();
                        h0 += self.small(rng)?.as_ref();

                        let mut h1 = r1_1 * u_minus_s.as_ref();
                        h1.disallow_variable_time_computations();
                        h1 += self.small(rng)?.as_ref();
                        Ok([h0, h1])
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(digits = value.len(), "generated relinearization key round 2 share");
        Ok(RelinKeyRound2Share {
            r1: r1.clone(),
            share: RelinKeyShare {
                par: self.par.clone(),
                value,
                round: PhantomData,
            },
        })
    }
}

/// A round 2 share, bound to the aggregated round 1 it was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelinKeyRound2Share {
    pub(crate) r1: Arc<RelinKeyShare<Round1>>,
    pub(crate) share: RelinKeyShare<Round2>,
}

impl RelinKeyRound2Share {
    /// A zero round 2 share for the session of `r1`.
    pub fn allocate(r1: &Arc<RelinKeyShare<Round1>>) -> Self {
        Self {
            r1: r1.clone(),
            share: RelinKeyShare::allocate(&r1.par),
        }
    }

    /// The share itself.
    pub fn share(&self) -> &RelinKeyShare<Round2> {
        &self.share
    }

    /// Deserialize a round 2 share computed from `r1`.
    pub fn deserialize(bytes: &[u8], r1: &Arc<RelinKeyShare<Round1>>) -> Result<Self> {
        Ok(Self {
            r1: r1.clone(),
            share: RelinKeyShare::deserialize(bytes, &r1.par)?,
        })
    }
}

impl ShareAccumulator for RelinKeyRound2Share {
    fn aggregate_share(&mut self, share: &Self) -> Result<()> {
        if !Arc::ptr_eq(&self.r1, &share.r1) && self.r1 != share.r1 {
            return Err(Error::Aggregation(
                "share was computed from another round 1 aggregate".to_string(),
            ));
        }
        self.share.aggregate_share(&share.share)
    }
}

impl Serialize for RelinKeyRound2Share {
    fn to_bytes(&self) -> Vec<u8> {
        self.share.to_bytes()
    }
}

impl Aggregate<RelinKeyRound2Share> for RelinearizationKey {
    #[instrument(skip_all)]
    fn from_shares<T>(iter: T) -> Result<Self>
    where
        T: IntoIterator<Item = RelinKeyRound2Share>,
    {
        let mut shares = iter.into_iter();
        let mut acc = shares.next().ok_or(Error::TooFewValues(0, 1))?;
        let mut count = 1usize;
        for sh in shares {
            acc.aggregate_share(&sh)?;
            count += 1;
        }
        debug!(shares = count, "aggregated relinearization key shares");

        let value = izip!(acc.share.value, acc.r1.value.iter())
            .map(|(r2_row, r1_row)| {
                izip!(r2_row, r1_row)
                    .map(|([mut b, r2_1], [_, r1_1])| {
                        b += &r2_1;
                        let mut a = r1_1.clone();
                        b.disallow_variable_time_computations();
                        a.disallow_variable_time_computations();
                        [b, a]
                    })
                    .collect_vec()
            })
            .collect_vec();
        let ksk = EvaluationKey::from_entries(&acc.share.par, value)?;
        Ok(RelinearizationKey::from_evaluation_key(ksk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bfv::{BfvParameters, Ciphertext, Encoding, EvaluationKeySet, Evaluator, Plaintext};
    use crate::mbfv::AggregateIter;
    use rand::thread_rng;
    use std::error::Error as StdError;

    fn collective_secret(par: &Arc<BfvParameters>, shares: &[SecretKey]) -> SecretKey {
        let coeffs = (0..par.degree())
            .map(|i| shares.iter().map(|sk| sk.coeffs[i]).sum())
            .collect();
        SecretKey::new(coeffs, par)
    }

    #[test]
    fn relinearizes_under_collective_key() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(3, 16);
        let crp = RelinKeyCrp::new(&par, &mut rng)?;

        let sk_shares = (0..3)
            .map(|_| SecretKey::random(&par, &mut rng))
            .collect_vec();
        let generators = sk_shares
            .iter()
            .map(|sk| RelinKeyGenerator::new(sk, &mut rng))
            .collect::<Result<Vec<_>>>()?;

        let r1: RelinKeyShare<Round1> = generators
            .iter()
            .map(|g| g.round_1(&crp, &mut rng))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .aggregate()?;
        let r1 = Arc::new(r1);
        let rk: RelinearizationKey = generators
            .iter()
            .map(|g| g.round_2(&r1, &mut rng))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .aggregate()?;
        drop(generators);

        let sk = collective_secret(&par, &sk_shares);
        let ev = Evaluator::new(&par, EvaluationKeySet::new().with_relinearization_key(rk))?;
        let a = par.plaintext.random_vec(par.degree(), &mut rng);
        let b = par.plaintext.random_vec(par.degree(), &mut rng);
        let ct_a: Ciphertext =
            sk.try_encrypt(&Plaintext::try_encode(&a, Encoding::simd(), &par)?, &mut rng)?;
        let ct_b: Ciphertext =
            sk.try_encrypt(&Plaintext::try_encode(&b, Encoding::simd(), &par)?, &mut rng)?;
        let product = ev.mul_relin(&ct_a, &ct_b)?;
        assert_eq!(product.degree(), 1);

        let mut expected = a.clone();
        par.plaintext.mul_vec(&mut expected, &b);
        let decrypted = sk.try_decrypt(&product)?.try_decode(Encoding::simd())?;
        assert_eq!(decrypted, expected);
        Ok(())
    }

    #[test]
    fn aggregation_errors() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(2, 16);
        let other = BfvParameters::default_arc(3, 16);

        assert_eq!(
            RelinearizationKey::from_shares(Vec::<RelinKeyRound2Share>::new()).err(),
            Some(Error::TooFewValues(0, 1))
        );

        let mut acc = RelinKeyShare::<Round1>::allocate(&par);
        let foreign = RelinKeyShare::<Round1>::allocate(&other);
        assert!(matches!(
            acc.aggregate_share(&foreign),
            Err(Error::Aggregation(_))
        ));
        let mut truncated = RelinKeyShare::<Round1>::allocate(&par);
        truncated.value.pop();
        assert_eq!(
            acc.aggregate_share(&truncated).err(),
            Some(Error::share_dimension_mismatch((2, 1), (1, 1)))
        );

        let sk = SecretKey::random(&par, &mut rng);
        let generator = RelinKeyGenerator::new(&sk, &mut rng)?;
        let crp = RelinKeyCrp::new(&par, &mut rng)?;
        let r1 = Arc::new(generator.round_1(&crp, &mut rng)?);
        let r1_other = Arc::new(generator.round_1(&crp, &mut rng)?);
        let mut acc = RelinKeyRound2Share::allocate(&r1);
        let share = generator.round_2(&r1_other, &mut rng)?;
        assert!(matches!(
            acc.aggregate_share(&share),
            Err(Error::Aggregation(_))
        ));
        Ok(())
    }

    #[test]
    fn serialize() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(2, 16);
        let sk = SecretKey::random(&par, &mut rng);
        let generator = RelinKeyGenerator::new(&sk, &mut rng)?;
        let crp = RelinKeyCrp::new(&par, &mut rng)?;

        let share = generator.round_1(&crp, &mut rng)?;
        let bytes = share.to_bytes();
        let decoded = RelinKeyShare::<Round1>::deserialize(&bytes, &par)?;
        assert_eq!(decoded.to_bytes(), bytes);
        assert!(RelinKeyShare::<Round2>::deserialize(&bytes, &par).is_err());

        let r1 = Arc::new(share);
        let share = generator.round_2(&r1, &mut rng)?;
        let bytes = share.to_bytes();
        assert_eq!(
            RelinKeyRound2Share::deserialize(&bytes, &r1)?.to_bytes(),
            bytes
        );
        Ok(())
    }
}
