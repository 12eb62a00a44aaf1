use std::sync::Arc;

use fhe_math::rq::{Poly, Representation};
use fhe_traits::{DeserializeWithContext, Serialize};
use prost::Message;
use rand::{CryptoRng, RngCore};
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::bfv::{BfvParameters, Ciphertext, PublicKey, SecretKey};
use crate::proto::bfv::PublicKeySwitchShare as PublicKeySwitchShareProto;
use crate::{Error, Result};

use super::secret_key_switch::same_ciphertext;
use super::{Aggregate, ShareAccumulator, SmudgingConfig};

/// A party's share in the public key switch protocol.
///
/// Each party uses the `PublicKeySwitchShare` to generate their share of the
/// new ciphertext and participate in the "Protocol 4: PubKeySwitch" protocol
/// detailed in [Multiparty BFV](https://eprint.iacr.org/2020/304.pdf) (p7).
/// The output key is a public key, whose owner does not take part in the
/// protocol. Use the [`Aggregate`] impl to combine the shares into a
/// [`Ciphertext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeySwitchShare {
    pub(crate) par: Arc<BfvParameters>,
    /// The input ciphertext.
    pub(crate) ct: Arc<Ciphertext>,
    pub(crate) h0_share: Poly,
    pub(crate) h1_share: Poly,
}

impl PublicKeySwitchShare {
    /// Participate in a new PubKeySwitch protocol
    ///
    /// 1. *Private input*: BFV input secret key share
    /// 2. *Public input*: Output public key
    /// 3. *Public input*: Input ciphertext to keyswitch
    /// 4. *Public input*: Smudging noise distribution
    pub fn new<R: RngCore + CryptoRng>(
        sk_share: &SecretKey,
        public_key: &PublicKey,
        ct: Arc<Ciphertext>,
        smudging: &SmudgingConfig,
        rng: &mut R,
    ) -> Result<Self> {
        let par = sk_share.parameters().clone();
        if public_key.par != par || ct.par != par {
            return Err(Error::DefaultError(
                "Incompatible BFV parameters".to_string(),
            ));
        }
        if ct.c.len() != 2 {
            return Err(Error::unexpected_degree(ct.degree(), 1));
        }
        if !ct.is_ntt() {
            return Err(Error::ntt_flag_mismatch("ct", true));
        }

        let mut pk = public_key.c.clone();
        pk.mod_switch_to_level(ct.level)?;
        let ctx = par.ctx_at_level(ct.level)?;

        let s = sk_share.poly_in(ctx)?;
        let u = Zeroizing::new(Poly::small(ctx, Representation::Ntt, par.variance, rng)?);
        let e0 = Zeroizing::new(smudging.sample_poly(ctx, par.degree(), rng)?);
        let e1 = Zeroizing::new(Poly::small(ctx, Representation::Ntt, par.variance, rng)?);

        let mut h0_share = s.as_ref().clone();
        h0_share.disallow_variable_time_computations();
        h0_share *= &ct.c[1];
        h0_share += &(u.as_ref() * &pk.c[0]);
        h0_share += e0.as_ref();

        let mut h1_share = u.as_ref() * &pk.c[1];
        h1_share.disallow_variable_time_computations();
        h1_share += e1.as_ref();

        Ok(Self {
            par,
            ct,
            h0_share,
            h1_share,
        })
    }

    /// A zero share for switching `ct`.
    pub fn allocate(ct: Arc<Ciphertext>) -> Result<Self> {
        let par = ct.par.clone();
        if ct.c.len() != 2 {
            return Err(Error::unexpected_degree(ct.degree(), 1));
        }
        let ctx = par.ctx_at_level(ct.level)?;
        Ok(Self {
            h0_share: Poly::zero(ctx, Representation::Ntt),
            h1_share: Poly::zero(ctx, Representation::Ntt),
            par,
            ct,
        })
    }

    /// The ciphertext being switched.
    pub fn ciphertext(&self) -> &Arc<Ciphertext> {
        &self.ct
    }

    /// Deserialize a share of the switch of `ct`.
    pub fn deserialize(bytes: &[u8], ct: Arc<Ciphertext>) -> Result<Self> {
        let par = ct.par.clone();
        let ctx = par.ctx_at_level(ct.level)?;
        let proto: PublicKeySwitchShareProto =
            Message::decode(bytes).map_err(|_| Error::SerializationError)?;
        Ok(Self {
            h0_share: Poly::from_bytes(&proto.h0, ctx)?,
            h1_share: Poly::from_bytes(&proto.h1, ctx)?,
            par,
            ct,
        })
    }
}

impl ShareAccumulator for PublicKeySwitchShare {
    fn aggregate_share(&mut self, share: &Self) -> Result<()> {
        if self.par != share.par {
            return Err(Error::Aggregation("incompatible parameters".to_string()));
        }
        same_ciphertext(&self.ct, &share.ct)?;
        self.h0_share += &share.h0_share;
        self.h1_share += &share.h1_share;
        Ok(())
    }
}

impl Aggregate<PublicKeySwitchShare> for Ciphertext {
    #[instrument(skip_all)]
    fn from_shares<T>(iter: T) -> Result<Self>
    where
        T: IntoIterator<Item = PublicKeySwitchShare>,
    {
        let acc = PublicKeySwitchShare::from_shares(iter)?;
        debug!(level = acc.ct.level, "aggregated public key switch shares");

        let c0 = &acc.ct.c[0] + &acc.h0_share;
        let mut ct = Ciphertext::new(vec![c0, acc.h1_share], &acc.par)?;
        ct.set_scale(acc.ct.scale());
        Ok(ct)
    }
}

impl Serialize for PublicKeySwitchShare {
    fn to_bytes(&self) -> Vec<u8> {
        PublicKeySwitchShareProto {
            h0: self.h0_share.to_bytes(),
            h1: self.h1_share.to_bytes(),
        }
        .encode_to_vec()
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as StdError;
    use std::sync::Arc;

    use fhe_traits::Serialize;
    use rand::thread_rng;

    use crate::bfv::{BfvParameters, Ciphertext, Encoding, Plaintext, PublicKey, SecretKey};
    use crate::mbfv::{
        Aggregate, AggregateIter, CommonRandomPoly, PublicKeyShare, ShareAccumulator,
        SmudgingConfig,
    };
    use crate::Error;

    use super::PublicKeySwitchShare;

    const NUM_PARTIES: usize = 4;

    #[test]
    fn switches_to_external_key() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let smudging = SmudgingConfig::default();
        for par in [
            BfvParameters::default_arc(1, 16),
            BfvParameters::default_arc(3, 16),
        ] {
            let crp = CommonRandomPoly::new(&par, &mut rng)?;
            let sk_shares = (0..NUM_PARTIES)
                .map(|_| SecretKey::random(&par, &mut rng))
                .collect::<Vec<_>>();
            let pk: PublicKey = sk_shares
                .iter()
                .map(|sk| PublicKeyShare::new(sk, crp.clone(), &mut rng))
                .collect::<crate::Result<Vec<_>>>()?
                .into_iter()
                .aggregate()?;

            let sk_out = SecretKey::random(&par, &mut rng);
            let pk_out = PublicKey::new(&sk_out, &mut rng)?;

            for level in 0..=par.max_level() {
                let pt = Plaintext::try_encode(
                    &par.plaintext.random_vec(par.degree(), &mut rng),
                    Encoding::poly_at_level(level),
                    &par,
                )?;
                let ct = Arc::new(pk.try_encrypt(&pt, &mut rng)?);
                let switched: Ciphertext = sk_shares
                    .iter()
                    .map(|sk| {
                        PublicKeySwitchShare::new(sk, &pk_out, ct.clone(), &smudging, &mut rng)
                    })
                    .collect::<crate::Result<Vec<_>>>()?
                    .into_iter()
                    .aggregate()?;
                assert_eq!(switched.level, level);
                assert_eq!(sk_out.try_decrypt(&switched)?, pt);
            }
        }
        Ok(())
    }

    #[test]
    fn aggregation_errors() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let smudging = SmudgingConfig::default();
        let par = BfvParameters::default_arc(2, 16);
        let sk = SecretKey::random(&par, &mut rng);
        let pk = PublicKey::new(&sk, &mut rng)?;
        let pt = Plaintext::zero(Encoding::poly(), &par)?;

        assert_eq!(
            Ciphertext::from_shares(Vec::<PublicKeySwitchShare>::new()).err(),
            Some(Error::TooFewValues(0, 1))
        );

        let ct = Arc::new(pk.try_encrypt(&pt, &mut rng)?);
        let other = Arc::new(pk.try_encrypt(&pt, &mut rng)?);
        let mut acc = PublicKeySwitchShare::allocate(ct.clone())?;
        let share = PublicKeySwitchShare::new(&sk, &pk, other, &smudging, &mut rng)?;
        assert!(matches!(
            acc.aggregate_share(&share),
            Err(Error::Aggregation(_))
        ));

        let ct3 = Arc::new(Ciphertext::zero(&par, 2, 1)?);
        assert_eq!(
            PublicKeySwitchShare::new(&sk, &pk, ct3, &smudging, &mut rng).err(),
            Some(Error::unexpected_degree(2, 1))
        );
        Ok(())
    }

    #[test]
    fn serialize() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let smudging = SmudgingConfig::default();
        let par = BfvParameters::default_arc(2, 16);
        let sk = SecretKey::random(&par, &mut rng);
        let pk = PublicKey::new(&sk, &mut rng)?;
        let pt = Plaintext::zero(Encoding::poly(), &par)?;
        let ct = Arc::new(pk.try_encrypt(&pt, &mut rng)?);

        let share = PublicKeySwitchShare::new(&sk, &pk, ct.clone(), &smudging, &mut rng)?;
        let bytes = share.to_bytes();
        let decoded = PublicKeySwitchShare::deserialize(&bytes, ct.clone())?;
        assert_eq!(decoded.to_bytes(), bytes);
        assert!(PublicKeySwitchShare::deserialize(&bytes[..bytes.len() / 2], ct).is_err());
        Ok(())
    }
}
