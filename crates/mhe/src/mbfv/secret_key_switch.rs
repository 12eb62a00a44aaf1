use std::sync::Arc;

use fhe_math::rq::{Poly, Representation};
use fhe_traits::{DeserializeWithContext, Serialize};
use prost::Message;
use rand::{CryptoRng, RngCore};
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::bfv::{BfvParameters, Ciphertext, Plaintext, SecretKey};
use crate::proto::bfv::SecretKeySwitchShare as SecretKeySwitchShareProto;
use crate::{Error, Result};

use super::{Aggregate, ShareAccumulator, SmudgingConfig};

/// A party's share in the secret key switch protocol.
///
/// Each party uses the `SecretKeySwitchShare` to generate their share of the
/// new ciphertext and participate in the "Protocol 3: KeySwitch" protocol
/// detailed in [Multiparty BFV](https://eprint.iacr.org/2020/304.pdf) (p7).
/// Use the [`Aggregate`] impl to combine the shares into a [`Ciphertext`].
///
/// The output key must be split among the same parties as the input key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretKeySwitchShare {
    pub(crate) par: Arc<BfvParameters>,
    /// The input ciphertext.
    pub(crate) ct: Arc<Ciphertext>,
    pub(crate) h_share: Poly,
}

impl SecretKeySwitchShare {
    /// Participate in a new KeySwitch protocol
    ///
    /// 1. *Private input*: BFV input secret key share
    /// 2. *Private input*: BFV output secret key share
    /// 3. *Public input*: Input ciphertext to keyswitch
    /// 4. *Public input*: Smudging noise distribution
    pub fn new<R: RngCore + CryptoRng>(
        sk_input_share: &SecretKey,
        sk_output_share: &SecretKey,
        ct: Arc<Ciphertext>,
        smudging: &SmudgingConfig,
        rng: &mut R,
    ) -> Result<Self> {
        if sk_input_share.par != sk_output_share.par {
            return Err(Error::DefaultError(
                "Incompatible BFV parameters".to_string(),
            ));
        }
        let ctx = check_input(&sk_input_share.par, &ct)?;
        let s_in = sk_input_share.poly_in(ctx)?;
        let s_out = sk_output_share.poly_in(ctx)?;
        let s = Zeroizing::new(s_in.as_ref() - s_out.as_ref());
        Self::with_key_difference(sk_input_share.par.clone(), ct, &s, smudging, rng)
    }

    /// Computes `s * c_1 + e` with `e` drawn from the smudging distribution.
    fn with_key_difference<R: RngCore + CryptoRng>(
        par: Arc<BfvParameters>,
        ct: Arc<Ciphertext>,
        s: &Poly,
        smudging: &SmudgingConfig,
        rng: &mut R,
    ) -> Result<Self> {
        let e = Zeroizing::new(smudging.sample_poly(ct.c[1].ctx(), par.degree(), rng)?);
        let mut h_share = s.clone();
        h_share.disallow_variable_time_computations();
        h_share *= &ct.c[1];
        h_share += e.as_ref();
        Ok(Self { par, ct, h_share })
    }

    /// A zero share for switching `ct`.
    pub fn allocate(ct: Arc<Ciphertext>) -> Result<Self> {
        let par = ct.par.clone();
        let ctx = check_input(&par, &ct)?;
        let h_share = Poly::zero(ctx, Representation::Ntt);
        Ok(Self { par, ct, h_share })
    }

    /// The ciphertext being switched.
    pub fn ciphertext(&self) -> &Arc<Ciphertext> {
        &self.ct
    }

    /// Deserialize a share of the switch of `ct`.
    pub fn deserialize(bytes: &[u8], ct: Arc<Ciphertext>) -> Result<Self> {
        let par = ct.par.clone();
        let ctx = check_input(&par, &ct)?;
        let proto: SecretKeySwitchShareProto =
            Message::decode(bytes).map_err(|_| Error::SerializationError)?;
        let h_share = Poly::from_bytes(&proto.h, ctx)?;
        Ok(Self { par, ct, h_share })
    }
}

/// Checks that `ct` is a degree 1 NTT ciphertext under `par`, and returns its
/// context.
fn check_input<'a>(
    par: &Arc<BfvParameters>,
    ct: &'a Ciphertext,
) -> Result<&'a Arc<fhe_math::rq::Context>> {
    if &ct.par != par {
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
    Ok(ct.c[1].ctx())
}

/// Shares of the same session switch the same ciphertext.
pub(crate) fn same_ciphertext(a: &Arc<Ciphertext>, b: &Arc<Ciphertext>) -> Result<()> {
    if a.level != b.level {
        return Err(Error::share_level_mismatch(a.level, b.level));
    }
    if !Arc::ptr_eq(a, b) && a != b {
        return Err(Error::Aggregation(
            "share was computed on another ciphertext".to_string(),
        ));
    }
    Ok(())
}

impl ShareAccumulator for SecretKeySwitchShare {
    fn aggregate_share(&mut self, share: &Self) -> Result<()> {
        if self.par != share.par {
            return Err(Error::Aggregation("incompatible parameters".to_string()));
        }
        same_ciphertext(&self.ct, &share.ct)?;
        self.h_share += &share.h_share;
        Ok(())
    }
}

impl Aggregate<SecretKeySwitchShare> for Ciphertext {
    #[instrument(skip_all)]
    fn from_shares<T>(iter: T) -> Result<Self>
    where
        T: IntoIterator<Item = SecretKeySwitchShare>,
    {
        let acc = SecretKeySwitchShare::from_shares(iter)?;
        debug!(level = acc.ct.level, "aggregated secret key switch shares");
        let c0 = &acc.ct.c[0] + &acc.h_share;
        let c1 = acc.ct.c[1].clone();

        let mut ct = Ciphertext::new(vec![c0, c1], &acc.par)?;
        ct.set_scale(acc.ct.scale());
        Ok(ct)
    }
}

impl Serialize for SecretKeySwitchShare {
    fn to_bytes(&self) -> Vec<u8> {
        SecretKeySwitchShareProto {
            h: self.h_share.to_bytes(),
        }
        .encode_to_vec()
    }
}

/// A party's share in the decryption protocol.
///
/// Each party uses the `DecryptionShare` to generate their share of the
/// plaintext output. Note that this is a special case of the "Protocol 3:
/// KeySwitch" protocol detailed in [Multiparty BFV](https://eprint.iacr.org/2020/304.pdf) (p7),
/// using an output key of zero. Use the [`Aggregate`] impl to combine the
/// shares into a [`Plaintext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionShare {
    pub(crate) sks_share: SecretKeySwitchShare,
}

impl DecryptionShare {
    /// Participate in a new Decryption protocol.
    ///
    /// 1. *Private input*: BFV input secret key share
    /// 2. *Public input*: Ciphertext to decrypt
    /// 3. *Public input*: Smudging noise distribution
    pub fn new<R: RngCore + CryptoRng>(
        sk_input_share: &SecretKey,
        ct: &Arc<Ciphertext>,
        smudging: &SmudgingConfig,
        rng: &mut R,
    ) -> Result<Self> {
        let ctx = check_input(&sk_input_share.par, ct)?;
        let s = sk_input_share.poly_in(ctx)?;
        let sks_share = SecretKeySwitchShare::with_key_difference(
            sk_input_share.par.clone(),
            ct.clone(),
            &s,
            smudging,
            rng,
        )?;
        Ok(Self { sks_share })
    }

    /// A zero share for decrypting `ct`.
    pub fn allocate(ct: &Arc<Ciphertext>) -> Result<Self> {
        Ok(Self {
            sks_share: SecretKeySwitchShare::allocate(ct.clone())?,
        })
    }

    /// Deserialize a share of the decryption of `ct`.
    pub fn deserialize(bytes: &[u8], ct: &Arc<Ciphertext>) -> Result<Self> {
        Ok(Self {
            sks_share: SecretKeySwitchShare::deserialize(bytes, ct.clone())?,
        })
    }
}

impl ShareAccumulator for DecryptionShare {
    fn aggregate_share(&mut self, share: &Self) -> Result<()> {
        self.sks_share.aggregate_share(&share.sks_share)
    }
}

impl Serialize for DecryptionShare {
    fn to_bytes(&self) -> Vec<u8> {
        self.sks_share.to_bytes()
    }
}

impl Aggregate<DecryptionShare> for Plaintext {
    #[instrument(skip_all)]
    fn from_shares<T>(iter: T) -> Result<Self>
    where
        T: IntoIterator<Item = DecryptionShare>,
    {
        let ct = Ciphertext::from_shares(iter.into_iter().map(|s| s.sks_share))?;
        debug!(level = ct.level, "aggregated decryption shares");

        // c_1 * s has been added to c_0 by the shares, what remains is the
        // rounding.
        let mut c = Zeroizing::new(ct.c[0].clone());
        c.disallow_variable_time_computations();
        c.change_representation(Representation::PowerBasis);
        Plaintext::from_phase(&c, ct.level, &ct.par)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as StdError;
    use std::sync::Arc;

    use fhe_traits::Serialize;
    use itertools::Itertools;
    use rand::thread_rng;

    use crate::bfv::{BfvParameters, Ciphertext, Encoding, Plaintext, PublicKey, SecretKey};
    use crate::mbfv::{
        Aggregate, AggregateIter, CommonRandomPoly, PublicKeyShare, ShareAccumulator,
        SmudgingConfig,
    };
    use crate::Error;

    use super::{DecryptionShare, SecretKeySwitchShare};

    const NUM_PARTIES: usize = 5;

    struct Party {
        sk_share: SecretKey,
        pk_share: PublicKeyShare,
    }

    fn setup(par: &Arc<BfvParameters>) -> Result<(Vec<Party>, PublicKey), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let crp = CommonRandomPoly::new(par, &mut rng)?;
        let parties = (0..NUM_PARTIES)
            .map(|_| {
                let sk_share = SecretKey::random(par, &mut rng);
                let pk_share = PublicKeyShare::new(&sk_share, crp.clone(), &mut rng)?;
                Ok(Party { sk_share, pk_share })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        let pk = parties
            .iter()
            .map(|p| p.pk_share.clone())
            .aggregate::<PublicKey>()?;
        Ok((parties, pk))
    }

    #[test]
    fn encrypt_decrypt() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let smudging = SmudgingConfig::default();
        for par in [
            BfvParameters::default_arc(1, 16),
            BfvParameters::default_arc(3, 16),
        ] {
            let (parties, pk) = setup(&par)?;
            for level in 0..=par.max_level() {
                let pt = Plaintext::try_encode(
                    &par.plaintext.random_vec(par.degree(), &mut rng),
                    Encoding::poly_at_level(level),
                    &par,
                )?;
                let ct = Arc::new(pk.try_encrypt(&pt, &mut rng)?);

                let decrypted: Plaintext = parties
                    .iter()
                    .map(|p| DecryptionShare::new(&p.sk_share, &ct, &smudging, &mut rng))
                    .collect::<crate::Result<Vec<_>>>()?
                    .into_iter()
                    .aggregate()?;
                assert_eq!(decrypted.level(), level);
                assert_eq!(decrypted, pt);
            }
        }
        Ok(())
    }

    #[test]
    fn encrypt_keyswitch_decrypt() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let smudging = SmudgingConfig::default();
        let par = BfvParameters::default_arc(2, 16);
        let (parties, pk) = setup(&par)?;
        let (new_parties, _) = setup(&par)?;

        let pt = Plaintext::try_encode(
            &par.plaintext.random_vec(par.degree(), &mut rng),
            Encoding::poly(),
            &par,
        )?;
        let mut ct = pk.try_encrypt(&pt, &mut rng)?;
        ct.set_scale(3.0);
        let ct = Arc::new(ct);

        let switched: Ciphertext = parties
            .iter()
            .zip(new_parties.iter())
            .map(|(p, q)| {
                SecretKeySwitchShare::new(&p.sk_share, &q.sk_share, ct.clone(), &smudging, &mut rng)
            })
            .collect::<crate::Result<Vec<_>>>()?
            .into_iter()
            .aggregate()?;
        assert_eq!(switched.level, ct.level);
        assert_eq!(switched.scale(), 3.0);

        let switched = Arc::new(switched);
        let decrypted: Plaintext = new_parties
            .iter()
            .map(|q| DecryptionShare::new(&q.sk_share, &switched, &smudging, &mut rng))
            .collect::<crate::Result<Vec<_>>>()?
            .into_iter()
            .aggregate()?;
        assert_eq!(decrypted, pt);
        Ok(())
    }

    #[test]
    fn aggregation_errors() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let smudging = SmudgingConfig::default();
        let par = BfvParameters::default_arc(2, 16);
        let (parties, pk) = setup(&par)?;
        let sk = &parties[0].sk_share;

        assert_eq!(
            Plaintext::from_shares(Vec::<DecryptionShare>::new()).err(),
            Some(Error::TooFewValues(0, 1))
        );

        let pt = Plaintext::zero(Encoding::poly(), &par)?;
        let ct = Arc::new(pk.try_encrypt(&pt, &mut rng)?);
        let other = Arc::new(pk.try_encrypt(&pt, &mut rng)?);
        let mut acc = DecryptionShare::allocate(&ct)?;
        let share = DecryptionShare::new(sk, &other, &smudging, &mut rng)?;
        assert!(matches!(
            acc.aggregate_share(&share),
            Err(Error::Aggregation(_))
        ));

        let mut low = (*ct).clone();
        low.mod_switch_to_next_level()?;
        let share = DecryptionShare::new(sk, &Arc::new(low), &smudging, &mut rng)?;
        assert_eq!(
            acc.aggregate_share(&share).err(),
            Some(Error::share_level_mismatch(1, 0))
        );

        // Only degree 1 ciphertexts can be switched.
        let ct3 = Arc::new(Ciphertext::zero(&par, 2, 0)?);
        assert_eq!(
            DecryptionShare::new(sk, &ct3, &smudging, &mut rng).err(),
            Some(Error::unexpected_degree(2, 1))
        );
        Ok(())
    }

    #[test]
    fn serialize() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let smudging = SmudgingConfig::default();
        let par = BfvParameters::default_arc(2, 16);
        let (parties, pk) = setup(&par)?;
        let pt = Plaintext::zero(Encoding::poly(), &par)?;
        let ct = Arc::new(pk.try_encrypt(&pt, &mut rng)?);

        let shares = parties
            .iter()
            .map(|p| DecryptionShare::new(&p.sk_share, &ct, &smudging, &mut rng))
            .collect::<crate::Result<Vec<_>>>()?;
        let decoded = shares
            .iter()
            .map(|s| DecryptionShare::deserialize(&s.to_bytes(), &ct))
            .collect::<crate::Result<Vec<_>>>()?;
        assert_eq!(
            decoded.iter().map(|s| s.to_bytes()).collect_vec(),
            shares.iter().map(|s| s.to_bytes()).collect_vec()
        );
        let decrypted: Plaintext = decoded.into_iter().aggregate()?;
        assert_eq!(decrypted, pt);
        Ok(())
    }
}
