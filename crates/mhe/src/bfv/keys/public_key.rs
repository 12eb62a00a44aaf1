//! Public keys for the BFV encryption scheme

use crate::bfv::{BfvParameters, Ciphertext, Encoding, Plaintext};
use crate::proto::bfv::PublicKey as PublicKeyProto;
use crate::{Error, Result};
use fhe_math::rq::{Poly, Representation};
use fhe_traits::{DeserializeParametrized, FheParametrized, Serialize};
use prost::Message;
use rand::{CryptoRng, RngCore};
use std::sync::Arc;
use zeroize::Zeroizing;

use super::SecretKey;

/// Public key for the BFV encryption scheme: an encryption of zero
/// `(b, a) = (-a * s + e, a)` at the maximum level.
#[derive(Debug, PartialEq, Clone)]
pub struct PublicKey {
    /// The BFV parameters
    pub par: Arc<BfvParameters>,
    /// The public key ciphertext
    pub c: Ciphertext,
}

impl PublicKey {
    /// Generate a new [`PublicKey`] from a [`SecretKey`].
    pub fn new<R: RngCore + CryptoRng>(sk: &SecretKey, rng: &mut R) -> Result<Self> {
        let zero = Plaintext::zero(Encoding::poly(), &sk.par)?;
        let c = sk.try_encrypt(&zero, rng)?;
        Self::from_ciphertext(c)
    }

    /// Wraps a degree-1 ciphertext at the maximum level as a public key.
    pub(crate) fn from_ciphertext(mut c: Ciphertext) -> Result<Self> {
        if c.c.len() != 2 {
            return Err(Error::unexpected_degree(c.degree(), 1));
        }
        if c.level != c.par.max_level() {
            return Err(Error::LevelMismatch {
                expected: c.par.max_level(),
                found: c.level,
            });
        }
        // The polynomials of a public key should not allow for variable time
        // computation.
        c.c.iter_mut()
            .for_each(|p| p.disallow_variable_time_computations());
        Ok(Self {
            par: c.par.clone(),
            c,
        })
    }

    /// The `b` component of the key.
    pub fn b(&self) -> &Poly {
        &self.c.c[0]
    }

    /// The `a` component of the key.
    pub fn a(&self) -> &Poly {
        &self.c.c[1]
    }

    /// Encrypt a plaintext with the public key, at the level of the plaintext.
    pub fn try_encrypt<R: RngCore + CryptoRng>(
        &self,
        pt: &Plaintext,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        if self.par != pt.par {
            return Err(Error::DefaultError(
                "Incompatible BFV parameters".to_string(),
            ));
        }
        let mut ct = self.c.clone();
        ct.mod_switch_to_level(pt.level)?;

        let ctx = self.par.ctx_at_level(ct.level)?;
        let u = Zeroizing::new(Poly::small(
            ctx,
            Representation::Ntt,
            self.par.variance,
            rng,
        )?);
        let e1 = Zeroizing::new(Poly::small(
            ctx,
            Representation::Ntt,
            self.par.variance,
            rng,
        )?);
        let e2 = Zeroizing::new(Poly::small(
            ctx,
            Representation::Ntt,
            self.par.variance,
            rng,
        )?);

        let mut c0 = u.as_ref() * &ct.c[0];
        c0 += &e1;
        c0 += pt.to_poly();
        let mut c1 = u.as_ref() * &ct.c[1];
        c1 += &e2;

        Ok(Ciphertext {
            par: self.par.clone(),
            c: vec![c0, c1],
            level: ct.level,
            scale: 1.0,
        })
    }
}

impl FheParametrized for PublicKey {
    type Parameters = BfvParameters;
}

impl From<&PublicKey> for PublicKeyProto {
    fn from(pk: &PublicKey) -> Self {
        PublicKeyProto {
            c: pk.c.to_bytes(),
        }
    }
}

impl Serialize for PublicKey {
    fn to_bytes(&self) -> Vec<u8> {
        PublicKeyProto::from(self).encode_to_vec()
    }
}

impl DeserializeParametrized for PublicKey {
    type Error = Error;

    fn from_bytes(bytes: &[u8], par: &Arc<Self::Parameters>) -> Result<Self> {
        let proto: PublicKeyProto =
            Message::decode(bytes).map_err(|_| Error::SerializationError)?;
        let c = Ciphertext::from_bytes(&proto.c, par)?;
        Self::from_ciphertext(c).map_err(|_| Error::SerializationError)
    }
}

#[cfg(test)]
mod tests {
    use super::PublicKey;
    use crate::bfv::{parameters::BfvParameters, Encoding, Plaintext, SecretKey};
    use fhe_traits::{DeserializeParametrized, Serialize};
    use rand::thread_rng;
    use std::error::Error;

    #[test]
    fn keygen() -> Result<(), Box<dyn Error>> {
        let mut rng = thread_rng();
        let params = BfvParameters::default_arc(1, 8);
        let sk = SecretKey::random(&params, &mut rng);
        let pk = PublicKey::new(&sk, &mut rng)?;
        assert_eq!(pk.par, params);
        assert_eq!(
            sk.try_decrypt(&pk.c)?,
            Plaintext::zero(Encoding::poly(), &params)?
        );
        Ok(())
    }

    #[test]
    fn encrypt_decrypt() -> Result<(), Box<dyn Error>> {
        let mut rng = thread_rng();
        for params in [
            BfvParameters::default_arc(1, 8),
            BfvParameters::default_arc(4, 8),
        ] {
            for level in 0..=params.max_level() {
                for _ in 0..10 {
                    let sk = SecretKey::random(&params, &mut rng);
                    let pk = PublicKey::new(&sk, &mut rng)?;

                    let pt = Plaintext::try_encode(
                        &params.plaintext.random_vec(params.degree(), &mut rng),
                        Encoding::poly_at_level(level),
                        &params,
                    )?;
                    let ct = pk.try_encrypt(&pt, &mut rng)?;
                    assert_eq!(ct.level, level);
                    let pt2 = sk.try_decrypt(&ct)?;
                    assert_eq!(pt2, pt);
                }
            }
        }

        Ok(())
    }

    #[test]
    fn from_ciphertext() -> Result<(), Box<dyn Error>> {
        let mut rng = thread_rng();
        let params = BfvParameters::default_arc(3, 8);
        let sk = SecretKey::random(&params, &mut rng);
        let zero = Plaintext::zero(Encoding::poly(), &params)?;

        let mut ct = sk.try_encrypt(&zero, &mut rng)?;
        ct.mod_switch_to_next_level()?;
        assert_eq!(
            PublicKey::from_ciphertext(ct),
            Err(crate::Error::LevelMismatch {
                expected: 2,
                found: 1
            })
        );

        let mut ct = sk.try_encrypt(&zero, &mut rng)?;
        let extra = ct.c[1].clone();
        ct.c.push(extra);
        assert!(matches!(
            PublicKey::from_ciphertext(ct),
            Err(crate::Error::Precondition(_))
        ));

        let pk = PublicKey::new(&sk, &mut rng)?;
        assert_eq!(pk.b(), &pk.c.c[0]);
        assert_eq!(pk.a(), &pk.c.c[1]);
        Ok(())
    }

    #[test]
    fn serialize() -> Result<(), Box<dyn Error>> {
        let mut rng = thread_rng();
        for params in [
            BfvParameters::default_arc(1, 8),
            BfvParameters::default_arc(4, 8),
        ] {
            let sk = SecretKey::random(&params, &mut rng);
            let pk = PublicKey::new(&sk, &mut rng)?;
            let bytes = pk.to_bytes();
            assert_eq!(pk, PublicKey::from_bytes(&bytes, &params)?);
        }
        Ok(())
    }
}
