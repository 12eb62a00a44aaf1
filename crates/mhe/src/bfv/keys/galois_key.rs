//! Galois keys for the BFV encryption scheme.

use crate::bfv::{BfvParameters, EvaluationKey, SecretKey};
use crate::proto::bfv::GaloisKey as GaloisKeyProto;
use crate::{Error, Result};
use fhe_traits::{DeserializeParametrized, FheParametrized, Serialize};
use prost::Message;
use rand::{CryptoRng, RngCore};
use std::sync::Arc;

/// A key switching key from `s(x^g)` to `s(x)`, for a Galois element `g`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct GaloisKey {
    pub(crate) element: usize,
    pub(crate) ksk: EvaluationKey,
}

impl GaloisKey {
    /// Generate a [`GaloisKey`] for the automorphism `x -> x^element`.
    pub fn new<R: RngCore + CryptoRng>(sk: &SecretKey, element: usize, rng: &mut R) -> Result<Self> {
        check_galois_element(&sk.par, element)?;
        let s_sub = sk.poly_substituted_extended(element)?;
        Ok(Self {
            element,
            ksk: EvaluationKey::new(sk, &s_sub, rng)?,
        })
    }

    /// Wraps a key switching key from `s(x^element)` to `s(x)`.
    pub fn from_evaluation_key(element: usize, ksk: EvaluationKey) -> Result<Self> {
        check_galois_element(&ksk.par, element)?;
        Ok(Self { element, ksk })
    }

    /// The Galois element of the key.
    pub fn element(&self) -> usize {
        self.element
    }

    /// The underlying key switching key.
    pub fn evaluation_key(&self) -> &EvaluationKey {
        &self.ksk
    }
}

/// Galois elements are the odd residues modulo 2N.
pub(crate) fn check_galois_element(par: &BfvParameters, element: usize) -> Result<()> {
    if element % 2 == 0 || element >= par.nth_root() {
        Err(Error::UnspecifiedInput(format!(
            "Invalid Galois element {element}"
        )))
    } else {
        Ok(())
    }
}

impl From<&GaloisKey> for GaloisKeyProto {
    fn from(value: &GaloisKey) -> Self {
        GaloisKeyProto {
            ksk: Some((&value.ksk).into()),
            element: value.element as u32,
        }
    }
}

impl Serialize for GaloisKey {
    fn to_bytes(&self) -> Vec<u8> {
        GaloisKeyProto::from(self).encode_to_vec()
    }
}

impl FheParametrized for GaloisKey {
    type Parameters = BfvParameters;
}

impl DeserializeParametrized for GaloisKey {
    type Error = Error;

    fn from_bytes(bytes: &[u8], par: &Arc<Self::Parameters>) -> Result<Self> {
        let proto: GaloisKeyProto =
            Message::decode(bytes).map_err(|_| Error::SerializationError)?;
        let ksk = proto.ksk.as_ref().ok_or(Error::SerializationError)?;
        let ksk = EvaluationKey::try_from_proto(ksk, par)?;
        Self::from_evaluation_key(proto.element as usize, ksk)
            .map_err(|_| Error::SerializationError)
    }
}

#[cfg(test)]
mod tests {
    use super::GaloisKey;
    use crate::bfv::{BfvParameters, SecretKey};
    use crate::Error;
    use fhe_traits::{DeserializeParametrized, Serialize};
    use rand::thread_rng;
    use std::error::Error as StdError;

    #[test]
    fn invalid_elements() {
        let mut rng = thread_rng();
        let params = BfvParameters::default_arc(1, 8);
        let sk = SecretKey::random(&params, &mut rng);
        for element in [0, 2, 16, 17] {
            assert!(matches!(
                GaloisKey::new(&sk, element, &mut rng),
                Err(Error::UnspecifiedInput(_))
            ));
        }
    }

    #[test]
    fn serialize() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let params = BfvParameters::default_arc(2, 8);
        let sk = SecretKey::random(&params, &mut rng);
        let gk = GaloisKey::new(&sk, 3, &mut rng)?;
        let decoded = GaloisKey::from_bytes(&gk.to_bytes(), &params)?;
        assert_eq!(decoded.element(), 3);
        assert_eq!(gk, decoded);
        Ok(())
    }
}
