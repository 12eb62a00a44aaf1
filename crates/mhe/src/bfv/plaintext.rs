//! Plaintext type in the BFV encryption scheme.

use crate::bfv::{encoding::EncodingEnum, BfvParameters, Encoding};
use crate::{Error, Result};
use fhe_math::{
    rq::{traits::TryConvertFrom, Poly, Representation},
    zq::Modulus,
};
use std::sync::Arc;
use zeroize::{Zeroize, Zeroizing};

/// A plaintext object, that encodes a vector according to a specific encoding.
#[derive(Debug, Clone)]
pub struct Plaintext {
    /// The parameters of the underlying BFV encryption scheme.
    pub(crate) par: Arc<BfvParameters>,
    /// The value after encoding.
    pub(crate) value: Box<[u64]>,
    /// The encoding of the plaintext, if known
    pub(crate) encoding: Option<Encoding>,
    /// The plaintext as a polynomial, scaled by `Q / t`.
    pub(crate) poly_ntt: Poly,
    /// The level of the plaintext
    pub(crate) level: usize,
}

impl Zeroize for Plaintext {
    fn zeroize(&mut self) {
        self.value.zeroize();
        self.poly_ntt.zeroize();
    }
}

impl PartialEq for Plaintext {
    fn eq(&self, other: &Self) -> bool {
        let mut eq = self.par == other.par;
        eq &= self.value == other.value;
        if let (Some(a), Some(b)) = (&self.encoding, &other.encoding) {
            eq &= a == b
        }
        eq
    }
}

impl Plaintext {
    /// Encodes a vector of values modulo the plaintext modulus.
    pub fn try_encode(value: &[u64], encoding: Encoding, par: &Arc<BfvParameters>) -> Result<Self> {
        if value.len() > par.degree() {
            return Err(Error::TooManyValues(value.len(), par.degree()));
        }
        let level = encoding.level.unwrap_or(par.max_level());
        if level > par.max_level() {
            return Err(Error::DefaultError("Invalid level".to_string()));
        }

        let mut v = vec![0u64; par.degree()];
        v[..value.len()].copy_from_slice(value);
        par.plaintext.reduce_vec(&mut v);
        match encoding.encoding {
            EncodingEnum::Poly => {}
            EncodingEnum::Simd => {
                let op = par
                    .op
                    .as_ref()
                    .ok_or_else(|| Error::EncodingNotSupported(EncodingEnum::Simd.to_string()))?;
                let mut w = vec![0u64; par.degree()];
                for (i, vi) in v.iter().enumerate() {
                    w[par.matrix_reps_index_map[i]] = *vi;
                }
                op.backward(&mut w);
                v = w;
            }
        }

        let poly_ntt = Self::scale_to_poly(&v, level, par)?;
        Ok(Self {
            par: par.clone(),
            value: v.into_boxed_slice(),
            encoding: Some(Encoding {
                encoding: encoding.encoding,
                level: Some(level),
            }),
            poly_ntt,
            level,
        })
    }

    /// Decodes the plaintext according to an encoding.
    pub fn try_decode(&self, encoding: Encoding) -> Result<Vec<u64>> {
        if let Some(own) = &self.encoding {
            if own.encoding != encoding.encoding {
                return Err(Error::EncodingMismatch(
                    encoding.encoding.to_string(),
                    own.encoding.to_string(),
                ));
            }
        }
        match encoding.encoding {
            EncodingEnum::Poly => Ok(self.value.to_vec()),
            EncodingEnum::Simd => {
                let op = self
                    .par
                    .op
                    .as_ref()
                    .ok_or_else(|| Error::EncodingNotSupported(EncodingEnum::Simd.to_string()))?;
                let mut w = self.value.to_vec();
                op.forward(&mut w);
                Ok((0..self.par.degree())
                    .map(|i| w[self.par.matrix_reps_index_map[i]])
                    .collect())
            }
        }
    }

    /// Generate a zero plaintext.
    pub fn zero(encoding: Encoding, par: &Arc<BfvParameters>) -> Result<Self> {
        Self::try_encode(&[], encoding, par)
    }

    /// Level of the plaintext.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Builds a plaintext from already encoded polynomial coefficients.
    pub(crate) fn from_coefficients(
        value: Vec<u64>,
        level: usize,
        par: &Arc<BfvParameters>,
    ) -> Result<Self> {
        let poly_ntt = Self::scale_to_poly(&value, level, par)?;
        Ok(Self {
            par: par.clone(),
            value: value.into_boxed_slice(),
            encoding: None,
            poly_ntt,
            level,
        })
    }

    /// Decodes the phase `c_0 + c_1 * s + ...` of a ciphertext at `level`,
    /// given in power basis, by rounding `t / Q_l * c` modulo `t`.
    pub(crate) fn from_phase(
        phase: &Poly,
        level: usize,
        par: &Arc<BfvParameters>,
    ) -> Result<Self> {
        let d = Zeroizing::new(phase.scale(&par.scalers[level])?);
        let v = Zeroizing::new(
            Vec::<u64>::from(d.as_ref())
                .iter()
                .map(|vi| *vi + par.plaintext.modulus())
                .collect::<Vec<_>>(),
        );
        let mut w = v[..par.degree()].to_vec();
        let q = Modulus::new(par.moduli[0])?;
        q.reduce_vec(&mut w);
        par.plaintext.reduce_vec(&mut w);
        Self::from_coefficients(w, level, par)
    }

    /// Returns `[Q_l * m]_t * (-t^-1 mod Q_l)`, which is `Q_l / t * m` up to
    /// a small error, in NTT representation.
    pub(crate) fn scale_to_poly(
        value: &[u64],
        level: usize,
        par: &Arc<BfvParameters>,
    ) -> Result<Poly> {
        let mut m_v = Zeroizing::new(value.to_vec());
        par.plaintext
            .scalar_mul_vec(m_v.as_mut(), par.q_mod_t[level]);
        let ctx = par.ctx_at_level(level)?;
        let mut m = Poly::try_convert_from(m_v.as_slice(), ctx, false, Representation::PowerBasis)?;
        m.change_representation(Representation::Ntt);
        m *= &par.delta[level];
        Ok(m)
    }

    /// The scaled polynomial of the plaintext.
    pub(crate) fn to_poly(&self) -> &Poly {
        &self.poly_ntt
    }
}

#[cfg(test)]
mod tests {
    use super::{Encoding, Plaintext};
    use crate::bfv::BfvParameters;
    use crate::Error;
    use rand::thread_rng;
    use std::error::Error as StdError;

    #[test]
    fn encode_decode() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let params = BfvParameters::default_arc(2, 16);
        let v = params.plaintext.random_vec(params.degree(), &mut rng);

        for encoding in [Encoding::poly(), Encoding::simd(), Encoding::simd_at_level(0)] {
            let pt = Plaintext::try_encode(&v, encoding.clone(), &params)?;
            assert_eq!(pt.try_decode(encoding)?, v);
        }

        let pt = Plaintext::try_encode(&v, Encoding::poly(), &params)?;
        assert_eq!(pt.level(), params.max_level());
        assert!(matches!(
            pt.try_decode(Encoding::simd()),
            Err(Error::EncodingMismatch(_, _))
        ));

        assert_eq!(
            Plaintext::try_encode(&[0u64; 17], Encoding::poly(), &params).err(),
            Some(Error::TooManyValues(17, 16))
        );
        Ok(())
    }
}
