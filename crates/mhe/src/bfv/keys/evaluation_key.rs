//! Key switching keys.
//!
//! An [`EvaluationKey`] encrypts `P * 2^(w*j) * g_i * s_in` under `s_out`
//! over the ciphertext moduli extended with the special moduli `P`, for every
//! RNS digit `i` and power-of-2 window `j`. Switching a polynomial `c` from
//! `s_in` to `s_out` decomposes `c` along the same gadget, accumulates the
//! inner product with the key in the extended basis, and divides by `P`.

use crate::bfv::parameters::DigitParameters;
use crate::bfv::{BfvParameters, SecretKey};
use crate::proto::bfv::EvaluationKey as EvaluationKeyProto;
use crate::{Error, Result};
use fhe_math::rq::{traits::TryConvertFrom, Poly, Representation};
use fhe_traits::{DeserializeParametrized, DeserializeWithContext, FheParametrized, Serialize};
use itertools::{izip, Itertools};
use ndarray::s;
use prost::Message;
use rand::{CryptoRng, RngCore};
use std::sync::Arc;
use tracing::trace;
use zeroize::{Zeroize, Zeroizing};

/// A key switching key from `s_in` to `s_out`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct EvaluationKey {
    pub(crate) par: Arc<BfvParameters>,
    /// Entries `(b, a)` indexed by `[digit][window]`, in NTT representation
    /// over the extended context.
    pub(crate) value: Vec<Vec<[Poly; 2]>>,
}

impl EvaluationKey {
    /// Generate a key switching from `s_in` to the key `sk_out`. The input key
    /// is given as a polynomial in NTT representation over the extended
    /// context.
    pub fn new<R: RngCore + CryptoRng>(sk_out: &SecretKey, s_in: &Poly, rng: &mut R) -> Result<Self> {
        let par = &sk_out.par;
        let ctx = par.ctx_extended();
        if s_in.ctx() != ctx || s_in.representation() != &Representation::Ntt {
            return Err(Error::DefaultError(
                "The input key must be in NTT representation over the extended context"
                    .to_string(),
            ));
        }
        let s_out = sk_out.poly_extended()?;

        let value = par
            .gadget
            .iter()
            .map(|per_window| {
                per_window
                    .iter()
                    .map(|g| {
                        let a = Poly::random(ctx, Representation::Ntt, rng);
                        let mut b = Poly::small(ctx, Representation::Ntt, par.variance, rng)?;
                        b -= &(&a * s_out.as_ref());
                        let gs = Zeroizing::new(g * s_in);
                        b += gs.as_ref();
                        b.disallow_variable_time_computations();
                        Ok([b, a])
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            par: par.clone(),
            value,
        })
    }

    /// Builds a key from its entries, checking their shape.
    pub(crate) fn from_entries(par: &Arc<BfvParameters>, value: Vec<Vec<[Poly; 2]>>) -> Result<Self> {
        let digits = par.gadget.len();
        let windows = par.pow2_windows();
        if value.len() != digits || value.iter().any(|row| row.len() != windows) {
            return Err(Error::share_dimension_mismatch(
                (digits, windows),
                (value.len(), value.first().map_or(0, |row| row.len())),
            ));
        }
        for entry in value.iter().flatten() {
            for p in entry {
                if p.ctx() != par.ctx_extended() || p.representation() != &Representation::Ntt {
                    return Err(Error::DefaultError(
                        "Key entries must be in NTT representation over the extended context"
                            .to_string(),
                    ));
                }
            }
        }
        Ok(Self {
            par: par.clone(),
            value,
        })
    }

    /// Number of RNS digits of the key.
    pub fn digits(&self) -> usize {
        self.value.len()
    }

    /// Number of power-of-2 windows per digit.
    pub fn windows(&self) -> usize {
        self.value.first().map_or(0, |row| row.len())
    }

    /// The entry `(b, a)` of digit `i` and window `j`.
    pub fn get(&self, i: usize, j: usize) -> Option<&[Poly; 2]> {
        self.value.get(i).and_then(|row| row.get(j))
    }

    /// Key switches a polynomial at `level`, accumulating the inner product
    /// with the key into `acc`, in NTT representation over the extended
    /// context. The accumulators are reset first; `digit` holds the current
    /// power-of-2 window.
    pub(crate) fn inner_product_into(
        &self,
        c: &Poly,
        level: usize,
        acc: &mut [Poly; 2],
        digit: &mut Vec<u64>,
    ) -> Result<()> {
        let par = &self.par;
        if c.ctx() != par.ctx_at_level(level)? {
            return Err(Error::MathError(fhe_math::Error::InvalidContext));
        }
        let mut c = Zeroizing::new(c.clone());
        c.change_representation(Representation::PowerBasis);

        let ctx = par.ctx_extended();
        acc[0] = Poly::zero(ctx, Representation::Ntt);
        acc[1] = Poly::zero(ctx, Representation::Ntt);

        let ks = &par.ks_params[level];
        for (i, dp) in ks.digits.iter().enumerate() {
            if par.decomposition_base == 0 {
                let d = Self::extend_digit(&c, dp)?;
                Self::accumulate(d, &self.value[i][0], acc);
            } else {
                let w = par.decomposition_base;
                let mask = (1u64 << w) - 1;
                let coefficients = c.coefficients();
                let row = coefficients.row(dp.range.start);
                for (j, key) in self.value[i].iter().enumerate() {
                    digit.clear();
                    digit.extend(row.iter().map(|v| (v >> (w * j)) & mask));
                    let d = Poly::try_convert_from(
                        digit.as_slice(),
                        ctx,
                        false,
                        Representation::PowerBasis,
                    )?;
                    Self::accumulate(d, key, acc);
                }
                digit.zeroize();
            }
        }
        trace!(level, digits = ks.digits.len(), windows = self.windows(), "key switch");
        Ok(())
    }

    /// Lifts the residues of `c` modulo the moduli of the digit to the
    /// extended context.
    fn extend_digit(c: &Poly, digit: &DigitParameters) -> Result<Poly> {
        let rows = c
            .coefficients()
            .slice(s![digit.range.start..digit.range.end, ..])
            .to_owned();
        let d = Zeroizing::new(Poly::try_convert_from(
            rows,
            &digit.ctx,
            false,
            Representation::PowerBasis,
        )?);
        Ok(d.scale(&digit.extender)?)
    }

    fn accumulate(mut d: Poly, key: &[Poly; 2], acc: &mut [Poly; 2]) {
        d.change_representation(Representation::Ntt);
        for (acc_k, key_k) in izip!(acc.iter_mut(), key.iter()) {
            *acc_k += &(&d * key_k);
        }
    }

    /// Divides the accumulators by the special modulus, returning them over
    /// the context of `level` in NTT representation.
    pub(crate) fn mod_down(&self, acc: &mut [Poly; 2], level: usize) -> Result<(Poly, Poly)> {
        let down_scaler = &self.par.ks_params[level].down_scaler;
        let mut out = Vec::with_capacity(2);
        for acc_k in acc.iter_mut() {
            acc_k.change_representation(Representation::PowerBasis);
            let mut p = acc_k.scale(down_scaler)?;
            p.change_representation(Representation::Ntt);
            out.push(p);
        }
        let c1 = out.pop();
        let c0 = out.pop();
        c0.zip(c1)
            .ok_or_else(|| Error::DefaultError("Key switching produced no output".to_string()))
    }

    /// Key switches a polynomial at `level` from `s_in` to `s_out`. Returns
    /// `(d0, d1)` over the context of `level`, in NTT representation, such
    /// that `d0 + d1 * s_out ~ c * s_in`.
    pub fn key_switch(&self, c: &Poly, level: usize) -> Result<(Poly, Poly)> {
        let ctx = self.par.ctx_extended();
        let mut acc = [
            Poly::zero(ctx, Representation::Ntt),
            Poly::zero(ctx, Representation::Ntt),
        ];
        let mut digit = Vec::with_capacity(self.par.degree());
        self.inner_product_into(c, level, &mut acc, &mut digit)?;
        self.mod_down(&mut acc, level)
    }
}

impl FheParametrized for EvaluationKey {
    type Parameters = BfvParameters;
}

impl From<&EvaluationKey> for EvaluationKeyProto {
    fn from(key: &EvaluationKey) -> Self {
        let mut proto = EvaluationKeyProto {
            digits: key.digits() as u32,
            windows: key.windows() as u32,
            ..Default::default()
        };
        for [b, a] in key.value.iter().flatten() {
            proto.c0.push(b.to_bytes());
            proto.c1.push(a.to_bytes());
        }
        proto
    }
}

impl EvaluationKey {
    pub(crate) fn try_from_proto(proto: &EvaluationKeyProto, par: &Arc<BfvParameters>) -> Result<Self> {
        let digits = proto.digits as usize;
        let windows = proto.windows as usize;
        if proto.c0.len() != digits * windows || proto.c1.len() != digits * windows {
            return Err(Error::SerializationError);
        }
        let ctx = par.ctx_extended();
        let entries = izip!(&proto.c0, &proto.c1)
            .map(|(b, a)| {
                let mut b = Poly::from_bytes(b, ctx)?;
                let mut a = Poly::from_bytes(a, ctx)?;
                b.disallow_variable_time_computations();
                a.disallow_variable_time_computations();
                Ok([b, a])
            })
            .collect::<Result<Vec<_>>>()?;
        let mut value = Vec::with_capacity(digits);
        let mut entries = entries.into_iter();
        for _ in 0..digits {
            value.push(entries.by_ref().take(windows).collect_vec());
        }
        Self::from_entries(par, value).map_err(|_| Error::SerializationError)
    }
}

impl Serialize for EvaluationKey {
    fn to_bytes(&self) -> Vec<u8> {
        EvaluationKeyProto::from(self).encode_to_vec()
    }
}

impl DeserializeParametrized for EvaluationKey {
    type Error = Error;

    fn from_bytes(bytes: &[u8], par: &Arc<Self::Parameters>) -> Result<Self> {
        let proto: EvaluationKeyProto =
            Message::decode(bytes).map_err(|_| Error::SerializationError)?;
        Self::try_from_proto(&proto, par)
    }
}
