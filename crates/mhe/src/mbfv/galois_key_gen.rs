//! Collective Galois key generation.
//!
//! The automorphism `x -> x^g` is linear, so `sum(sigma_g(s_i)) =
//! sigma_g(sum(s_i))` and a single round suffices: each party encrypts the
//! gadget multiples of `sigma_g(s_i)` under `s_i` against the common random
//! polynomials, and the shares add up to a key switching key from
//! `sigma_g(s)` to `s`.

use std::sync::Arc;

use crate::bfv::{check_galois_element, BfvParameters, EvaluationKey, GaloisKey, SecretKey};
use crate::proto::bfv::GaloisKeyShare as GaloisKeyShareProto;
use crate::{Error, Result};
use fhe_math::rq::{Poly, Representation};
use fhe_traits::{DeserializeWithContext, Serialize};
use itertools::{izip, Itertools};
use prost::Message;
use rand::{CryptoRng, RngCore};
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use super::{Aggregate, GaloisKeyCrp, ShareAccumulator};

/// A party's share in the Galois key generation protocol for one Galois
/// element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaloisKeyShare {
    pub(crate) par: Arc<BfvParameters>,
    pub(crate) element: usize,
    pub(crate) crp: Arc<GaloisKeyCrp>,
    pub(crate) value: Vec<Vec<Poly>>,
}

impl GaloisKeyShare {
    /// Participate in a new Galois key generation protocol.
    ///
    /// 1. *Private input*: BFV secret key share
    /// 2. *Public input*: Galois element, and the common random polynomials
    pub fn new<R: RngCore + CryptoRng>(
        sk_share: &SecretKey,
        element: usize,
        crp: &Arc<GaloisKeyCrp>,
        rng: &mut R,
    ) -> Result<Self> {
        let par = sk_share.parameters().clone();
        if crp.par != par {
            return Err(Error::DefaultError(
                "Incompatible BFV parameters".to_string(),
            ));
        }
        check_galois_element(&par, element)?;

        let ctx = par.ctx_extended();
        let s = sk_share.poly_extended()?;
        let s_sub = sk_share.poly_substituted_extended(element)?;

        let value = izip!(&crp.value, par.gadget.iter())
            .map(|(crp_row, gadget_row)| {
                izip!(crp_row, gadget_row.iter())
                    .map(|(a, g)| {
                        let mut h = -(a * s.as_ref());
                        h.disallow_variable_time_computations();
                        h += &(g * s_sub.as_ref());
                        let e = Zeroizing::new(Poly::small(
                            ctx,
                            Representation::Ntt,
                            par.variance,
                            rng,
                        )?);
                        h += e.as_ref();
                        Ok(h)
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(element, "generated Galois key share");

        Ok(Self {
            par,
            element,
            crp: crp.clone(),
            value,
        })
    }

    /// A zero share for the Galois element `element` and the session of
    /// `crp`.
    pub fn allocate(element: usize, crp: &Arc<GaloisKeyCrp>) -> Result<Self> {
        check_galois_element(&crp.par, element)?;
        let ctx = crp.par.ctx_extended();
        let value = crp
            .value
            .iter()
            .map(|row| {
                row.iter()
                    .map(|_| Poly::zero(ctx, Representation::Ntt))
                    .collect()
            })
            .collect();
        Ok(Self {
            par: crp.par.clone(),
            element,
            crp: crp.clone(),
            value,
        })
    }

    /// The Galois element of the share.
    pub fn element(&self) -> usize {
        self.element
    }

    fn shape(&self) -> (usize, usize) {
        (
            self.value.len(),
            self.value.first().map_or(0, |row| row.len()),
        )
    }

    /// Deserialize a share computed against `crp`.
    pub fn deserialize(bytes: &[u8], crp: &Arc<GaloisKeyCrp>) -> Result<Self> {
        let proto: GaloisKeyShareProto =
            Message::decode(bytes).map_err(|_| Error::SerializationError)?;
        let (digits, windows) = (proto.digits as usize, proto.windows as usize);
        if digits != crp.digits() || windows != crp.windows() || proto.h.len() != digits * windows
        {
            return Err(Error::SerializationError);
        }
        let element = proto.element as usize;
        check_galois_element(&crp.par, element).map_err(|_| Error::SerializationError)?;

        let ctx = crp.par.ctx_extended();
        let mut entries = proto
            .h
            .iter()
            .map(|h| Ok(Poly::from_bytes(h, ctx)?))
            .collect::<Result<Vec<_>>>()?
            .into_iter();
        let value = (0..digits)
            .map(|_| entries.by_ref().take(windows).collect_vec())
            .collect();
        Ok(Self {
            par: crp.par.clone(),
            element,
            crp: crp.clone(),
            value,
        })
    }
}

impl ShareAccumulator for GaloisKeyShare {
    fn aggregate_share(&mut self, share: &Self) -> Result<()> {
        if self.par != share.par {
            return Err(Error::Aggregation("incompatible parameters".to_string()));
        }
        if self.element != share.element {
            return Err(Error::Aggregation(format!(
                "share is for the Galois element {}, accumulator for {}",
                share.element, self.element
            )));
        }
        if self.shape() != share.shape() {
            return Err(Error::share_dimension_mismatch(self.shape(), share.shape()));
        }
        if !Arc::ptr_eq(&self.crp, &share.crp) && self.crp != share.crp {
            return Err(Error::Aggregation(
                "share was generated with other common random polynomials".to_string(),
            ));
        }
        for (acc, sh) in self.value.iter_mut().flatten().zip(share.value.iter().flatten()) {
            *acc += sh;
        }
        Ok(())
    }
}

impl Aggregate<GaloisKeyShare> for GaloisKey {
    #[instrument(skip_all)]
    fn from_shares<T>(iter: T) -> Result<Self>
    where
        T: IntoIterator<Item = GaloisKeyShare>,
    {
        let acc = GaloisKeyShare::from_shares(iter)?;
        debug!(element = acc.element, "aggregated Galois key shares");

        let value = izip!(acc.value, acc.crp.value.iter())
            .map(|(h_row, a_row)| {
                izip!(h_row, a_row)
                    .map(|(mut b, a)| {
                        let mut a = a.clone();
                        b.disallow_variable_time_computations();
                        a.disallow_variable_time_computations();
                        [b, a]
                    })
                    .collect_vec()
            })
            .collect_vec();
        let ksk = EvaluationKey::from_entries(&acc.par, value)?;
        GaloisKey::from_evaluation_key(acc.element, ksk)
    }
}

impl Serialize for GaloisKeyShare {
    fn to_bytes(&self) -> Vec<u8> {
        let (digits, windows) = self.shape();
        GaloisKeyShareProto {
            h: self.value.iter().flatten().map(|h| h.to_bytes()).collect(),
            digits: digits as u32,
            windows: windows as u32,
            element: self.element as u32,
        }
        .encode_to_vec()
    }
}
