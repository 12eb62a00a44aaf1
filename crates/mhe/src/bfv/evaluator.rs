//! Homomorphic evaluation over BFV ciphertexts.
//!
//! An [`Evaluator`] pairs an immutable core (parameters, evaluation keys and
//! the automorphism cache), shared behind an `Arc`, with scratch buffers used
//! by key switching. [`Evaluator::shallow_copy`] shares the core and allocates
//! new scratch, so copies can run on different threads.

use crate::bfv::keys::check_galois_element;
use crate::bfv::{BfvParameters, Ciphertext, EvaluationKey, EvaluationKeySet, Plaintext};
use crate::{Error, Result};
use fhe_math::rq::{Poly, Representation, SubstitutionExponent};
use itertools::{EitherOrBoth, Itertools};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// An input of an evaluator operation: a [`Ciphertext`] or a [`Plaintext`].
/// A plaintext is a degree 0 operand.
pub trait Operand {
    /// The ring elements of the operand, in the NTT domain.
    fn elements(&self) -> &[Poly];

    /// The level of the operand.
    fn level(&self) -> usize;

    /// The encoding factor of the operand, if it carries one.
    fn operand_scale(&self) -> Option<f64>;

    /// The parameters of the operand.
    fn parameters(&self) -> &Arc<BfvParameters>;

    /// The elements of the operand at a level lower or equal to its own.
    fn elements_at_level(&self, level: usize) -> Result<Vec<Poly>>;

    /// Degree of the operand.
    fn degree(&self) -> usize {
        self.elements().len().saturating_sub(1)
    }

    /// Whether the operand holds no element.
    fn is_empty(&self) -> bool {
        self.elements().is_empty()
    }

    /// Whether the elements are in the NTT domain.
    fn is_ntt(&self) -> bool {
        self.elements()
            .first()
            .map_or(true, |p| p.representation() != &Representation::PowerBasis)
    }
}

impl Operand for Ciphertext {
    fn elements(&self) -> &[Poly] {
        &self.c
    }

    fn level(&self) -> usize {
        self.level
    }

    fn operand_scale(&self) -> Option<f64> {
        Some(self.scale)
    }

    fn parameters(&self) -> &Arc<BfvParameters> {
        &self.par
    }

    fn elements_at_level(&self, level: usize) -> Result<Vec<Poly>> {
        if level == self.level {
            Ok(self.c.clone())
        } else {
            let mut ct = self.clone();
            ct.mod_switch_to_level(level)?;
            Ok(ct.c)
        }
    }
}

impl Operand for Plaintext {
    fn elements(&self) -> &[Poly] {
        std::slice::from_ref(&self.poly_ntt)
    }

    fn level(&self) -> usize {
        self.level
    }

    fn operand_scale(&self) -> Option<f64> {
        None
    }

    fn parameters(&self) -> &Arc<BfvParameters> {
        &self.par
    }

    fn elements_at_level(&self, level: usize) -> Result<Vec<Poly>> {
        if level == self.level {
            Ok(vec![self.poly_ntt.clone()])
        } else if level < self.level {
            Ok(vec![Plaintext::scale_to_poly(&self.value, level, &self.par)?])
        } else {
            Err(Error::LevelMismatch {
                expected: self.level,
                found: level,
            })
        }
    }
}

/// Buffers used while key switching.
#[derive(Debug)]
struct Scratch {
    /// Accumulators over the extended context.
    acc: [Poly; 2],
    /// One power-of-2 window of a digit.
    digit: Vec<u64>,
}

impl Scratch {
    fn new(par: &BfvParameters) -> Self {
        let ctx = par.ctx_extended();
        Self {
            acc: [
                Poly::zero(ctx, Representation::Ntt),
                Poly::zero(ctx, Representation::Ntt),
            ],
            digit: Vec::with_capacity(par.degree()),
        }
    }
}

/// State shared by an evaluator and its shallow copies.
struct EvaluatorCore {
    par: Arc<BfvParameters>,
    keys: EvaluationKeySet,
    /// Substitution exponents indexed by (Galois element, level).
    automorphisms: HashMap<(usize, usize), SubstitutionExponent>,
}

impl Debug for EvaluatorCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluatorCore")
            .field("par", &self.par)
            .field("has_relinearization_key", &self.keys.has_relinearization_key())
            .field("galois_elements", &self.keys.galois_elements())
            .finish()
    }
}

impl EvaluatorCore {
    fn new(par: &Arc<BfvParameters>, keys: EvaluationKeySet) -> Result<Self> {
        if let Some(rk) = keys.relinearization_key() {
            if &rk.ksk.par != par {
                return Err(Error::DefaultError(
                    "Incompatible BFV parameters".to_string(),
                ));
            }
        }
        if let Some(pk) = keys.public_key() {
            if &pk.par != par {
                return Err(Error::DefaultError(
                    "Incompatible BFV parameters".to_string(),
                ));
            }
        }

        let mut automorphisms = HashMap::new();
        for element in keys.galois_elements() {
            if let Some(gk) = keys.galois_key(element) {
                if &gk.ksk.par != par {
                    return Err(Error::DefaultError(
                        "Incompatible BFV parameters".to_string(),
                    ));
                }
            }
            for level in 0..=par.max_level() {
                let exponent = SubstitutionExponent::new(par.ctx_at_level(level)?, element)?;
                automorphisms.insert((element, level), exponent);
            }
        }
        debug!(
            relinearization = keys.has_relinearization_key(),
            galois_keys = keys.galois_elements().len(),
            "evaluator created"
        );

        Ok(Self {
            par: par.clone(),
            keys,
            automorphisms,
        })
    }
}

/// Evaluates homomorphic operations with a set of evaluation keys.
#[derive(Debug)]
pub struct Evaluator {
    core: Arc<EvaluatorCore>,
    scratch: Arc<Mutex<Scratch>>,
}

impl Evaluator {
    /// Creates an evaluator for the parameters and the keys.
    pub fn new(par: &Arc<BfvParameters>, keys: EvaluationKeySet) -> Result<Self> {
        Ok(Self {
            core: Arc::new(EvaluatorCore::new(par, keys)?),
            scratch: Arc::new(Mutex::new(Scratch::new(par))),
        })
    }

    /// The parameters of the evaluator.
    pub fn parameters(&self) -> &Arc<BfvParameters> {
        &self.core.par
    }

    /// The evaluation keys of the evaluator.
    pub fn keys(&self) -> &EvaluationKeySet {
        &self.core.keys
    }

    /// An evaluator sharing the keys and the automorphism cache, with its own
    /// scratch buffers. It can be used concurrently with `self`.
    pub fn shallow_copy(&self) -> Self {
        Self {
            core: self.core.clone(),
            scratch: Arc::new(Mutex::new(Scratch::new(&self.core.par))),
        }
    }

    /// An evaluator with other keys, sharing the scratch buffers of `self`.
    /// Operations of the two evaluators are serialized on the scratch.
    pub fn with_key(&self, keys: EvaluationKeySet) -> Result<Self> {
        Ok(Self {
            core: Arc::new(EvaluatorCore::new(&self.core.par, keys)?),
            scratch: self.scratch.clone(),
        })
    }

    fn check_parameters(&self, op: &dyn Operand) -> Result<()> {
        if op.parameters() != &self.core.par {
            Err(Error::DefaultError(
                "Incompatible BFV parameters".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    /// Checks the operands of a binary operation and returns the degree and
    /// the level of the result, i.e. the largest degree and the smallest level
    /// of the inputs.
    pub fn check_binary(
        &self,
        op0: &dyn Operand,
        op1: &dyn Operand,
        out: &dyn Operand,
        out_min_degree: usize,
    ) -> Result<(usize, usize)> {
        if op0.is_empty() {
            return Err(Error::empty_operand("op0"));
        }
        if op1.is_empty() {
            return Err(Error::empty_operand("op1"));
        }
        if op0.degree() + op1.degree() == 0 {
            return Err(Error::plaintext_operands());
        }
        if out.degree() < out_min_degree || (out_min_degree > 0 && out.is_empty()) {
            return Err(Error::output_degree_too_small(out.degree(), out_min_degree));
        }
        if !op0.is_ntt() {
            return Err(Error::ntt_flag_mismatch("op0", true));
        }
        if !op1.is_ntt() {
            return Err(Error::ntt_flag_mismatch("op1", true));
        }
        self.check_parameters(op0)?;
        self.check_parameters(op1)?;
        Ok((
            op0.degree().max(op1.degree()),
            op0.level().min(op1.level()),
        ))
    }

    /// Checks the operand of a unary operation.
    pub fn check_unary(&self, op: &dyn Operand, out: &dyn Operand) -> Result<()> {
        if op.is_empty() {
            return Err(Error::empty_operand("op"));
        }
        if !op.is_ntt() {
            return Err(Error::ntt_flag_mismatch("op", true));
        }
        if !out.is_ntt() {
            return Err(Error::ntt_flag_mismatch("out", true));
        }
        self.check_parameters(op)
    }

    fn write_out(&self, out: &mut Ciphertext, c: Vec<Poly>, level: usize, scale: f64) {
        out.par = self.core.par.clone();
        out.c = c;
        out.level = level;
        out.scale = scale;
    }

    /// A zero ciphertext able to hold a result of `degree` at `level`.
    fn output(&self, degree: usize, level: usize) -> Result<Ciphertext> {
        Ciphertext::zero(&self.core.par, degree, level.min(self.core.par.max_level()))
    }

    fn common_scale(op0: &dyn Operand, op1: &dyn Operand) -> Result<f64> {
        match (op0.operand_scale(), op1.operand_scale()) {
            (Some(s0), Some(s1)) if s0.to_bits() != s1.to_bits() => {
                Err(Error::ScaleMismatch(s0, s1))
            }
            (s0, s1) => Ok(s0.or(s1).unwrap_or(1.0)),
        }
    }

    /// Key switches `c` at `level` with `key`, using the scratch buffers.
    fn switch_poly(&self, c: &Poly, level: usize, key: &EvaluationKey) -> Result<(Poly, Poly)> {
        if key.par != self.core.par {
            return Err(Error::DefaultError(
                "Incompatible BFV parameters".to_string(),
            ));
        }
        let mut scratch = self
            .scratch
            .lock()
            .map_err(|_| Error::DefaultError("Scratch buffers are poisoned".to_string()))?;
        let Scratch { acc, digit } = &mut *scratch;
        key.inner_product_into(c, level, acc, digit)?;
        key.mod_down(acc, level)
    }

    /// Switches the last element of `ct` with `key`, writing into `out` a
    /// ciphertext of degree `max(1, deg(ct) - 1)`. With a degree 1 input, this
    /// changes the key the ciphertext decrypts under.
    pub fn key_switch_into(
        &self,
        ct: &Ciphertext,
        key: &EvaluationKey,
        out: &mut Ciphertext,
    ) -> Result<()> {
        self.check_unary(ct, out)?;
        if ct.degree() == 0 {
            return Err(Error::unexpected_degree(0, 1));
        }
        let (d0, d1) = self.switch_poly(&ct.c[ct.degree()], ct.level, key)?;
        let mut c = ct.c[..ct.degree()].to_vec();
        c[0] += &d0;
        if c.len() == 1 {
            c.push(d1);
        } else {
            c[1] += &d1;
        }
        self.write_out(out, c, ct.level, ct.scale);
        Ok(())
    }

    /// Switches the last element of `ct` with `key`.
    pub fn key_switch(&self, ct: &Ciphertext, key: &EvaluationKey) -> Result<Ciphertext> {
        let mut out = self.output(1, ct.level)?;
        self.key_switch_into(ct, key, &mut out)?;
        Ok(out)
    }

    /// Relinearizes a degree 2 ciphertext into `out`.
    pub fn relinearize_into(&self, ct: &Ciphertext, out: &mut Ciphertext) -> Result<()> {
        self.check_unary(ct, out)?;
        if ct.degree() != 2 {
            return Err(Error::unexpected_degree(ct.degree(), 2));
        }
        let rk = self
            .core
            .keys
            .relinearization_key()
            .ok_or_else(|| Error::MissingKey("relinearization key".to_string()))?;
        self.key_switch_into(ct, &rk.ksk, out)
    }

    /// Relinearizes a degree 2 ciphertext.
    pub fn relinearize(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        let mut out = self.output(1, ct.level)?;
        self.relinearize_into(ct, &mut out)?;
        Ok(out)
    }

    /// Applies the automorphism `x -> x^galois_element` to a degree 1
    /// ciphertext, writing into `out` a ciphertext that decrypts under the
    /// original key.
    pub fn automorphism_into(
        &self,
        ct: &Ciphertext,
        galois_element: usize,
        out: &mut Ciphertext,
    ) -> Result<()> {
        self.check_unary(ct, out)?;
        if ct.degree() != 1 {
            return Err(Error::unexpected_degree(ct.degree(), 1));
        }
        check_galois_element(&self.core.par, galois_element)?;
        let gk = self.core.keys.galois_key(galois_element).ok_or_else(|| {
            Error::MissingKey(format!("Galois key for element {galois_element}"))
        })?;
        let exponent = self
            .core
            .automorphisms
            .get(&(galois_element, ct.level))
            .ok_or_else(|| {
                Error::MissingKey(format!("Galois key for element {galois_element}"))
            })?;

        let mut c0 = ct.c[0].substitute(exponent)?;
        let c1 = ct.c[1].substitute(exponent)?;
        let (d0, d1) = self.switch_poly(&c1, ct.level, &gk.ksk)?;
        c0 += &d0;
        self.write_out(out, vec![c0, d1], ct.level, ct.scale);
        Ok(())
    }

    /// Applies the automorphism `x -> x^galois_element` to a degree 1
    /// ciphertext.
    pub fn automorphism(&self, ct: &Ciphertext, galois_element: usize) -> Result<Ciphertext> {
        let mut out = self.output(1, ct.level)?;
        self.automorphism_into(ct, galois_element, &mut out)?;
        Ok(out)
    }

    /// Rotates the two rows of the SIMD slots to the left by `steps`.
    pub fn rotate_columns(&self, ct: &Ciphertext, steps: usize) -> Result<Ciphertext> {
        let g = self.core.par.galois_element_for_column_rotation(steps);
        self.automorphism(ct, g)
    }

    /// Swaps the two rows of the SIMD slots.
    pub fn rotate_rows(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        let g = self.core.par.galois_element_for_row_rotation();
        self.automorphism(ct, g)
    }

    fn add_sub_into(
        &self,
        op0: &dyn Operand,
        op1: &dyn Operand,
        out: &mut Ciphertext,
        negate: bool,
    ) -> Result<()> {
        let min_degree = op0.degree().max(op1.degree());
        let (degree, level) = self.check_binary(op0, op1, out, min_degree)?;
        let scale = Self::common_scale(op0, op1)?;
        let e0 = op0.elements_at_level(level)?;
        let e1 = op1.elements_at_level(level)?;

        let c = e0
            .into_iter()
            .zip_longest(e1)
            .map(|pair| match pair {
                EitherOrBoth::Both(a, b) if negate => &a - &b,
                EitherOrBoth::Both(a, b) => &a + &b,
                EitherOrBoth::Left(a) => a,
                EitherOrBoth::Right(b) if negate => -&b,
                EitherOrBoth::Right(b) => b,
            })
            .collect_vec();
        debug_assert_eq!(c.len(), degree + 1);
        self.write_out(out, c, level, scale);
        Ok(())
    }

    /// Adds two operands into `out`.
    pub fn add_into(&self, op0: &dyn Operand, op1: &dyn Operand, out: &mut Ciphertext) -> Result<()> {
        self.add_sub_into(op0, op1, out, false)
    }

    /// Adds two operands.
    pub fn add(&self, op0: &dyn Operand, op1: &dyn Operand) -> Result<Ciphertext> {
        let mut out = self.output(op0.degree().max(op1.degree()), op0.level().min(op1.level()))?;
        self.add_into(op0, op1, &mut out)?;
        Ok(out)
    }

    /// Subtracts `op1` from `op0` into `out`.
    pub fn sub_into(&self, op0: &dyn Operand, op1: &dyn Operand, out: &mut Ciphertext) -> Result<()> {
        self.add_sub_into(op0, op1, out, true)
    }

    /// Subtracts `op1` from `op0`.
    pub fn sub(&self, op0: &dyn Operand, op1: &dyn Operand) -> Result<Ciphertext> {
        let mut out = self.output(op0.degree().max(op1.degree()), op0.level().min(op1.level()))?;
        self.sub_into(op0, op1, &mut out)?;
        Ok(out)
    }

    /// Negates a ciphertext.
    pub fn neg(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        let mut out = self.output(ct.degree(), ct.level)?;
        self.check_unary(ct, &out)?;
        let c = ct.c.iter().map(|ci| -ci).collect();
        self.write_out(&mut out, c, ct.level, ct.scale);
        Ok(out)
    }

    /// Multiplies two operands into `out`, without relinearization. The
    /// result has degree `deg(op0) + deg(op1)` and its scale is the product
    /// of the scales.
    pub fn mul_into(&self, op0: &dyn Operand, op1: &dyn Operand, out: &mut Ciphertext) -> Result<()> {
        let (_, level) = self.check_binary(op0, op1, out, op0.degree() + op1.degree())?;
        let degree = op0.degree() + op1.degree();
        let scale = op0.operand_scale().unwrap_or(1.0) * op1.operand_scale().unwrap_or(1.0);
        let mp = &self.core.par.mul_params[level];

        let extend = |elements: Vec<Poly>| -> Result<Vec<Poly>> {
            elements
                .into_iter()
                .map(|mut p| -> Result<Poly> {
                    p.change_representation(Representation::PowerBasis);
                    let mut q = p.scale(&mp.extender)?;
                    q.change_representation(Representation::Ntt);
                    Ok(q)
                })
                .collect()
        };
        let e0 = extend(op0.elements_at_level(level)?)?;
        let e1 = extend(op1.elements_at_level(level)?)?;

        let mut c = (0..=degree)
            .map(|_| Poly::zero(&mp.to, Representation::Ntt))
            .collect::<Vec<_>>();
        for (i, a) in e0.iter().enumerate() {
            for (j, b) in e1.iter().enumerate() {
                c[i + j] += &(a * b);
            }
        }
        for p in c.iter_mut() {
            p.change_representation(Representation::PowerBasis);
            *p = p.scale(&mp.down_scaler)?;
            p.change_representation(Representation::Ntt);
        }

        self.write_out(out, c, level, scale);
        Ok(())
    }

    /// Multiplies two operands, without relinearization.
    pub fn mul(&self, op0: &dyn Operand, op1: &dyn Operand) -> Result<Ciphertext> {
        let mut out = self.output(op0.degree() + op1.degree(), op0.level().min(op1.level()))?;
        self.mul_into(op0, op1, &mut out)?;
        Ok(out)
    }

    /// Multiplies two operands and relinearizes a degree 2 product.
    pub fn mul_relin(&self, op0: &dyn Operand, op1: &dyn Operand) -> Result<Ciphertext> {
        let product = self.mul(op0, op1)?;
        if product.degree() == 2 {
            self.relinearize(&product)
        } else {
            Ok(product)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Evaluator;
    use crate::bfv::{
        BfvParameters, Ciphertext, Encoding, EvaluationKeySet, GaloisKey, Plaintext,
        RelinearizationKey, SecretKey,
    };
    use crate::Error;
    use fhe_math::rq::Representation;
    use rand::thread_rng;
    use std::error::Error as StdError;
    use std::sync::Arc;

    fn encrypt(
        sk: &SecretKey,
        v: &[u64],
        par: &Arc<BfvParameters>,
    ) -> Result<Ciphertext, Box<dyn StdError>> {
        let pt = Plaintext::try_encode(v, Encoding::simd(), par)?;
        Ok(sk.try_encrypt(&pt, &mut thread_rng())?)
    }

    fn decrypt(sk: &SecretKey, ct: &Ciphertext) -> Result<Vec<u64>, Box<dyn StdError>> {
        Ok(sk.try_decrypt(ct)?.try_decode(Encoding::simd())?)
    }

    #[test]
    fn preconditions() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(2, 16);
        let sk = SecretKey::random(&par, &mut rng);
        let ev = Evaluator::new(&par, EvaluationKeySet::new())?;
        let ct = encrypt(&sk, &[1, 2, 3], &par)?;
        let pt = Plaintext::try_encode(&[1u64], Encoding::simd(), &par)?;
        let empty = Ciphertext::empty(&par);

        assert!(matches!(ev.add(&empty, &ct), Err(Error::Precondition(_))));
        assert!(matches!(ev.add(&ct, &empty), Err(Error::Precondition(_))));
        assert_eq!(
            ev.add(&pt, &pt).err(),
            Some(Error::plaintext_operands())
        );

        let mut small = Ciphertext::zero(&par, 1, par.max_level())?;
        assert_eq!(
            ev.mul_into(&ct, &ct, &mut small).err(),
            Some(Error::output_degree_too_small(1, 2))
        );

        let mut power = ct.clone();
        power
            .c
            .iter_mut()
            .for_each(|p| p.change_representation(Representation::PowerBasis));
        assert_eq!(
            ev.add(&power, &ct).err(),
            Some(Error::ntt_flag_mismatch("op0", true))
        );

        assert!(matches!(
            ev.relinearize(&ev.mul(&ct, &ct)?),
            Err(Error::MissingKey(_))
        ));
        assert!(matches!(ev.rotate_rows(&ct), Err(Error::MissingKey(_))));
        assert!(matches!(ev.relinearize(&ct), Err(Error::Precondition(_))));

        let mut scaled = ct.clone();
        scaled.set_scale(2.0);
        assert_eq!(
            ev.add(&ct, &scaled).err(),
            Some(Error::ScaleMismatch(1.0, 2.0))
        );
        Ok(())
    }

    #[test]
    fn arithmetic() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(2, 16);
        let t = &par.plaintext;
        let sk = SecretKey::random(&par, &mut rng);
        let rk = RelinearizationKey::new(&sk, &mut rng)?;
        let ev = Evaluator::new(&par, EvaluationKeySet::new().with_relinearization_key(rk))?;

        let a = t.random_vec(par.degree(), &mut rng);
        let b = t.random_vec(par.degree(), &mut rng);
        let ct_a = encrypt(&sk, &a, &par)?;
        let ct_b = encrypt(&sk, &b, &par)?;
        let pt_b = Plaintext::try_encode(&b, Encoding::simd(), &par)?;

        let mut expected = a.clone();
        t.add_vec(&mut expected, &b);
        assert_eq!(decrypt(&sk, &ev.add(&ct_a, &ct_b)?)?, expected);
        assert_eq!(decrypt(&sk, &ev.add(&ct_a, &pt_b)?)?, expected);

        let mut expected = a.clone();
        t.sub_vec(&mut expected, &b);
        assert_eq!(decrypt(&sk, &ev.sub(&ct_a, &ct_b)?)?, expected);
        assert_eq!(decrypt(&sk, &ev.sub(&ct_a, &pt_b)?)?, expected);

        let mut expected = a.clone();
        t.neg_vec(&mut expected);
        assert_eq!(decrypt(&sk, &ev.neg(&ct_a)?)?, expected);

        let mut expected = a.clone();
        t.mul_vec(&mut expected, &b);
        let product = ev.mul(&ct_a, &ct_b)?;
        assert_eq!(product.degree(), 2);
        assert_eq!(decrypt(&sk, &product)?, expected);
        let relinearized = ev.relinearize(&product)?;
        assert_eq!(relinearized.degree(), 1);
        assert_eq!(decrypt(&sk, &relinearized)?, expected);
        assert_eq!(decrypt(&sk, &ev.mul_relin(&ct_a, &ct_b)?)?, expected);
        assert_eq!(decrypt(&sk, &ev.mul(&ct_a, &pt_b)?)?, expected);

        // Operands at different levels meet at the lowest one.
        let mut low = ct_b.clone();
        low.mod_switch_to_next_level()?;
        let product = ev.mul_relin(&ct_a, &low)?;
        assert_eq!(product.level, low.level);
        assert_eq!(decrypt(&sk, &product)?, expected);

        let mut ct_a2 = ct_a.clone();
        ct_a2.set_scale(3.0);
        let mut ct_b2 = ct_b.clone();
        ct_b2.set_scale(5.0);
        assert_eq!(ev.mul(&ct_a2, &ct_b2)?.scale(), 15.0);
        Ok(())
    }

    #[test]
    fn rotations() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(2, 16);
        let row_size = par.degree() >> 1;
        let sk = SecretKey::random(&par, &mut rng);

        let mut keys = EvaluationKeySet::new();
        let g_row = par.galois_element_for_row_rotation();
        keys.insert_galois_key(GaloisKey::new(&sk, g_row, &mut rng)?);
        for i in 1..row_size {
            let g = par.galois_element_for_column_rotation(i);
            keys.insert_galois_key(GaloisKey::new(&sk, g, &mut rng)?);
        }
        let ev = Evaluator::new(&par, keys)?;

        let v = par.plaintext.random_vec(par.degree(), &mut rng);
        let ct = encrypt(&sk, &v, &par)?;

        for i in 1..row_size {
            let mut expected = vec![0u64; par.degree()];
            expected[..row_size - i].copy_from_slice(&v[i..row_size]);
            expected[row_size - i..row_size].copy_from_slice(&v[..i]);
            expected[row_size..2 * row_size - i].copy_from_slice(&v[row_size + i..]);
            expected[2 * row_size - i..].copy_from_slice(&v[row_size..row_size + i]);
            assert_eq!(decrypt(&sk, &ev.rotate_columns(&ct, i)?)?, expected);
        }

        let mut expected = vec![0u64; par.degree()];
        expected[..row_size].copy_from_slice(&v[row_size..]);
        expected[row_size..].copy_from_slice(&v[..row_size]);
        assert_eq!(decrypt(&sk, &ev.rotate_rows(&ct)?)?, expected);

        // Applying an automorphism and its inverse is the identity.
        for i in 1..row_size {
            let g = par.galois_element_for_column_rotation(i);
            let g_inv = par.inverse_galois_element(g);
            if ev.keys().has_galois_key(g_inv) {
                let back = ev.automorphism(&ev.automorphism(&ct, g)?, g_inv)?;
                assert_eq!(decrypt(&sk, &back)?, v);
            }
        }
        let back = ev.rotate_rows(&ev.rotate_rows(&ct)?)?;
        assert_eq!(decrypt(&sk, &back)?, v);
        Ok(())
    }

    #[test]
    fn key_switch_changes_key() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(3, 16);
        let sk_in = SecretKey::random(&par, &mut rng);
        let sk_out = SecretKey::random(&par, &mut rng);
        let ksk = crate::bfv::EvaluationKey::new(&sk_out, &*sk_in.poly_extended()?, &mut rng)?;
        let ev = Evaluator::new(&par, EvaluationKeySet::new())?;

        let v = par.plaintext.random_vec(par.degree(), &mut rng);
        let ct = encrypt(&sk_in, &v, &par)?;
        for level in (0..=par.max_level()).rev() {
            let mut ct = ct.clone();
            ct.mod_switch_to_level(level)?;
            let switched = ev.key_switch(&ct, &ksk)?;
            assert_eq!(switched.degree(), 1);
            assert_eq!(switched.level, level);
            assert_eq!(decrypt(&sk_out, &switched)?, v);
        }
        Ok(())
    }

    #[test]
    fn shallow_copies_are_independent() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(2, 16);
        let sk = SecretKey::random(&par, &mut rng);
        let rk = RelinearizationKey::new(&sk, &mut rng)?;
        let ev = Evaluator::new(&par, EvaluationKeySet::new().with_relinearization_key(rk))?;

        let a = par.plaintext.random_vec(par.degree(), &mut rng);
        let b = par.plaintext.random_vec(par.degree(), &mut rng);
        let ct_a = encrypt(&sk, &a, &par)?;
        let ct_b = encrypt(&sk, &b, &par)?;
        let reference = ev.mul_relin(&ct_a, &ct_b)?;

        let results = std::thread::scope(|scope| {
            let handles = (0..4)
                .map(|_| {
                    let copy = ev.shallow_copy();
                    let (ct_a, ct_b) = (&ct_a, &ct_b);
                    scope.spawn(move || copy.mul_relin(ct_a, ct_b))
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|h| h.join().expect("worker panicked"))
                .collect::<Vec<_>>()
        });
        for result in results {
            assert_eq!(result?, reference);
        }

        let other = ev.with_key(EvaluationKeySet::new())?;
        assert!(Arc::ptr_eq(&ev.scratch, &other.scratch));
        assert!(!other.keys().has_relinearization_key());
        assert!(!Arc::ptr_eq(&ev.scratch, &ev.shallow_copy().scratch));
        Ok(())
    }
}
