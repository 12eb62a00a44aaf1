//! Parallel evaluation of a product tree over a worker pool.
//!
//! The inputs are multiplied pairwise, level by level, until one ciphertext
//! remains. Each level is a barrier: its products are all computed before the
//! next level starts.

use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::bfv::{Ciphertext, Evaluator};
use crate::{Error, Result};

/// Configuration of an [`EvaluationTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Number of worker threads.
    pub workers: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

impl OrchestratorConfig {
    /// A configuration with `workers` threads, which must be positive.
    pub fn new(workers: usize) -> Result<Self> {
        let config = Self { workers };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::UnspecifiedInput(
                "The number of workers must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Measurements of one level of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelReport {
    /// Depth of the level, starting at 1 for the products of the inputs.
    pub depth: usize,
    /// Number of products computed at this level.
    pub tasks: usize,
    /// Wall time of the level.
    pub elapsed: Duration,
}

/// Measurements of a reduction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeReport {
    /// One entry per level, from the leaves to the root.
    pub levels: Vec<LevelReport>,
}

impl TreeReport {
    /// Total wall time of the levels.
    pub fn elapsed(&self) -> Duration {
        self.levels.iter().map(|l| l.elapsed).sum()
    }

    /// Total number of products.
    pub fn tasks(&self) -> usize {
        self.levels.iter().map(|l| l.tasks).sum()
    }
}

/// Binary product tree evaluated on a dedicated thread pool.
#[derive(Debug)]
pub struct EvaluationTree {
    config: OrchestratorConfig,
    pool: ThreadPool,
}

impl EvaluationTree {
    /// Creates the worker pool described by `config`.
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("mhe-worker-{i}"))
            .build()
            .map_err(|e| Error::DefaultError(format!("Cannot build the worker pool: {e}")))?;
        Ok(Self { config, pool })
    }

    /// The configuration of the tree.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Multiplies the `inputs` together with relinearization, pairing
    /// neighbours at every level. With an odd count the last ciphertext of a
    /// level is carried unchanged to the next one. Each worker uses its own
    /// shallow copy of `evaluator`.
    #[instrument(skip_all, fields(inputs = inputs.len(), workers = self.config.workers))]
    pub fn reduce(
        &self,
        evaluator: &Evaluator,
        inputs: Vec<Ciphertext>,
    ) -> Result<(Ciphertext, TreeReport)> {
        if inputs.is_empty() {
            return Err(Error::Precondition(
                "the product tree needs at least one input".to_string(),
            ));
        }

        let mut report = TreeReport::default();
        let mut level = inputs;
        while level.len() > 1 {
            let start = Instant::now();
            let tasks = level.len() / 2;
            let next = self.pool.install(|| {
                level
                    .par_chunks(2)
                    .map_init(
                        || evaluator.shallow_copy(),
                        |ev, pair| match pair {
                            [a, b] => ev.mul_relin(a, b),
                            [carried] => Ok(carried.clone()),
                            _ => Err(Error::DefaultError(
                                "The product tree paired more than two inputs".to_string(),
                            )),
                        },
                    )
                    .collect::<Result<Vec<_>>>()
            })?;
            level = next;
            let elapsed = start.elapsed();
            let depth = report.levels.len() + 1;
            info!(
                level = depth,
                tasks,
                elapsed_ms = elapsed.as_millis() as u64,
                "product tree level done"
            );
            report.levels.push(LevelReport {
                depth,
                tasks,
                elapsed,
            });
        }

        let root = level
            .pop()
            .ok_or_else(|| Error::DefaultError("The product tree is empty".to_string()))?;
        Ok((root, report))
    }
}

#[cfg(test)]
mod tests {
    use super::{EvaluationTree, OrchestratorConfig};
    use crate::bfv::{
        BfvParameters, Ciphertext, Encoding, EvaluationKeySet, Evaluator, Plaintext,
        RelinearizationKey, SecretKey,
    };
    use crate::Error;
    use rand::thread_rng;
    use std::error::Error as StdError;

    #[test]
    fn config() {
        assert!(OrchestratorConfig::new(0).is_err());
        assert_eq!(OrchestratorConfig::new(3).map(|c| c.workers), Ok(3));
        assert!(OrchestratorConfig::default().workers >= 1);
        assert!(EvaluationTree::new(OrchestratorConfig { workers: 0 }).is_err());
    }

    #[test]
    fn input_count() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(3, 16);
        let sk = SecretKey::random(&par, &mut rng);
        let ev = Evaluator::new(&par, EvaluationKeySet::new())?;
        let tree = EvaluationTree::new(OrchestratorConfig::new(2)?)?;

        assert!(matches!(
            tree.reduce(&ev, vec![]),
            Err(Error::Precondition(_))
        ));
        let pt = Plaintext::zero(Encoding::simd(), &par)?;
        let inputs = (0..2)
            .map(|_| sk.try_encrypt(&pt, &mut rng))
            .collect::<crate::Result<Vec<_>>>()?;

        // A single input is returned as is.
        let (root, report) = tree.reduce(&ev, inputs[..1].to_vec())?;
        assert_eq!(root, inputs[0]);
        assert!(report.levels.is_empty());

        // Workers fail without a relinearization key.
        assert!(matches!(
            tree.reduce(&ev, inputs[..2].to_vec()),
            Err(Error::MissingKey(_))
        ));
        Ok(())
    }

    #[test]
    fn matches_sequential_products() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(4, 16);
        let sk = SecretKey::random(&par, &mut rng);
        let rk = RelinearizationKey::new(&sk, &mut rng)?;
        let ev = Evaluator::new(&par, EvaluationKeySet::new().with_relinearization_key(rk))?;

        let values = (0..4)
            .map(|_| par.plaintext.random_vec(par.degree(), &mut rng))
            .collect::<Vec<_>>();
        let inputs = values
            .iter()
            .map(|v| {
                let pt = Plaintext::try_encode(v, Encoding::simd(), &par)?;
                sk.try_encrypt(&pt, &mut rng)
            })
            .collect::<crate::Result<Vec<_>>>()?;

        let tree = EvaluationTree::new(OrchestratorConfig::new(2)?)?;
        let (root, report) = tree.reduce(&ev, inputs.clone())?;
        assert_eq!(report.levels.len(), 2);
        assert_eq!(report.levels[0].tasks, 2);
        assert_eq!(report.levels[1].tasks, 1);
        assert_eq!(report.tasks(), 3);

        let left = ev.mul_relin(&inputs[0], &inputs[1])?;
        let right = ev.mul_relin(&inputs[2], &inputs[3])?;
        let sequential = ev.mul_relin(&left, &right)?;

        let decode = |ct: &Ciphertext| -> crate::Result<Vec<u64>> {
            sk.try_decrypt(ct)?.try_decode(Encoding::simd())
        };
        let expected = (0..par.degree())
            .map(|i| {
                values
                    .iter()
                    .fold(1u64, |acc, v| par.plaintext.mul(acc, v[i]))
            })
            .collect::<Vec<_>>();
        assert_eq!(decode(&root)?, expected);
        assert_eq!(decode(&sequential)?, expected);
        Ok(())
    }

    #[test]
    fn carries_odd_inputs() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let par = BfvParameters::default_arc(4, 16);
        let sk = SecretKey::random(&par, &mut rng);
        let rk = RelinearizationKey::new(&sk, &mut rng)?;
        let ev = Evaluator::new(&par, EvaluationKeySet::new().with_relinearization_key(rk))?;
        let tree = EvaluationTree::new(OrchestratorConfig::new(3)?)?;

        for count in [3, 5] {
            let values = (0..count)
                .map(|_| par.plaintext.random_vec(par.degree(), &mut rng))
                .collect::<Vec<_>>();
            let inputs = values
                .iter()
                .map(|v| {
                    let pt = Plaintext::try_encode(v, Encoding::simd(), &par)?;
                    sk.try_encrypt(&pt, &mut rng)
                })
                .collect::<crate::Result<Vec<_>>>()?;

            let (root, report) = tree.reduce(&ev, inputs)?;
            assert_eq!(report.tasks(), count - 1);
            let expected_levels = if count == 3 { vec![1, 1] } else { vec![2, 1, 1] };
            assert_eq!(
                report.levels.iter().map(|l| l.tasks).collect::<Vec<_>>(),
                expected_levels
            );

            let expected = (0..par.degree())
                .map(|i| {
                    values
                        .iter()
                        .fold(1u64, |acc, v| par.plaintext.mul(acc, v[i]))
                })
                .collect::<Vec<_>>();
            assert_eq!(
                sk.try_decrypt(&root)?.try_decode(Encoding::simd())?,
                expected
            );
        }
        Ok(())
    }
}
