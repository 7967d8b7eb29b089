//! Kernel pool (spec.md §4.5): compiled kernels are keyed by canonical
//! signature and shared across every residual graph that canonicalizes to
//! the same shape, so a batch of N structurally identical residuals (spec.md
//! §8 property 7) compiles to one kernel reused N times rather than N
//! independent kernels.

use crate::canon::{canonicalize, Canon};
use crate::error::ScalarFlowError;
use crate::kernel::Kernel;
use crate::value::Value;
use std::collections::HashMap;
use tracing::debug;

/// One residual graph bound to its canonical parameter-slot mapping, ready
/// for batch evaluation against a shared [`Kernel`].
pub struct BoundResidual {
    pub(crate) kernel_index: usize,
    pub(crate) canon: Canon,
}

/// Deduplicating store of compiled [`Kernel`]s, plus the per-signature hit
/// count used to report the reuse factor (spec.md §6 `kernelReuseFactor`).
pub struct KernelPool {
    kernels: Vec<Kernel>,
    index_of_signature: HashMap<String, usize>,
    hits: Vec<usize>,
}

impl KernelPool {
    pub fn new() -> Self {
        KernelPool {
            kernels: Vec::new(),
            index_of_signature: HashMap::new(),
            hits: Vec::new(),
        }
    }

    /// Canonicalizes `root` against `params`, compiling a new kernel only
    /// the first time a signature is seen.
    pub fn intern(
        &mut self,
        root: &Value,
        params: &[Value],
    ) -> Result<BoundResidual, ScalarFlowError> {
        let canon = canonicalize(root, params);
        let kernel_index = match self.index_of_signature.get(&canon.signature) {
            Some(&idx) => {
                self.hits[idx] += 1;
                idx
            }
            None => {
                let kernel = Kernel::build(&canon)?;
                let idx = self.kernels.len();
                debug!(signature = %kernel.signature, index = idx, "compiled new kernel");
                self.kernels.push(kernel);
                self.hits.push(1);
                self.index_of_signature.insert(canon.signature.clone(), idx);
                idx
            }
        };
        Ok(BoundResidual { kernel_index, canon })
    }

    pub fn kernel(&self, index: usize) -> &Kernel {
        &self.kernels[index]
    }

    pub fn kernel_count(&self) -> usize {
        self.kernels.len()
    }

    /// Total number of residuals interned divided by the number of distinct
    /// kernels compiled for them — 1.0 when nothing was shared.
    pub fn reuse_factor(&self) -> f64 {
        if self.kernels.is_empty() {
            return 0.0;
        }
        let total: usize = self.hits.iter().sum();
        total as f64 / self.kernels.len() as f64
    }
}

impl Default for KernelPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn structurally_identical_residuals_share_one_kernel() {
        let mut pool = KernelPool::new();
        let mut bound = Vec::new();
        for i in 0..5 {
            let a = Value::weight(i as f64, None);
            let b = Value::weight((i * 2) as f64, None);
            let residual = &a - &b;
            bound.push(pool.intern(&residual, &[a, b]).unwrap());
        }
        assert_eq!(pool.kernel_count(), 1);
        assert!((pool.reuse_factor() - 5.0).abs() < 1e-12);
        assert_eq!(bound.len(), 5);
    }

    #[test]
    fn structurally_distinct_residuals_get_distinct_kernels() {
        let mut pool = KernelPool::new();
        let a = Value::weight(1.0, None);
        let b = Value::weight(2.0, None);
        pool.intern(&(&a + &b), &[a.clone(), b.clone()]).unwrap();
        pool.intern(&(&a * &b), &[a.clone(), b.clone()]).unwrap();
        assert_eq!(pool.kernel_count(), 2);
        assert!((pool.reuse_factor() - 1.0).abs() < 1e-12);
    }
}
