//! Compiled residual batch (spec.md §4.6): owns an ordered list of compiled
//! kernels bound to their slot tables, plus the parameter count fixed at
//! compile time. This is the object L-BFGS and Levenberg–Marquardt consume.

use crate::error::ScalarFlowError;
use crate::pool::{BoundResidual, KernelPool};
use crate::value::Value;

/// A batch of compiled residual procedures sharing one kernel pool.
pub struct CompiledResiduals {
    params: Vec<Value>,
    pool: KernelPool,
    bound: Vec<BoundResidual>,
}

impl CompiledResiduals {
    /// Compiles every residual in `residuals` against `params` up front.
    pub fn new(params: &[Value], residuals: &[Value]) -> Result<CompiledResiduals, ScalarFlowError> {
        let mut compiled = CompiledResiduals::empty(params);
        compiled.extend(residuals)?;
        Ok(compiled)
    }

    /// An empty batch with no residuals compiled yet, for incremental
    /// construction via [`CompiledResiduals::extend`] (used by
    /// [`crate::compile::compile_async`]).
    pub fn empty(params: &[Value]) -> CompiledResiduals {
        CompiledResiduals {
            params: params.to_vec(),
            pool: KernelPool::new(),
            bound: Vec::new(),
        }
    }

    /// Compiles and appends `residuals` to the batch.
    pub fn extend(&mut self, residuals: &[Value]) -> Result<(), ScalarFlowError> {
        for residual in residuals {
            let bound = self.pool.intern(residual, &self.params)?;
            self.bound.push(bound);
        }
        Ok(())
    }

    pub fn num_functions(&self) -> usize {
        self.bound.len()
    }

    pub fn num_parameters(&self) -> usize {
        self.params.len()
    }

    pub fn kernel_count(&self) -> usize {
        self.pool.kernel_count()
    }

    pub fn kernel_reuse_factor(&self) -> f64 {
        self.pool.reuse_factor()
    }

    fn eval_one(&self, index: usize, p: &[f64]) -> (f64, Vec<f64>) {
        let bound = &self.bound[index];
        let kernel = self.pool.kernel(bound.kernel_index);
        kernel.eval(p, self.params.len())
    }

    /// Evaluates every residual at `p`, returning each value and its full
    /// Jacobian row (length `num_parameters()`).
    pub fn evaluate(&self, p: &[f64]) -> Result<(Vec<f64>, Vec<Vec<f64>>), ScalarFlowError> {
        self.check_shape(p)?;
        let mut values = Vec::with_capacity(self.bound.len());
        let mut jacobian = Vec::with_capacity(self.bound.len());
        for i in 0..self.bound.len() {
            let (v, row) = self.eval_one(i, p);
            values.push(v);
            jacobian.push(row);
        }
        Ok((values, jacobian))
    }

    /// Returns `sum_i r_i(p)` and the gradient of that sum with respect to
    /// `p` (the elementwise sum of every residual's Jacobian row).
    pub fn evaluate_sum_with_gradient(&self, p: &[f64]) -> Result<(f64, Vec<f64>), ScalarFlowError> {
        self.check_shape(p)?;
        let mut sum = 0.0;
        let mut grad = vec![0.0; self.params.len()];
        for i in 0..self.bound.len() {
            let (v, row) = self.eval_one(i, p);
            sum += v;
            for (g, r) in grad.iter_mut().zip(row.iter()) {
                *g += r;
            }
        }
        Ok((sum, grad))
    }

    /// Evaluates the batch's single residual and its gradient. Only valid
    /// when the batch holds exactly one compiled function (the objective
    /// form, M = 1); any other count is a [`ScalarFlowError::Shape`].
    pub fn evaluate_gradient(&self, p: &[f64]) -> Result<(f64, Vec<f64>), ScalarFlowError> {
        if self.bound.len() != 1 {
            return Err(ScalarFlowError::Shape {
                context: "evaluate_gradient requires a single-output objective",
                expected: 1,
                actual: self.bound.len(),
            });
        }
        self.evaluate_sum_with_gradient(p)
    }

    fn check_shape(&self, p: &[f64]) -> Result<(), ScalarFlowError> {
        if p.len() != self.params.len() {
            return Err(ScalarFlowError::Shape {
                context: "CompiledResiduals::evaluate parameter vector",
                expected: self.params.len(),
                actual: p.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn evaluate_matches_graph_evaluation() {
        let a = Value::param(2.0, "a");
        let b = Value::param(3.0, "b");
        let residuals = vec![&a + &b, &a * &b];
        let compiled = CompiledResiduals::new(&[a, b], &residuals).unwrap();

        let (values, jac) = compiled.evaluate(&[5.0, 7.0]).unwrap();
        assert!((values[0] - 12.0).abs() < 1e-12);
        assert!((values[1] - 35.0).abs() < 1e-12);
        assert_eq!(jac[0], vec![1.0, 1.0]);
        assert_eq!(jac[1], vec![7.0, 5.0]);
    }

    #[test]
    fn evaluate_sum_with_gradient_sums_rows() {
        let a = Value::param(1.0, "a");
        let residuals = vec![a.square(), a.square()];
        let compiled = CompiledResiduals::new(&[a], &residuals).unwrap();
        let (sum, grad) = compiled.evaluate_sum_with_gradient(&[3.0]).unwrap();
        assert!((sum - 18.0).abs() < 1e-12);
        assert!((grad[0] - 12.0).abs() < 1e-12);
    }

    #[test]
    fn evaluate_gradient_rejects_multi_output_batch() {
        let a = Value::param(1.0, "a");
        let residuals = vec![a.square(), a.square()];
        let compiled = CompiledResiduals::new(&[a], &residuals).unwrap();
        let err = compiled.evaluate_gradient(&[3.0]).unwrap_err();
        assert!(matches!(err, ScalarFlowError::Shape { .. }));
    }

    #[test]
    fn evaluate_rejects_wrong_length_parameter_vector() {
        let a = Value::param(1.0, "a");
        let b = Value::param(2.0, "b");
        let residuals = vec![&a + &b];
        let compiled = CompiledResiduals::new(&[a, b], &residuals).unwrap();
        let err = compiled.evaluate(&[1.0]).unwrap_err();
        assert!(matches!(err, ScalarFlowError::Shape { .. }));
    }
}
