//! Compiler entry points (spec.md §6): `compile` builds a [`CompiledResiduals`]
//! from a parameter vector and a residual-producing closure; `compile_async`
//! does the same in chunks, calling back after each one.

use crate::error::ScalarFlowError;
use crate::residuals::CompiledResiduals;
use crate::value::Value;
use tracing::info;

/// Builds every residual from `residual_fn(params)`, canonicalizes and
/// compiles each into the shared kernel pool, and returns the batch ready
/// for repeated evaluation.
pub fn compile(
    params: &[Value],
    residual_fn: impl Fn(&[Value]) -> Vec<Value>,
) -> Result<CompiledResiduals, ScalarFlowError> {
    let residuals = residual_fn(params);
    let compiled = CompiledResiduals::new(params, &residuals)?;
    info!(
        num_functions = compiled.num_functions(),
        kernel_count = compiled.kernel_count(),
        reuse_factor = compiled.kernel_reuse_factor(),
        "compiled residual batch"
    );
    Ok(compiled)
}

/// Builds and compiles residuals in chunks of `chunk_size`, invoking
/// `on_progress(done, total, percent)` after each chunk (spec.md §4.5). There
/// is no async runtime in this crate; the chunk boundary stands in for the
/// suspension point spec.md describes, so callers that want genuine
/// cooperative yielding should call this from their own async executor's
/// blocking-task facility.
pub fn compile_async(
    params: &[Value],
    residual_fn: impl Fn(&[Value]) -> Vec<Value>,
    chunk_size: usize,
    mut on_progress: impl FnMut(usize, usize, f64),
) -> Result<CompiledResiduals, ScalarFlowError> {
    let all = residual_fn(params);
    let total = all.len();
    let chunk_size = chunk_size.max(1);

    let mut compiled = CompiledResiduals::empty(params);
    for chunk in all.chunks(chunk_size) {
        compiled.extend(chunk)?;
        let done = compiled.num_functions();
        let percent = if total == 0 { 100.0 } else { done as f64 / total as f64 * 100.0 };
        on_progress(done, total, percent);
    }
    info!(
        num_functions = compiled.num_functions(),
        kernel_count = compiled.kernel_count(),
        reuse_factor = compiled.kernel_reuse_factor(),
        "compiled residual batch (chunked)"
    );
    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn compile_builds_residuals_from_closure() {
        let params = vec![Value::param(2.0, "a"), Value::param(3.0, "b")];
        let compiled = compile(&params, |p| vec![&p[0] + &p[1], &p[0] * &p[1]]).unwrap();
        assert_eq!(compiled.num_functions(), 2);
    }

    #[test]
    fn compile_async_reports_progress_per_chunk() {
        let params = vec![Value::param(1.0, "a")];
        let mut seen = Vec::new();
        let compiled = compile_async(
            &params,
            |p| (0..5).map(|i| &p[0] + i as f64).collect(),
            2,
            |done, total, percent| seen.push((done, total, percent)),
        )
        .unwrap();
        assert_eq!(compiled.num_functions(), 5);
        assert_eq!(seen, vec![(2, 5, 40.0), (4, 5, 80.0), (5, 5, 100.0)]);
    }
}
