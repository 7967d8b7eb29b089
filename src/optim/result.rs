//! Optimizer result record (spec.md §6 "Result record").

/// Why an optimizer driver stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvergenceReason {
    GradientTolerance,
    CostTolerance,
    ParameterTolerance,
    MaxIterationsReached,
    NonFiniteObjective,
    StoppedByCaller,
    LineSearchFailed,
}

impl ConvergenceReason {
    pub fn is_success(self) -> bool {
        matches!(
            self,
            ConvergenceReason::GradientTolerance
                | ConvergenceReason::CostTolerance
                | ConvergenceReason::ParameterTolerance
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConvergenceReason::GradientTolerance => "gradient tolerance",
            ConvergenceReason::CostTolerance => "cost tolerance",
            ConvergenceReason::ParameterTolerance => "parameter tolerance",
            ConvergenceReason::MaxIterationsReached => "max iterations reached",
            ConvergenceReason::NonFiniteObjective => "non-finite objective",
            ConvergenceReason::StoppedByCaller => "stopped by caller",
            ConvergenceReason::LineSearchFailed => "line-search failed",
        }
    }
}

/// Outcome of an L-BFGS or Levenberg–Marquardt run.
#[derive(Clone, Debug)]
pub struct OptimizeResult {
    pub success: bool,
    pub iterations: usize,
    pub final_cost: f64,
    pub convergence_reason: ConvergenceReason,
    pub function_evaluations: usize,
    pub params: Vec<f64>,
}

impl OptimizeResult {
    pub(crate) fn new(
        params: Vec<f64>,
        final_cost: f64,
        iterations: usize,
        function_evaluations: usize,
        reason: ConvergenceReason,
    ) -> OptimizeResult {
        OptimizeResult {
            success: reason.is_success(),
            iterations,
            final_cost,
            convergence_reason: reason,
            function_evaluations,
            params,
        }
    }
}
