//! Optimizer drivers (spec.md §4.7, §4.8) and the first-order optimizers
//! that supplement them.

pub mod lbfgs;
pub mod linalg;
pub mod linesearch;
pub mod lm;
pub mod options;
pub mod result;
pub mod sgd;

pub use lbfgs::{lbfgs, lbfgs_with_eval};
pub use lm::nonlinear_least_squares;
pub use options::{DampingMode, FirstOrderKind, FirstOrderOptions, LbfgsOptions, LmOptions};
pub use result::{ConvergenceReason, OptimizeResult};
pub use sgd::FirstOrderOptimizer;
