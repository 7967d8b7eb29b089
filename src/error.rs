//! Boundary error types.
//!
//! Per the error-handling design: primitive arithmetic never fails (it
//! regularizes near-domain-boundary inputs instead, see [`crate::value`]),
//! and optimizers never throw for numerical reasons (they report outcome via
//! [`crate::optim::OptimizeResult`]). Only the two fail-fast boundaries —
//! shape mismatches at loss/residual construction, and an unregistered
//! operator tag at compile time — surface as a typed error.

use crate::value::Op;

/// Errors raised at a boundary, before or during graph compilation.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ScalarFlowError {
    /// Two inputs that must have matching lengths did not.
    #[error("shape mismatch: {context} expected length {expected}, got {actual}")]
    Shape {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The compiler walked a node whose operator tag has no registry entry.
    #[error("no compiler registry entry for operator {op_name}")]
    Compilation { op_name: &'static str },

    /// Levenberg-Marquardt exhausted its damping-increase retry budget
    /// without finding a numerically solvable augmented normal-equations
    /// matrix.
    #[error("dense solve failed after {attempts} damping retries")]
    Solve { attempts: usize },
}

pub(crate) fn op_name(op: &Op) -> &'static str {
    match op {
        Op::Leaf => "leaf",
        Op::Add(..) => "add",
        Op::Sub(..) => "sub",
        Op::Mul(..) => "mul",
        Op::Div(..) => "div",
        Op::PowConst(..) => "pow_const",
        Op::PowValue(..) => "pow_value",
        Op::Mod(..) => "mod",
        Op::Neg(..) => "neg",
        Op::Abs(..) => "abs",
        Op::Exp(..) => "exp",
        Op::Log(..) => "log",
        Op::Sqrt(..) => "sqrt",
        Op::Reciprocal(..) => "reciprocal",
        Op::Square(..) => "square",
        Op::Cube(..) => "cube",
        Op::Sign(..) => "sign",
        Op::Floor(..) => "floor",
        Op::Ceil(..) => "ceil",
        Op::Round(..) => "round",
        Op::Clamp(..) => "clamp",
        Op::Min(..) => "min",
        Op::Max(..) => "max",
        Op::Sum(..) => "sum",
        Op::Mean(..) => "mean",
        Op::Sin(..) => "sin",
        Op::Cos(..) => "cos",
        Op::Tan(..) => "tan",
        Op::Asin(..) => "asin",
        Op::Acos(..) => "acos",
        Op::Atan(..) => "atan",
        Op::Relu(..) => "relu",
        Op::Softplus(..) => "softplus",
        Op::Tanh(..) => "tanh",
        Op::Sigmoid(..) => "sigmoid",
        Op::Eq(..) => "eq",
        Op::Neq(..) => "neq",
        Op::Gt(..) => "gt",
        Op::Lt(..) => "lt",
        Op::Gte(..) => "gte",
        Op::Lte(..) => "lte",
        Op::IfThenElse(..) => "if_then_else",
    }
}
