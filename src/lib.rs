//! Scalar reverse-mode automatic differentiation with a graph compiler and
//! two nonlinear optimizer drivers (L-BFGS, Levenberg–Marquardt) plus
//! first-order optimizers (SGD/Adam/AdamW) for direct leaf stepping.
//!
//! The runtime graph ([`value`], [`backward`], [`nograd`]) is independent of
//! the compiler ([`canon`], [`registry`], [`bytecode`], [`kernel`], [`pool`],
//! [`compile`], [`residuals`]): a [`value::Value`] graph can be
//! differentiated directly via [`backward::backward`], or canonicalized and
//! compiled into a [`residuals::CompiledResiduals`] for repeated batched
//! evaluation by an optimizer.

mod backward;
mod bytecode;
mod canon;
mod compile;
mod error;
mod kernel;
mod nograd;
pub mod optim;
mod pool;
mod registry;
mod residuals;
mod value;

pub use backward::{backward, topo_order, zero_grad};
pub use compile::{compile, compile_async};
pub use error::ScalarFlowError;
pub use nograd::{is_no_grad, no_grad};
pub use residuals::CompiledResiduals;
pub use value::{Value, DEFAULT_EPSILON};
