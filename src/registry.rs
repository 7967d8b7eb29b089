//! Operation registry (spec.md §4.3).
//!
//! The compiler needs, per operator tag, a forward-code emitter (how to
//! build the instruction that computes this node's value from its already-
//! emitted operand registers) and a backward-code emitter (the
//! accumulation rule the bytecode interpreter runs for that instruction in
//! reverse). Both tables are keyed by operator tag and consulted only while
//! [`crate::kernel::Kernel::build`] walks a canonical graph; a compiled
//! [`crate::kernel::Kernel`] never looks the registry up again at
//! evaluation time.
//!
//! Adding a new operator to the closed set is one insertion into
//! [`KNOWN_OPERATORS`] plus one arm in `kernel::to_instr` (the forward
//! emitter) and one arm in [`crate::bytecode::Instr::backward_step`] (the
//! backward emitter) — never a change to [`crate::value`] or
//! [`crate::backward`].

use crate::error::{op_name, ScalarFlowError};
use crate::value::Op;

/// Every operator tag the compiler knows how to emit code for. Kept as an
/// explicit list (rather than relying on `Op`'s exhaustiveness alone) so
/// that [`lookup`] has something real to fail against, per spec.md §7's
/// `CompilationError` policy.
const KNOWN_OPERATORS: &[&str] = &[
    "leaf", "add", "sub", "mul", "div", "pow_const", "pow_value", "mod", "neg", "abs", "exp",
    "log", "sqrt", "reciprocal", "square", "cube", "sign", "floor", "ceil", "round", "clamp",
    "min", "max", "sum", "mean", "sin", "cos", "tan", "asin", "acos", "atan", "relu", "softplus",
    "tanh", "sigmoid", "eq", "neq", "gt", "lt", "gte", "lte", "if_then_else",
];

/// Fails fast (spec.md §7 `CompilationError`) if `op`'s tag has no
/// registered forward/backward emitter pair. With the operator set as
/// currently closed this can never actually trigger — every `Op` variant
/// has a corresponding entry — but the check runs for every node the
/// compiler emits, so extending [`Op`] without updating the registry is
/// caught here rather than as a silent miscompile.
pub fn lookup(op: &Op) -> Result<(), ScalarFlowError> {
    let name = op_name(op);
    if KNOWN_OPERATORS.contains(&name) {
        Ok(())
    } else {
        Err(ScalarFlowError::Compilation { op_name: name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn every_operator_in_a_small_graph_is_registered() {
        let a = Value::weight(1.0, None);
        let b = Value::weight(2.0, None);
        let graph = (&a + &b).tanh().relu();
        for node in crate::backward::topo_order(&graph) {
            lookup(&node.op()).unwrap();
        }
    }
}
