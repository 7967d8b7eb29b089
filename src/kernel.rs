//! Compiled kernel (spec.md §4.3 / §4.5): one [`Kernel`] is the materialized
//! bytecode for a single canonical signature, shared by every residual that
//! canonicalizes to that signature. Building a kernel consults
//! [`registry::lookup`] once per node and [`canon::canonicalize`] once per
//! residual graph; evaluating a kernel never touches the registry or the
//! original `Value` graph again.

use crate::bytecode::Instr;
use crate::canon::{canonicalize, Canon, ConcreteLeaf};
use crate::error::ScalarFlowError;
use crate::registry;
use crate::value::{Op, Value};
use std::collections::HashMap;

/// Straight-line program for one canonical residual shape.
pub struct Kernel {
    pub signature: String,
    instrs: Vec<Instr>,
    pub slots: Vec<ConcreteLeaf>,
    n_registers: usize,
    output_reg: usize,
}

impl Kernel {
    /// Builds a kernel from an already-canonicalized graph (spec.md §4.5).
    /// Fails with [`ScalarFlowError::Compilation`] if any node carries an
    /// operator the registry doesn't recognize — structurally unreachable
    /// given `Op`'s closed enum, but checked per §7's fail-fast policy.
    pub fn build(canon: &Canon) -> Result<Kernel, ScalarFlowError> {
        let mut reg_of: HashMap<usize, usize> = HashMap::new();
        let mut instrs = Vec::with_capacity(canon.order.len());

        for (reg, node) in canon.order.iter().enumerate() {
            let op = node.op();
            registry::lookup(&op)?;
            let instr = to_instr(&op, node, &reg_of, &canon.leaf_slot);
            reg_of.insert(node.addr(), reg);
            instrs.push(instr);
        }

        let output_reg = *reg_of
            .get(&canon.order.last().map(Value::addr).unwrap_or(0))
            .unwrap_or(&0);

        Ok(Kernel {
            signature: canon.signature.clone(),
            instrs,
            slots: canon.slots.clone(),
            n_registers: reg_of.len(),
            output_reg,
        })
    }

    /// Compiles `root` directly, canonicalizing it against `params` first.
    pub fn compile(root: &Value, params: &[Value]) -> Result<(Kernel, Canon), ScalarFlowError> {
        let canon = canonicalize(root, params);
        let kernel = Kernel::build(&canon)?;
        Ok((kernel, canon))
    }

    pub fn num_registers(&self) -> usize {
        self.n_registers
    }

    /// Evaluates this kernel against concrete parameter values, returning
    /// the residual's value and its Jacobian row with respect to `params`
    /// (length `n_params`, zero for every parameter the kernel doesn't
    /// reference).
    pub fn eval(&self, params: &[f64], n_params: usize) -> (f64, Vec<f64>) {
        let mut vals = vec![0.0; self.n_registers];
        for (reg, instr) in self.instrs.iter().enumerate() {
            vals[reg] = instr.eval_forward(&vals, &self.slots, params);
        }

        let mut adj = vec![0.0; self.n_registers];
        let mut jac_row = vec![0.0; n_params];
        adj[self.output_reg] = 1.0;
        for (reg, instr) in self.instrs.iter().enumerate().rev() {
            let g = adj[reg];
            instr.backward_step(reg, g, &vals, &mut adj, &self.slots, &mut jac_row);
        }

        (vals[self.output_reg], jac_row)
    }

    /// Value-only evaluation, skipping the backward pass entirely.
    pub fn eval_value_only(&self, params: &[f64]) -> f64 {
        let mut vals = vec![0.0; self.n_registers];
        for (reg, instr) in self.instrs.iter().enumerate() {
            vals[reg] = instr.eval_forward(&vals, &self.slots, params);
        }
        vals[self.output_reg]
    }
}

fn reg(reg_of: &HashMap<usize, usize>, node: &Value) -> usize {
    *reg_of
        .get(&node.addr())
        .expect("children are emitted before their parents in topological order")
}

fn leaf_slot(leaf_slot: &HashMap<usize, usize>, node: &Value) -> usize {
    *leaf_slot
        .get(&node.addr())
        .expect("every Op::Leaf has an assigned canonical slot")
}

fn to_instr(
    op: &Op,
    node: &Value,
    reg_of: &HashMap<usize, usize>,
    leaf_slots: &HashMap<usize, usize>,
) -> Instr {
    let r = |v: &Value| reg(reg_of, v);
    match op {
        Op::Leaf => Instr::Input(leaf_slot(leaf_slots, node)),
        Op::Add(a, b) => Instr::Add(r(a), r(b)),
        Op::Sub(a, b) => Instr::Sub(r(a), r(b)),
        Op::Mul(a, b) => Instr::Mul(r(a), r(b)),
        Op::Div(a, b) => Instr::Div(r(a), r(b)),
        Op::PowConst(a, e) => Instr::PowConst(r(a), *e),
        Op::PowValue(a, b) => Instr::PowValue(r(a), r(b)),
        Op::Mod(a, b) => Instr::Mod(r(a), r(b)),
        Op::Neg(a) => Instr::Neg(r(a)),
        Op::Abs(a) => Instr::Abs(r(a)),
        Op::Exp(a) => Instr::Exp(r(a)),
        Op::Log(a) => Instr::Log(r(a)),
        Op::Sqrt(a) => Instr::Sqrt(r(a)),
        Op::Reciprocal(a) => Instr::Reciprocal(r(a)),
        Op::Square(a) => Instr::Square(r(a)),
        Op::Cube(a) => Instr::Cube(r(a)),
        Op::Sign(a) => Instr::Sign(r(a)),
        Op::Floor(a) => Instr::Floor(r(a)),
        Op::Ceil(a) => Instr::Ceil(r(a)),
        Op::Round(a) => Instr::Round(r(a)),
        Op::Clamp(a, lo, hi) => Instr::Clamp(r(a), *lo, *hi),
        Op::Min(a, b) => Instr::Min(r(a), r(b)),
        Op::Max(a, b) => Instr::Max(r(a), r(b)),
        Op::Sum(items) => Instr::Sum(items.iter().map(|v| r(v)).collect()),
        Op::Mean(items) => Instr::Mean(items.iter().map(|v| r(v)).collect()),
        Op::Sin(a) => Instr::Sin(r(a)),
        Op::Cos(a) => Instr::Cos(r(a)),
        Op::Tan(a) => Instr::Tan(r(a)),
        Op::Asin(a) => Instr::Asin(r(a)),
        Op::Acos(a) => Instr::Acos(r(a)),
        Op::Atan(a) => Instr::Atan(r(a)),
        Op::Relu(a) => Instr::Relu(r(a)),
        Op::Softplus(a) => Instr::Softplus(r(a)),
        Op::Tanh(a) => Instr::Tanh(r(a)),
        Op::Sigmoid(a) => Instr::Sigmoid(r(a)),
        Op::Eq(a, b) => Instr::Eq(r(a), r(b)),
        Op::Neq(a, b) => Instr::Neq(r(a), r(b)),
        Op::Gt(a, b) => Instr::Gt(r(a), r(b)),
        Op::Lt(a, b) => Instr::Lt(r(a), r(b)),
        Op::Gte(a, b) => Instr::Gte(r(a), r(b)),
        Op::Lte(a, b) => Instr::Lte(r(a), r(b)),
        Op::IfThenElse(c, a, b) => Instr::IfThenElse(r(c), r(a), r(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn compiled_kernel_matches_graph_forward_value() {
        let a = Value::weight(2.0, None);
        let b = Value::weight(3.0, None);
        let out = &(&a * &b) + &a.sin();
        let expected = out.value();

        let (kernel, _canon) = Kernel::compile(&out, &[a.clone(), b.clone()]).unwrap();
        let (got, _jac) = kernel.eval(&[2.0, 3.0], 2);
        assert!((got - expected).abs() < 1e-12);
    }

    #[test]
    fn compiled_kernel_jacobian_matches_reverse_mode_graph() {
        let a = Value::weight(2.0, None);
        let b = Value::weight(3.0, None);
        let out = &a * &b;
        crate::backward::backward(&out, true);
        let expected = [a.grad(), b.grad()];

        let (kernel, _canon) = Kernel::compile(&out, &[a.clone(), b.clone()]).unwrap();
        let (_val, jac) = kernel.eval(&[2.0, 3.0], 2);
        assert!((jac[0] - expected[0]).abs() < 1e-12);
        assert!((jac[1] - expected[1]).abs() < 1e-12);
    }

    #[test]
    fn identical_signatures_share_equal_kernel_behaviour() {
        let a1 = Value::weight(1.0, None);
        let b1 = Value::weight(2.0, None);
        let canon1 = canonicalize(&(&a1 * &b1), &[a1.clone(), b1.clone()]);

        let a2 = Value::weight(5.0, None);
        let b2 = Value::weight(7.0, None);
        let canon2 = canonicalize(&(&a2 * &b2), &[a2.clone(), b2.clone()]);

        assert_eq!(canon1.signature, canon2.signature);
        let k1 = Kernel::build(&canon1).unwrap();
        let k2 = Kernel::build(&canon2).unwrap();
        let (v1, j1) = k1.eval(&[5.0, 7.0], 2);
        let (v2, j2) = k2.eval(&[5.0, 7.0], 2);
        assert!((v1 - v2).abs() < 1e-12);
        assert!((j1[0] - j2[0]).abs() < 1e-12);
        assert!((j1[1] - j2[1]).abs() < 1e-12);
    }
}
