//! Topological ordering, the reverse-mode backward pass, and gradient
//! zeroing (spec.md §4.2).

use crate::value::{accumulate, log_argument, safe_denom, sqrt_grad_clamp, Op, Value};
use std::collections::HashSet;

/// Post-order DFS over the predecessor DAG reachable from `root`, with
/// duplicates suppressed by a visited set keyed on node identity (the
/// `Rc` address) — not on value equality, so that two structurally-equal
/// but distinct nodes are each visited once, and one node reached via two
/// paths is visited only once.
pub fn topo_order(root: &Value) -> Vec<Value> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    visit(root, &mut order, &mut visited);
    order
}

fn visit(node: &Value, order: &mut Vec<Value>, visited: &mut HashSet<usize>) {
    if !visited.insert(node.addr()) {
        return;
    }
    for child in node.children() {
        visit(&child, order, visited);
    }
    order.push(node.clone());
}

/// Resets the gradient accumulator of every node reachable from `root` to
/// zero. Optimizers call this before each iteration's backward pass (or
/// pass `zero_first = true` to [`backward`]).
pub fn zero_grad(root: &Value) {
    for node in topo_order(root) {
        node.set_grad(0.0);
    }
}

/// Computes `d(root)/d(leaf)` for every reachable leaf with
/// `requires_grad`, accumulating into each leaf's gradient field.
///
/// When `zero_first` is true, the reachable subgraph's gradients are zeroed
/// immediately before seeding the root, equivalent to calling [`zero_grad`]
/// first.
pub fn backward(root: &Value, zero_first: bool) {
    let order = topo_order(root);
    if zero_first {
        for node in &order {
            node.set_grad(0.0);
        }
    }
    root.set_grad(1.0);
    for node in order.iter().rev() {
        distribute(node);
    }
}

/// Applies one node's local derivative to its predecessors' gradient
/// accumulators, given the node's own already-accumulated output gradient.
/// Contributions into a predecessor are silently dropped when that
/// predecessor's `requires_grad` is false (see [`accumulate`]) — this is
/// what keeps constants, and anything built under the no-grad context, at
/// an exact-zero gradient.
fn distribute(node: &Value) {
    let g = node.grad();
    if g == 0.0 {
        // Every backward contribution below is some multiple of g; skip the
        // predecessor-value reads entirely. NaN/Inf gradients never satisfy
        // `== 0.0`, so non-finite propagation (spec.md §4.2) is unaffected.
        return;
    }
    let op = node.op();
    match &*op {
        Op::Leaf => {}
        Op::Add(a, b) => {
            accumulate(a, g);
            accumulate(b, g);
        }
        Op::Sub(a, b) => {
            accumulate(a, g);
            accumulate(b, -g);
        }
        Op::Mul(a, b) => {
            accumulate(a, b.value() * g);
            accumulate(b, a.value() * g);
        }
        Op::Div(a, b) => {
            let denom = safe_denom(b.value());
            accumulate(a, g / denom);
            accumulate(b, -g * a.value() / (denom * denom));
        }
        Op::PowConst(a, e) => {
            accumulate(a, *e * a.value().powf(*e - 1.0) * g);
        }
        Op::PowValue(a, b) => {
            let la = log_argument(a.value());
            let out = node.value();
            accumulate(a, g * out * b.value() / la);
            accumulate(b, g * out * la.ln());
        }
        Op::Mod(a, _b) => {
            // a mod b is piecewise-linear in a with unit slope; treated as
            // non-differentiable in b (see DESIGN.md).
            accumulate(a, g);
        }
        Op::Neg(a) => accumulate(a, -g),
        Op::Abs(a) => {
            accumulate(a, sign_no_subgradient(a.value()) * g);
        }
        Op::Exp(a) => {
            // node.value() == exp(a.value()) already.
            accumulate(a, node.value() * g);
        }
        Op::Log(a) => {
            accumulate(a, g / log_argument(a.value()));
        }
        Op::Sqrt(a) => {
            let x = a.value();
            let local = if x > 0.0 {
                0.5 / x.sqrt()
            } else {
                sqrt_grad_clamp()
            };
            accumulate(a, local * g);
        }
        Op::Reciprocal(a) => {
            let denom = safe_denom(a.value());
            accumulate(a, -g / (denom * denom));
        }
        Op::Square(a) => accumulate(a, 2.0 * a.value() * g),
        Op::Cube(a) => {
            let x = a.value();
            accumulate(a, 3.0 * x * x * g);
        }
        Op::Sign(a) => accumulate(a, 0.0),
        Op::Floor(a) | Op::Ceil(a) | Op::Round(a) => accumulate(a, 0.0),
        Op::Clamp(a, lo, hi) => {
            let x = a.value();
            if x > *lo && x < *hi {
                accumulate(a, g);
            } else {
                accumulate(a, 0.0);
            }
        }
        Op::Min(a, b) => {
            if a.value() <= b.value() {
                accumulate(a, g);
                accumulate(b, 0.0);
            } else {
                accumulate(a, 0.0);
                accumulate(b, g);
            }
        }
        Op::Max(a, b) => {
            if a.value() >= b.value() {
                accumulate(a, g);
                accumulate(b, 0.0);
            } else {
                accumulate(a, 0.0);
                accumulate(b, g);
            }
        }
        Op::Sum(items) => {
            for item in items {
                accumulate(item, g);
            }
        }
        Op::Mean(items) => {
            let n = items.len().max(1) as f64;
            for item in items {
                accumulate(item, g / n);
            }
        }
        Op::Sin(a) => accumulate(a, a.value().cos() * g),
        Op::Cos(a) => accumulate(a, -a.value().sin() * g),
        Op::Tan(a) => {
            let c = a.value().cos();
            accumulate(a, g / (c * c));
        }
        Op::Asin(a) => accumulate(a, g / (1.0 - a.value() * a.value()).sqrt()),
        Op::Acos(a) => accumulate(a, -g / (1.0 - a.value() * a.value()).sqrt()),
        Op::Atan(a) => accumulate(a, g / (1.0 + a.value() * a.value())),
        Op::Relu(a) => accumulate(a, if a.value() > 0.0 { g } else { 0.0 }),
        Op::Softplus(a) => {
            let s = 1.0 / (1.0 + (-a.value()).exp());
            accumulate(a, s * g);
        }
        Op::Tanh(a) => {
            let t = node.value();
            accumulate(a, (1.0 - t * t) * g);
        }
        Op::Sigmoid(a) => {
            let s = node.value();
            accumulate(a, s * (1.0 - s) * g);
        }
        Op::Eq(a, b) | Op::Neq(a, b) | Op::Gt(a, b) | Op::Lt(a, b) | Op::Gte(a, b) | Op::Lte(a, b) => {
            accumulate(a, 0.0);
            accumulate(b, 0.0);
        }
        Op::IfThenElse(cond, a, b) => {
            if cond.value() != 0.0 {
                accumulate(a, g);
                accumulate(b, 0.0);
            } else {
                accumulate(a, 0.0);
                accumulate(b, g);
            }
        }
    }
}

fn sign_no_subgradient(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn add_distributes_unit_gradient() {
        let a = Value::weight(2.0, None);
        let b = Value::weight(3.0, None);
        let c = &a + &b;
        backward(&c, true);
        assert_eq!(a.grad(), 1.0);
        assert_eq!(b.grad(), 1.0);
    }

    #[test]
    fn mul_distributes_partner_value() {
        let a = Value::weight(2.0, None);
        let b = Value::weight(3.0, None);
        let c = &a * &b;
        backward(&c, true);
        assert_eq!(a.grad(), 3.0);
        assert_eq!(b.grad(), 2.0);
    }

    #[test]
    fn scenario_d_gradient_stop_at_non_requires_grad() {
        let x = Value::weight(2.0, None);
        let y = Value::constant(3.0, None);
        let z = Value::weight(5.0, None);
        let out = &(&x * &y) + &z;
        backward(&out, true);
        assert_eq!(x.grad(), 3.0);
        assert_eq!(y.grad(), 0.0);
        assert_eq!(z.grad(), 1.0);
    }

    #[test]
    fn gradient_linearity_under_seed_scaling() {
        let x = Value::weight(2.0, None);
        let y = Value::weight(3.0, None);
        let out = &x * &y;
        backward(&out, true);
        let (gx1, gy1) = (x.grad(), y.grad());

        zero_grad(&out);
        out.set_grad(3.0);
        for node in topo_order(&out).iter().rev() {
            distribute(node);
        }
        assert!((x.grad() - 3.0 * gx1).abs() < 1e-12);
        assert!((y.grad() - 3.0 * gy1).abs() < 1e-12);
    }

    #[test]
    fn constant_only_inputs_yield_exact_zero_gradient() {
        let a = Value::constant(2.0, None);
        let b = Value::constant(3.0, None);
        let c = &a * &b;
        backward(&c, true);
        assert_eq!(a.grad(), 0.0);
        assert_eq!(b.grad(), 0.0);
    }
}
