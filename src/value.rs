//! The scalar computation-graph node ([`Value`]) and its closed operator set.
//!
//! A `Value` is a cheap handle (`Rc<RefCell<NodeData>>`) onto a graph node.
//! Node identity is the `Rc`'s address; two `Value`s are the "same node"
//! when [`Value::ptr_eq`] holds, regardless of their current payload.
//!
//! Per the REDESIGN note in the source design, nodes carry a tagged [`Op`]
//! variant rather than a boxed backward closure: predecessor references live
//! directly inside the variant, so there is no closure allocation per node
//! and the backward pass (`backward.rs`) and the compiler's registry
//! (`registry.rs`) both dispatch on the same tag instead of each node
//! carrying its own bespoke function pointer.

use std::cell::{Ref, RefCell};
use std::rc::Rc;

/// Additive regularization applied to denominators and log/reciprocal
/// arguments near the domain boundary. See spec.md §4.1 and the division /
/// log interpretation notes in DESIGN.md.
pub const DEFAULT_EPSILON: f64 = 1e-12;

/// Finite gradient substituted for `sqrt`'s derivative at `x <= 0`, where the
/// true derivative is infinite.
const SQRT_GRAD_CLAMP: f64 = 1.0e6;

/// The closed operator enumeration from spec.md §3. Each non-leaf variant
/// embeds the predecessor [`Value`]s it reads from directly (up to two, or
/// an ordered list for the n-ary reductions).
#[derive(Clone)]
pub enum Op {
    Leaf,
    Add(Value, Value),
    Sub(Value, Value),
    Mul(Value, Value),
    Div(Value, Value),
    PowConst(Value, f64),
    PowValue(Value, Value),
    Mod(Value, Value),
    Neg(Value),
    Abs(Value),
    Exp(Value),
    Log(Value),
    Sqrt(Value),
    Reciprocal(Value),
    Square(Value),
    Cube(Value),
    Sign(Value),
    Floor(Value),
    Ceil(Value),
    Round(Value),
    Clamp(Value, f64, f64),
    Min(Value, Value),
    Max(Value, Value),
    Sum(Vec<Value>),
    Mean(Vec<Value>),
    Sin(Value),
    Cos(Value),
    Tan(Value),
    Asin(Value),
    Acos(Value),
    Atan(Value),
    Relu(Value),
    Softplus(Value),
    Tanh(Value),
    Sigmoid(Value),
    Eq(Value, Value),
    Neq(Value, Value),
    Gt(Value, Value),
    Lt(Value, Value),
    Gte(Value, Value),
    Lte(Value, Value),
    IfThenElse(Value, Value, Value),
}

/// True for the comparison operators, whose outputs are always
/// non-differentiable 0/1 scalars regardless of their operands.
fn is_comparison(op: &Op) -> bool {
    matches!(
        op,
        Op::Eq(..) | Op::Neq(..) | Op::Gt(..) | Op::Lt(..) | Op::Gte(..) | Op::Lte(..)
    )
}

pub(crate) struct NodeData {
    pub(crate) data: f64,
    pub(crate) grad: f64,
    pub(crate) requires_grad: bool,
    pub(crate) op: Op,
    pub(crate) label: Option<String>,
    pub(crate) param_name: Option<String>,
}

/// A node in the computation graph. Clone is a reference-count bump, not a
/// deep copy — predecessors are shared, never duplicated.
#[derive(Clone)]
pub struct Value(pub(crate) Rc<RefCell<NodeData>>);

/// Symmetric-in-sign regularization of a denominator: never lets `|den|`
/// fall below [`DEFAULT_EPSILON`], without flipping its sign.
fn safe_denominator(den: f64) -> f64 {
    if den.abs() < DEFAULT_EPSILON {
        if den.is_sign_negative() {
            -DEFAULT_EPSILON
        } else {
            DEFAULT_EPSILON
        }
    } else {
        den
    }
}

/// `log`'s argument, floored at epsilon for non-positive inputs (spec.md
/// §4.1: "for log of a non-positive argument the forward value is
/// log(epsilon) and the gradient is 1/epsilon").
fn log_arg(x: f64) -> f64 {
    if x <= 0.0 {
        DEFAULT_EPSILON
    } else {
        x
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

impl Value {
    fn from_op(op: Op, label: Option<String>) -> Value {
        let data = Self::forward(&op);
        let requires_grad = if crate::nograd::is_no_grad() {
            false
        } else if is_comparison(&op) {
            false
        } else {
            Self::predecessors_require_grad(&op)
        };
        Value(Rc::new(RefCell::new(NodeData {
            data,
            grad: 0.0,
            requires_grad,
            op,
            label,
            param_name: None,
        })))
    }

    fn predecessors_require_grad(op: &Op) -> bool {
        match op {
            Op::Leaf => false,
            Op::Add(a, b)
            | Op::Sub(a, b)
            | Op::Mul(a, b)
            | Op::Div(a, b)
            | Op::PowValue(a, b)
            | Op::Mod(a, b)
            | Op::Min(a, b)
            | Op::Max(a, b)
            | Op::Eq(a, b)
            | Op::Neq(a, b)
            | Op::Gt(a, b)
            | Op::Lt(a, b)
            | Op::Gte(a, b)
            | Op::Lte(a, b) => a.requires_grad() || b.requires_grad(),
            Op::PowConst(a, _)
            | Op::Neg(a)
            | Op::Abs(a)
            | Op::Exp(a)
            | Op::Log(a)
            | Op::Sqrt(a)
            | Op::Reciprocal(a)
            | Op::Square(a)
            | Op::Cube(a)
            | Op::Sign(a)
            | Op::Floor(a)
            | Op::Ceil(a)
            | Op::Round(a)
            | Op::Sin(a)
            | Op::Cos(a)
            | Op::Tan(a)
            | Op::Asin(a)
            | Op::Acos(a)
            | Op::Atan(a)
            | Op::Relu(a)
            | Op::Softplus(a)
            | Op::Tanh(a)
            | Op::Sigmoid(a) => a.requires_grad(),
            Op::Clamp(a, _, _) => a.requires_grad(),
            Op::Sum(items) | Op::Mean(items) => items.iter().any(Value::requires_grad),
            Op::IfThenElse(_, a, b) => a.requires_grad() || b.requires_grad(),
        }
    }

    fn forward(op: &Op) -> f64 {
        match op {
            Op::Leaf => unreachable!("leaves carry their own data, not computed via forward()"),
            Op::Add(a, b) => a.value() + b.value(),
            Op::Sub(a, b) => a.value() - b.value(),
            Op::Mul(a, b) => a.value() * b.value(),
            Op::Div(a, b) => a.value() / safe_denominator(b.value()),
            Op::PowConst(a, e) => a.value().powf(*e),
            Op::PowValue(a, b) => {
                let la = log_arg(a.value()).ln();
                (b.value() * la).exp()
            }
            Op::Mod(a, b) => a.value() % b.value(),
            Op::Neg(a) => -a.value(),
            Op::Abs(a) => a.value().abs(),
            Op::Exp(a) => a.value().exp(),
            Op::Log(a) => log_arg(a.value()).ln(),
            Op::Sqrt(a) => {
                let x = a.value();
                if x <= 0.0 {
                    0.0
                } else {
                    x.sqrt()
                }
            }
            Op::Reciprocal(a) => 1.0 / safe_denominator(a.value()),
            Op::Square(a) => a.value() * a.value(),
            Op::Cube(a) => {
                let x = a.value();
                x * x * x
            }
            Op::Sign(a) => sign_no_subgradient(a.value()),
            Op::Floor(a) => a.value().floor(),
            Op::Ceil(a) => a.value().ceil(),
            Op::Round(a) => a.value().round(),
            Op::Clamp(a, lo, hi) => a.value().clamp(*lo, *hi),
            Op::Min(a, b) => {
                if a.value() <= b.value() {
                    a.value()
                } else {
                    b.value()
                }
            }
            Op::Max(a, b) => {
                if a.value() >= b.value() {
                    a.value()
                } else {
                    b.value()
                }
            }
            Op::Sum(items) => items.iter().map(Value::value).sum(),
            Op::Mean(items) => {
                let n = items.len().max(1) as f64;
                items.iter().map(Value::value).sum::<f64>() / n
            }
            Op::Sin(a) => a.value().sin(),
            Op::Cos(a) => a.value().cos(),
            Op::Tan(a) => a.value().tan(),
            Op::Asin(a) => a.value().asin(),
            Op::Acos(a) => a.value().acos(),
            Op::Atan(a) => a.value().atan(),
            Op::Relu(a) => a.value().max(0.0),
            Op::Softplus(a) => {
                let x = a.value();
                x.max(0.0) + (1.0 + (-x.abs()).exp()).ln()
            }
            Op::Tanh(a) => a.value().tanh(),
            Op::Sigmoid(a) => 1.0 / (1.0 + (-a.value()).exp()),
            Op::Eq(a, b) => bool_f(a.value() == b.value()),
            Op::Neq(a, b) => bool_f(a.value() != b.value()),
            Op::Gt(a, b) => bool_f(a.value() > b.value()),
            Op::Lt(a, b) => bool_f(a.value() < b.value()),
            Op::Gte(a, b) => bool_f(a.value() >= b.value()),
            Op::Lte(a, b) => bool_f(a.value() <= b.value()),
            Op::IfThenElse(cond, a, b) => {
                if cond.value() != 0.0 {
                    a.value()
                } else {
                    b.value()
                }
            }
        }
    }

    // ---- leaf constructors -------------------------------------------------

    /// A differentiable parameter leaf.
    pub fn weight(data: f64, label: Option<&str>) -> Value {
        Value(Rc::new(RefCell::new(NodeData {
            data,
            grad: 0.0,
            requires_grad: !crate::nograd::is_no_grad(),
            op: Op::Leaf,
            label: label.map(str::to_owned),
            param_name: None,
        })))
    }

    /// A non-differentiable input leaf. Numbers used as operands to the
    /// operator entry points are auto-wrapped via this constructor.
    pub fn constant(data: f64, label: Option<&str>) -> Value {
        Value(Rc::new(RefCell::new(NodeData {
            data,
            grad: 0.0,
            requires_grad: false,
            op: Op::Leaf,
            label: label.map(str::to_owned),
            param_name: None,
        })))
    }

    /// A differentiable leaf addressable by name by the compiler (see
    /// `compile.rs`). The name is distinct from the debug label.
    pub fn param(data: f64, name: &str) -> Value {
        let v = Value::weight(data, None);
        v.0.borrow_mut().param_name = Some(name.to_owned());
        v
    }

    // ---- accessors -----------------------------------------------------------

    pub fn value(&self) -> f64 {
        self.0.borrow().data
    }

    pub fn set_value(&self, data: f64) {
        self.0.borrow_mut().data = data;
    }

    pub fn grad(&self) -> f64 {
        self.0.borrow().grad
    }

    pub fn set_grad(&self, grad: f64) {
        self.0.borrow_mut().grad = grad;
    }

    pub fn requires_grad(&self) -> bool {
        self.0.borrow().requires_grad
    }

    pub fn label(&self) -> Option<String> {
        self.0.borrow().label.clone()
    }

    pub fn set_label(&self, label: &str) {
        self.0.borrow_mut().label = Some(label.to_owned());
    }

    pub fn param_name(&self) -> Option<String> {
        self.0.borrow().param_name.clone()
    }

    pub(crate) fn op(&self) -> Ref<'_, Op> {
        Ref::map(self.0.borrow(), |n| &n.op)
    }

    /// Identity comparison: do these handles point at the same node?
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Non-interactive ASCII rendering of this node's subgraph, for
    /// debugging. Mirrors the teacher's `draw.rs` tree format, minus the
    /// stdin-driven step-through of its demo-only `viz.rs` sibling.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let mut visited = std::collections::HashSet::new();
        self.describe_into(&mut out, &mut visited, "", true);
        out
    }

    fn describe_into(
        &self,
        out: &mut String,
        visited: &mut std::collections::HashSet<usize>,
        prefix: &str,
        is_last: bool,
    ) {
        let addr = self.addr();
        if !visited.insert(addr) {
            return;
        }
        let label = self.label().unwrap_or_else(|| "?".to_string());
        out.push_str(&format!(
            "{prefix}{} [{:.4}, grad={:.4}]\n",
            label,
            self.value(),
            self.grad()
        ));
        let children = self.children();
        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let n = children.len();
        for (i, child) in children.iter().enumerate() {
            let connector = if i + 1 == n { "└── " } else { "├── " };
            child.describe_into(
                out,
                visited,
                &format!("{child_prefix}{connector}"),
                i + 1 == n,
            );
        }
    }

    /// All direct predecessors, in the operator's argument order.
    pub(crate) fn children(&self) -> Vec<Value> {
        match &*self.op() {
            Op::Leaf => vec![],
            Op::Add(a, b)
            | Op::Sub(a, b)
            | Op::Mul(a, b)
            | Op::Div(a, b)
            | Op::PowValue(a, b)
            | Op::Mod(a, b)
            | Op::Min(a, b)
            | Op::Max(a, b)
            | Op::Eq(a, b)
            | Op::Neq(a, b)
            | Op::Gt(a, b)
            | Op::Lt(a, b)
            | Op::Gte(a, b)
            | Op::Lte(a, b) => vec![a.clone(), b.clone()],
            Op::PowConst(a, _)
            | Op::Neg(a)
            | Op::Abs(a)
            | Op::Exp(a)
            | Op::Log(a)
            | Op::Sqrt(a)
            | Op::Reciprocal(a)
            | Op::Square(a)
            | Op::Cube(a)
            | Op::Sign(a)
            | Op::Floor(a)
            | Op::Ceil(a)
            | Op::Round(a)
            | Op::Sin(a)
            | Op::Cos(a)
            | Op::Tan(a)
            | Op::Asin(a)
            | Op::Acos(a)
            | Op::Atan(a)
            | Op::Relu(a)
            | Op::Softplus(a)
            | Op::Tanh(a)
            | Op::Sigmoid(a) => vec![a.clone()],
            Op::Clamp(a, _, _) => vec![a.clone()],
            Op::Sum(items) | Op::Mean(items) => items.clone(),
            Op::IfThenElse(c, a, b) => vec![c.clone(), a.clone(), b.clone()],
        }
    }

    // ---- operator entry points ------------------------------------------------

    pub fn pow(&self, exponent: f64) -> Value {
        Value::from_op(Op::PowConst(self.clone(), exponent), None)
    }

    pub fn powv(&self, exponent: impl Into<Value>) -> Value {
        Value::from_op(Op::PowValue(self.clone(), exponent.into()), None)
    }

    pub fn modulo(&self, rhs: impl Into<Value>) -> Value {
        Value::from_op(Op::Mod(self.clone(), rhs.into()), None)
    }

    pub fn abs(&self) -> Value {
        Value::from_op(Op::Abs(self.clone()), None)
    }

    pub fn exp(&self) -> Value {
        Value::from_op(Op::Exp(self.clone()), None)
    }

    pub fn log(&self) -> Value {
        Value::from_op(Op::Log(self.clone()), None)
    }

    pub fn sqrt(&self) -> Value {
        Value::from_op(Op::Sqrt(self.clone()), None)
    }

    pub fn recip(&self) -> Value {
        Value::from_op(Op::Reciprocal(self.clone()), None)
    }

    pub fn square(&self) -> Value {
        Value::from_op(Op::Square(self.clone()), None)
    }

    pub fn cube(&self) -> Value {
        Value::from_op(Op::Cube(self.clone()), None)
    }

    pub fn sign(&self) -> Value {
        Value::from_op(Op::Sign(self.clone()), None)
    }

    pub fn floor(&self) -> Value {
        Value::from_op(Op::Floor(self.clone()), None)
    }

    pub fn ceil(&self) -> Value {
        Value::from_op(Op::Ceil(self.clone()), None)
    }

    pub fn round(&self) -> Value {
        Value::from_op(Op::Round(self.clone()), None)
    }

    pub fn clamp(&self, lo: f64, hi: f64) -> Value {
        Value::from_op(Op::Clamp(self.clone(), lo, hi), None)
    }

    pub fn min(&self, other: impl Into<Value>) -> Value {
        Value::from_op(Op::Min(self.clone(), other.into()), None)
    }

    pub fn max(&self, other: impl Into<Value>) -> Value {
        Value::from_op(Op::Max(self.clone(), other.into()), None)
    }

    pub fn sin(&self) -> Value {
        Value::from_op(Op::Sin(self.clone()), None)
    }

    pub fn cos(&self) -> Value {
        Value::from_op(Op::Cos(self.clone()), None)
    }

    pub fn tan(&self) -> Value {
        Value::from_op(Op::Tan(self.clone()), None)
    }

    pub fn asin(&self) -> Value {
        Value::from_op(Op::Asin(self.clone()), None)
    }

    pub fn acos(&self) -> Value {
        Value::from_op(Op::Acos(self.clone()), None)
    }

    pub fn atan(&self) -> Value {
        Value::from_op(Op::Atan(self.clone()), None)
    }

    pub fn relu(&self) -> Value {
        Value::from_op(Op::Relu(self.clone()), None)
    }

    pub fn softplus(&self) -> Value {
        Value::from_op(Op::Softplus(self.clone()), None)
    }

    pub fn tanh(&self) -> Value {
        Value::from_op(Op::Tanh(self.clone()), None)
    }

    pub fn sigmoid(&self) -> Value {
        Value::from_op(Op::Sigmoid(self.clone()), None)
    }

    pub fn eq_(&self, other: impl Into<Value>) -> Value {
        Value::from_op(Op::Eq(self.clone(), other.into()), None)
    }

    pub fn neq(&self, other: impl Into<Value>) -> Value {
        Value::from_op(Op::Neq(self.clone(), other.into()), None)
    }

    pub fn gt(&self, other: impl Into<Value>) -> Value {
        Value::from_op(Op::Gt(self.clone(), other.into()), None)
    }

    pub fn lt(&self, other: impl Into<Value>) -> Value {
        Value::from_op(Op::Lt(self.clone(), other.into()), None)
    }

    pub fn gte(&self, other: impl Into<Value>) -> Value {
        Value::from_op(Op::Gte(self.clone(), other.into()), None)
    }

    pub fn lte(&self, other: impl Into<Value>) -> Value {
        Value::from_op(Op::Lte(self.clone(), other.into()), None)
    }

    pub fn if_then_else(cond: &Value, a: impl Into<Value>, b: impl Into<Value>) -> Value {
        Value::from_op(Op::IfThenElse(cond.clone(), a.into(), b.into()), None)
    }

    /// Sum of an ordered sequence, as a single n-ary node (spec.md §9: this
    /// collapses what a left-fold chain of binary adds would make an
    /// `O(n)`-deep graph into `O(1)` compiled depth).
    pub fn sum(items: &[Value]) -> Value {
        Value::from_op(Op::Sum(items.to_vec()), None)
    }

    /// Mean of an ordered sequence, as a single n-ary node.
    pub fn mean(items: &[Value]) -> Value {
        Value::from_op(Op::Mean(items.to_vec()), None)
    }
}

fn bool_f(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

impl From<f64> for Value {
    fn from(data: f64) -> Value {
        Value::constant(data, None)
    }
}

impl From<&Value> for Value {
    fn from(v: &Value) -> Value {
        v.clone()
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $fn:ident, $variant:ident) => {
        impl<R: Into<Value>> std::ops::$trait<R> for Value {
            type Output = Value;
            fn $fn(self, rhs: R) -> Value {
                Value::from_op(Op::$variant(self, rhs.into()), None)
            }
        }
        impl<R: Into<Value>> std::ops::$trait<R> for &Value {
            type Output = Value;
            fn $fn(self, rhs: R) -> Value {
                Value::from_op(Op::$variant(self.clone(), rhs.into()), None)
            }
        }
    };
}

impl_binary_op!(Add, add, Add);
impl_binary_op!(Sub, sub, Sub);
impl_binary_op!(Mul, mul, Mul);
impl_binary_op!(Div, div, Div);

impl std::ops::Add<Value> for f64 {
    type Output = Value;
    fn add(self, rhs: Value) -> Value {
        Value::from(self) + rhs
    }
}

impl std::ops::Sub<Value> for f64 {
    type Output = Value;
    fn sub(self, rhs: Value) -> Value {
        Value::from(self) - rhs
    }
}

impl std::ops::Mul<Value> for f64 {
    type Output = Value;
    fn mul(self, rhs: Value) -> Value {
        Value::from(self) * rhs
    }
}

impl std::ops::Div<Value> for f64 {
    type Output = Value;
    fn div(self, rhs: Value) -> Value {
        Value::from(self) / rhs
    }
}

impl std::ops::Neg for Value {
    type Output = Value;
    fn neg(self) -> Value {
        Value::from_op(Op::Neg(self), None)
    }
}

impl std::ops::Neg for &Value {
    type Output = Value;
    fn neg(self) -> Value {
        Value::from_op(Op::Neg(self.clone()), None)
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Value")
            .field("data", &self.value())
            .field("grad", &self.grad())
            .field("requires_grad", &self.requires_grad())
            .field("label", &self.label())
            .finish()
    }
}

/// Per-node backward-distribution gradient accumulation. Contributions are
/// only written when the predecessor is differentiable — this is what makes
/// the "gradient-of-constant" and no-grad-context properties hold (spec.md
/// §8 properties 3 and 5; see `backward.rs`).
pub(crate) fn accumulate(target: &Value, contribution: f64) {
    if target.requires_grad() {
        let mut n = target.0.borrow_mut();
        n.grad += contribution;
    }
}

pub(crate) fn safe_denom(den: f64) -> f64 {
    safe_denominator(den)
}

pub(crate) fn log_argument(x: f64) -> f64 {
    log_arg(x)
}

pub(crate) const fn sqrt_grad_clamp() -> f64 {
    SQRT_GRAD_CLAMP
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_basics() {
        let w = Value::weight(2.0, Some("w"));
        assert!(w.requires_grad());
        let c = Value::constant(3.0, Some("c"));
        assert!(!c.requires_grad());
    }

    #[test]
    fn arithmetic_forward() {
        let a = Value::weight(2.0, None);
        let b = Value::weight(3.0, None);
        assert_eq!((&a + &b).value(), 5.0);
        assert_eq!((&a - &b).value(), -1.0);
        assert_eq!((&a * &b).value(), 6.0);
        assert!(((&a / &b).value() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn div_by_zero_is_regularized_not_nan() {
        let a = Value::weight(1.0, None);
        let z = Value::constant(0.0, None);
        let r = &a / &z;
        assert!(r.value().is_finite());
    }

    #[test]
    fn log_of_nonpositive_uses_epsilon() {
        let a = Value::weight(-1.0, None);
        let l = a.log();
        assert!((l.value() - DEFAULT_EPSILON.ln()).abs() < 1e-9);
    }

    #[test]
    fn requires_grad_propagates_as_disjunction() {
        let w = Value::weight(1.0, None);
        let c = Value::constant(2.0, None);
        assert!((&w + &c).requires_grad());
        assert!(!(&c + &c).requires_grad());
    }

    #[test]
    fn comparisons_are_never_differentiable() {
        let w = Value::weight(1.0, None);
        assert!(!w.gt(0.0).requires_grad());
    }
}
