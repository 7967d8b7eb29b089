//! Graph canonicalizer (spec.md §4.4): structural signature + isomorphism
//! mapping from canonical leaf slots to concrete parameter indices /
//! constant values.

use crate::value::{Op, Value};
use std::collections::HashMap;

/// What a canonical leaf slot concretely resolves to for one particular
/// graph instance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConcreteLeaf {
    /// Index into the overall parameter vector passed to `compile`.
    Param(usize),
    /// A literal, non-differentiable value.
    Const(f64),
}

/// Result of canonicalizing one residual graph.
pub struct Canon {
    /// Structural fingerprint, stable under commutative-operand reordering
    /// and parameter relabeling (spec.md §8 property 6).
    pub signature: String,
    /// Slot table: concrete leaf for each canonical slot index.
    pub slots: Vec<ConcreteLeaf>,
    /// All nodes reachable from the root, in topological (children-first)
    /// order, each appearing exactly once regardless of how many parents
    /// reference it — this is the order the compiler emits bindings in.
    pub order: Vec<Value>,
    /// Node address -> canonical slot index, for leaves only.
    pub leaf_slot: HashMap<usize, usize>,
}

struct Builder {
    param_index: HashMap<usize, usize>,
    token_of: HashMap<usize, String>,
    leaf_slot: HashMap<usize, usize>,
    slots: Vec<ConcreteLeaf>,
    order: Vec<Value>,
}

impl Builder {
    fn visit(&mut self, node: &Value) -> String {
        let addr = node.addr();
        if let Some(token) = self.token_of.get(&addr) {
            return token.clone();
        }

        let token = match &*node.op() {
            Op::Leaf => {
                let slot = self.slots.len();
                let leaf = match self.param_index.get(&addr) {
                    Some(&idx) => ConcreteLeaf::Param(idx),
                    None => ConcreteLeaf::Const(node.value()),
                };
                let token = match leaf {
                    ConcreteLeaf::Param(_) => format!("param{slot}"),
                    ConcreteLeaf::Const(_) => "const".to_string(),
                };
                self.slots.push(leaf);
                self.leaf_slot.insert(addr, slot);
                token
            }
            Op::Add(a, b) => self.commutative("add", a, b),
            Op::Mul(a, b) => self.commutative("mul", a, b),
            Op::Sub(a, b) => self.ordered("sub", &[a, b]),
            Op::Div(a, b) => self.ordered("div", &[a, b]),
            Op::PowConst(a, e) => {
                let ta = self.visit(a);
                format!("powc<{e}>({ta})")
            }
            Op::PowValue(a, b) => self.ordered("powv", &[a, b]),
            Op::Mod(a, b) => self.ordered("mod", &[a, b]),
            Op::Neg(a) => self.unary("neg", a),
            Op::Abs(a) => self.unary("abs", a),
            Op::Exp(a) => self.unary("exp", a),
            Op::Log(a) => self.unary("log", a),
            Op::Sqrt(a) => self.unary("sqrt", a),
            Op::Reciprocal(a) => self.unary("recip", a),
            Op::Square(a) => self.unary("square", a),
            Op::Cube(a) => self.unary("cube", a),
            Op::Sign(a) => self.unary("sign", a),
            Op::Floor(a) => self.unary("floor", a),
            Op::Ceil(a) => self.unary("ceil", a),
            Op::Round(a) => self.unary("round", a),
            Op::Clamp(a, lo, hi) => {
                let ta = self.visit(a);
                format!("clamp<{lo},{hi}>({ta})")
            }
            Op::Min(a, b) => self.ordered("min", &[a, b]),
            Op::Max(a, b) => self.ordered("max", &[a, b]),
            Op::Sum(items) => self.variadic("sum", items),
            Op::Mean(items) => self.variadic("mean", items),
            Op::Sin(a) => self.unary("sin", a),
            Op::Cos(a) => self.unary("cos", a),
            Op::Tan(a) => self.unary("tan", a),
            Op::Asin(a) => self.unary("asin", a),
            Op::Acos(a) => self.unary("acos", a),
            Op::Atan(a) => self.unary("atan", a),
            Op::Relu(a) => self.unary("relu", a),
            Op::Softplus(a) => self.unary("softplus", a),
            Op::Tanh(a) => self.unary("tanh", a),
            Op::Sigmoid(a) => self.unary("sigmoid", a),
            Op::Eq(a, b) => self.ordered("eq", &[a, b]),
            Op::Neq(a, b) => self.ordered("neq", &[a, b]),
            Op::Gt(a, b) => self.ordered("gt", &[a, b]),
            Op::Lt(a, b) => self.ordered("lt", &[a, b]),
            Op::Gte(a, b) => self.ordered("gte", &[a, b]),
            Op::Lte(a, b) => self.ordered("lte", &[a, b]),
            Op::IfThenElse(c, a, b) => self.ordered("ite", &[c, a, b]),
        };

        self.order.push(node.clone());
        self.token_of.insert(addr, token.clone());
        token
    }

    fn unary(&mut self, name: &str, a: &Value) -> String {
        let ta = self.visit(a);
        format!("{name}({ta})")
    }

    /// Preserves argument order — every non-add/mul operator per spec.md
    /// §4.4's tie-break rule ("All other operations preserve argument
    /// order.").
    fn ordered(&mut self, name: &str, children: &[&Value]) -> String {
        let tokens: Vec<String> = children.iter().map(|c| self.visit(c)).collect();
        format!("{name}({})", tokens.join(","))
    }

    /// Add/mul: children sorted lexicographically by sub-signature so that
    /// `a+b` and `b+a` canonicalize identically.
    fn commutative(&mut self, name: &str, a: &Value, b: &Value) -> String {
        let mut tokens = [self.visit(a), self.visit(b)];
        tokens.sort();
        format!("{name}({},{})", tokens[0], tokens[1])
    }

    fn variadic(&mut self, name: &str, items: &[Value]) -> String {
        let tokens: Vec<String> = items.iter().map(|v| self.visit(v)).collect();
        format!("{name}[{}]", tokens.join(","))
    }
}

/// Canonicalizes `root`'s graph with respect to the ordered `params` list:
/// nodes that are handles onto a `params[i]` leaf are tagged as parameters
/// (addressed by `i`), every other leaf is a constant.
pub fn canonicalize(root: &Value, params: &[Value]) -> Canon {
    let param_index: HashMap<usize, usize> = params
        .iter()
        .enumerate()
        .map(|(i, p)| (p.addr(), i))
        .collect();

    let mut builder = Builder {
        param_index,
        token_of: HashMap::new(),
        leaf_slot: HashMap::new(),
        slots: Vec::new(),
        order: Vec::new(),
    };
    let signature = builder.visit(root);

    Canon {
        signature,
        slots: builder.slots,
        order: builder.order,
        leaf_slot: builder.leaf_slot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn commutative_reorder_yields_identical_signature() {
        let a = Value::weight(1.0, None);
        let b = Value::weight(2.0, None);
        let ab = canonicalize(&(&a + &b), &[a.clone(), b.clone()]);
        let ba = canonicalize(&(&b + &a), &[a.clone(), b.clone()]);
        assert_eq!(ab.signature, ba.signature);
    }

    #[test]
    fn non_commutative_order_matters() {
        let a = Value::weight(1.0, None);
        let b = Value::weight(2.0, None);
        let ab = canonicalize(&(&a - &b), &[a.clone(), b.clone()]);
        let ba = canonicalize(&(&b - &a), &[a.clone(), b.clone()]);
        assert_ne!(ab.signature, ba.signature);
    }

    #[test]
    fn parameter_relabeling_preserves_signature() {
        // Two structurally-identical graphs built from different concrete
        // parameter Values must canonicalize identically.
        let a1 = Value::weight(1.0, None);
        let b1 = Value::weight(2.0, None);
        let g1 = canonicalize(&(&a1 * &b1), &[a1.clone(), b1.clone()]);

        let a2 = Value::weight(10.0, None);
        let b2 = Value::weight(20.0, None);
        let g2 = canonicalize(&(&a2 * &b2), &[a2.clone(), b2.clone()]);

        assert_eq!(g1.signature, g2.signature);
    }

    #[test]
    fn constants_excluded_from_signature_but_present_in_slots() {
        let a = Value::weight(1.0, None);
        let g1 = canonicalize(&(&a + 5.0), &[a.clone()]);
        let g2 = canonicalize(&(&a + 999.0), &[a.clone()]);
        assert_eq!(g1.signature, g2.signature);
        assert_eq!(g1.slots.len(), g2.slots.len());
    }

    #[test]
    fn repeated_parameter_use_gets_one_slot_referenced_twice() {
        let a = Value::weight(3.0, None);
        let g = canonicalize(&(&a * &a), &[a.clone()]);
        assert_eq!(g.slots.len(), 1);
        assert_eq!(g.signature, "mul(param0,param0)");
    }
}
