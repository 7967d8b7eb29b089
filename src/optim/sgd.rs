//! First-order optimizers (supplemented feature, named but not detailed as a
//! dedicated component in spec.md §1/§6): SGD, Adam, and AdamW stepping
//! directly on [`Value`] leaves using their already-accumulated gradients.
//! Frozen parameters (`requires_grad() == false`) are left untouched, which
//! is what scenario F exercises.

use std::collections::HashMap;

use crate::optim::options::{FirstOrderKind, FirstOrderOptions};
use crate::value::Value;

struct AdamState {
    m: f64,
    v: f64,
    t: u32,
}

/// Stateful first-order optimizer over a fixed set of leaf [`Value`]s.
/// Adam/AdamW moment estimates are keyed by each leaf's node identity so the
/// same optimizer instance can be reused across iterations without
/// re-resolving which parameter is which.
pub struct FirstOrderOptimizer {
    options: FirstOrderOptions,
    moments: HashMap<usize, AdamState>,
}

impl FirstOrderOptimizer {
    pub fn new(options: FirstOrderOptions) -> Self {
        FirstOrderOptimizer {
            options,
            moments: HashMap::new(),
        }
    }

    /// Applies one update step to every parameter in `params` that has
    /// `requires_grad() == true`, reading each one's current `.grad()`.
    /// Does not zero gradients; callers call [`crate::backward::zero_grad`]
    /// themselves between iterations as their training loop requires.
    pub fn step(&mut self, params: &[Value]) {
        match self.options.kind {
            FirstOrderKind::Sgd => self.step_sgd(params),
            FirstOrderKind::Adam => self.step_adam(params, false),
            FirstOrderKind::AdamW => self.step_adam(params, true),
        }
    }

    fn step_sgd(&self, params: &[Value]) {
        for p in params {
            if !p.requires_grad() {
                continue;
            }
            let new_value = p.value() - self.options.learning_rate * p.grad();
            p.set_value(new_value);
        }
    }

    fn step_adam(&mut self, params: &[Value], decoupled_weight_decay: bool) {
        let (beta1, beta2, eps, lr, wd) = (
            self.options.beta1,
            self.options.beta2,
            self.options.epsilon,
            self.options.learning_rate,
            self.options.weight_decay,
        );
        for p in params {
            if !p.requires_grad() {
                continue;
            }
            let state = self.moments.entry(p.addr()).or_insert(AdamState { m: 0.0, v: 0.0, t: 0 });
            state.t += 1;
            let g = if decoupled_weight_decay { p.grad() } else { p.grad() + wd * p.value() };

            state.m = beta1 * state.m + (1.0 - beta1) * g;
            state.v = beta2 * state.v + (1.0 - beta2) * g * g;

            let m_hat = state.m / (1.0 - beta1.powi(state.t as i32));
            let v_hat = state.v / (1.0 - beta2.powi(state.t as i32));

            let mut new_value = p.value() - lr * m_hat / (v_hat.sqrt() + eps);
            if decoupled_weight_decay {
                new_value -= lr * wd * p.value();
            }
            p.set_value(new_value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn scenario_f_adam_ignores_frozen_parameters() {
        let x = Value::weight(0.0, None);
        let y = Value::constant(0.0, None);
        x.set_grad(1.0);
        y.set_grad(1.0);

        let mut opt = FirstOrderOptimizer::new(FirstOrderOptions::adam(0.1));
        opt.step(&[x.clone(), y.clone()]);

        assert_ne!(x.value(), 0.0);
        assert_eq!(y.value(), 0.0);
    }

    #[test]
    fn sgd_moves_parameter_opposite_gradient() {
        let x = Value::weight(1.0, None);
        x.set_grad(2.0);
        let mut opt = FirstOrderOptimizer::new(FirstOrderOptions::sgd(0.1));
        opt.step(&[x.clone()]);
        assert!((x.value() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn adamw_applies_decoupled_weight_decay() {
        let x = Value::weight(1.0, None);
        x.set_grad(0.0);
        let mut opt = FirstOrderOptimizer::new(FirstOrderOptions::adamw(0.1, 0.1));
        opt.step(&[x.clone()]);
        assert!(x.value() < 1.0);
    }
}
