//! Levenberg–Marquardt (spec.md §4.8): damped Gauss-Newton minimizing
//! ½·Σ r_i(p)² given a compiled residual batch's value and Jacobian.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::ScalarFlowError;
use crate::optim::linalg::{normal_equations, solve_damped};
use crate::optim::options::LmOptions;
use crate::optim::result::{ConvergenceReason, OptimizeResult};
use crate::residuals::CompiledResiduals;
use tracing::{info, info_span, warn};

fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}

fn cost(residuals: &[f64]) -> f64 {
    0.5 * residuals.iter().map(|r| r * r).sum::<f64>()
}

/// Nielsen's reduction-ratio damping law (spec.md §4.8 "Adaptive damping"):
/// scales λ by ν when a step is rejected, doubling ν each consecutive
/// rejection; on acceptance λ shrinks in proportion to how well the linear
/// model predicted the actual cost drop.
struct AdaptiveDamping {
    nu: f64,
}

impl AdaptiveDamping {
    fn new() -> Self {
        AdaptiveDamping { nu: 2.0 }
    }

    fn reject(&mut self, lambda: f64) -> f64 {
        let next = lambda * self.nu;
        self.nu *= 2.0;
        next
    }

    fn accept(&mut self, lambda: f64, gain_ratio: f64) -> f64 {
        self.nu = 2.0;
        let factor = 1.0 - (2.0 * gain_ratio - 1.0).powi(3);
        (lambda * factor.max(1.0 / 3.0)).max(1e-12)
    }
}

/// Minimizes the residual batch held by `compiled` (spec.md §6
/// `nonlinear_least_squares(params[], compiled, options)`). `stop_flag`, if
/// given, is polled once per iteration (spec.md §5 "Cancellation"); when
/// set, the driver returns at that point with the current iterate and
/// reason `StoppedByCaller`.
pub fn nonlinear_least_squares(
    initial: &[f64],
    compiled: &CompiledResiduals,
    options: &LmOptions,
    stop_flag: Option<&AtomicBool>,
) -> OptimizeResult {
    let span = info_span!("levenberg_marquardt", max_iterations = options.max_iterations);
    let _guard = if options.verbose { Some(span.enter()) } else { None };

    let mut p = initial.to_vec();
    let mut lambda = options.initial_damping;
    let mut adaptive = AdaptiveDamping::new();
    let mut evaluations = 0;

    let (mut residuals, mut jacobian) = match compiled.evaluate(&p) {
        Ok(pair) => pair,
        Err(_) => return OptimizeResult::new(p, f64::NAN, 0, evaluations, ConvergenceReason::NonFiniteObjective),
    };
    evaluations += 1;
    let mut c = cost(&residuals);

    for iteration in 0..options.max_iterations {
        if stop_flag.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return OptimizeResult::new(p, c, iteration, evaluations, ConvergenceReason::StoppedByCaller);
        }

        let (jtj, jtr, diag) = normal_equations(&jacobian, &residuals);

        if inf_norm(jtr.as_slice()) <= options.gradient_tolerance {
            return OptimizeResult::new(p, c, iteration, evaluations, ConvergenceReason::GradientTolerance);
        }

        let mut accepted = false;
        let mut retries = 0;
        let max_retries = 30;

        while !accepted && retries < max_retries {
            retries += 1;
            let delta = match solve_damped(&jtj, &jtr, &diag, lambda, options.damping_mode) {
                Some(d) => d,
                None => {
                    lambda *= options.damping_increase_factor;
                    continue;
                }
            };

            let mut p_new: Vec<f64> = p.iter().zip(delta.iter()).map(|(pi, di)| pi + di).collect();
            let (mut residuals_new, mut jacobian_new) = match compiled.evaluate(&p_new) {
                Ok(pair) => pair,
                Err(_) => {
                    lambda *= options.damping_increase_factor;
                    continue;
                }
            };
            evaluations += 1;
            let mut c_new = cost(&residuals_new);

            if options.line_search_steps > 0 && c_new < c {
                for i in 1..=options.line_search_steps {
                    let t = 1.0 - (i as f64) / (options.line_search_steps as f64 + 1.0);
                    let candidate: Vec<f64> = p.iter().zip(delta.iter()).map(|(pi, di)| pi + t * di).collect();
                    if let Ok((r, j)) = compiled.evaluate(&candidate) {
                        evaluations += 1;
                        let cc = cost(&r);
                        if cc < c_new {
                            c_new = cc;
                            p_new = candidate;
                            residuals_new = r;
                            jacobian_new = j;
                        }
                    }
                }
            }

            if c_new.is_finite() && c_new < c {
                let param_moved = inf_norm(
                    &p.iter()
                        .zip(p_new.iter())
                        .map(|(a, b)| b - a)
                        .collect::<Vec<f64>>(),
                ) / inf_norm(&p).max(1.0);
                let cost_improved = (c - c_new).abs() / c.max(1.0);

                lambda = if options.adaptive_damping {
                    let gain_ratio = (c - c_new) / (c - cost_predicted(&jtj, &jtr, &delta)).max(1e-300);
                    adaptive.accept(lambda, gain_ratio.clamp(0.0, 1.0))
                } else {
                    lambda / options.damping_decrease_factor
                };

                p = p_new;
                residuals = residuals_new;
                jacobian = jacobian_new;
                c = c_new;
                accepted = true;

                if options.verbose {
                    info!(iteration, cost = c, lambda, "lm accepted step");
                }

                if cost_improved <= options.cost_tolerance {
                    return OptimizeResult::new(p, c, iteration + 1, evaluations, ConvergenceReason::CostTolerance);
                }
                if param_moved <= options.param_tolerance {
                    return OptimizeResult::new(p, c, iteration + 1, evaluations, ConvergenceReason::ParameterTolerance);
                }
            } else {
                lambda = if options.adaptive_damping {
                    adaptive.reject(lambda)
                } else {
                    lambda * options.damping_increase_factor
                };
            }
        }

        if !accepted {
            let err = ScalarFlowError::Solve { attempts: retries };
            warn!(error = %err, iteration, "lm exhausted damping retries without a solvable step");
            return OptimizeResult::new(p, c, iteration, evaluations, ConvergenceReason::NonFiniteObjective);
        }
    }

    OptimizeResult::new(p, c, options.max_iterations, evaluations, ConvergenceReason::MaxIterationsReached)
}

/// The linear model's predicted cost drop `½‖r‖² − ½‖r + JΔ‖²`, used only to
/// form the reduction ratio for adaptive damping.
fn cost_predicted(jtj: &nalgebra::DMatrix<f64>, jtr: &nalgebra::DVector<f64>, delta: &nalgebra::DVector<f64>) -> f64 {
    let linear = jtr.dot(delta);
    let quadratic = 0.5 * delta.dot(&(jtj * delta));
    -(linear + quadratic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn scenario_a_polynomial_converges() {
        let w = Value::param(0.5, "w");
        let b = Value::param(0.5, "b");
        let residuals = vec![&w * 2.0 - 4.0, &b * 3.0 - 9.0];
        let compiled = CompiledResiduals::new(&[w, b], &residuals).unwrap();

        let options = LmOptions::default();
        let result = nonlinear_least_squares(&[0.5, 0.5], &compiled, &options, None);
        assert!(result.success, "reason: {:?}", result.convergence_reason);
        assert!((result.params[0] - 2.0).abs() < 1e-4);
        assert!((result.params[1] - 3.0).abs() < 1e-4);
        assert!(result.final_cost <= 1e-10);
    }

    #[test]
    fn stop_flag_halts_at_next_iteration_boundary() {
        let w = Value::param(5.0, "w");
        let residuals = vec![&w * 2.0 - 4.0];
        let compiled = CompiledResiduals::new(&[w], &residuals).unwrap();
        let stop_flag = AtomicBool::new(true);
        let result = nonlinear_least_squares(&[5.0], &compiled, &LmOptions::default(), Some(&stop_flag));
        assert_eq!(result.convergence_reason, ConvergenceReason::StoppedByCaller);
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn scenario_b_circle_fit_converges() {
        let cx = Value::param(0.0, "cx");
        let cy = Value::param(0.0, "cy");
        let r = Value::param(1.0, "r");
        let points = [(1.0, 0.0), (0.0, 1.0), (-1.0, 0.0), (0.0, -1.0)];
        let residuals: Vec<Value> = points
            .iter()
            .map(|&(x, y)| {
                let dx = &cx - x;
                let dy = &cy - y;
                (&dx.square() + &dy.square()).sqrt() - &r
            })
            .collect();
        let compiled = CompiledResiduals::new(&[cx, cy, r], &residuals).unwrap();

        let options = LmOptions::default().with_max_iterations(200);
        let result = nonlinear_least_squares(&[0.0, 0.0, 1.0], &compiled, &options, None);
        assert!((result.params[0]).abs() < 1e-3);
        assert!((result.params[1]).abs() < 1e-3);
        assert!((result.params[2] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn monotone_decrease_on_accepted_steps() {
        let w = Value::param(5.0, "w");
        let residuals = vec![&w * 2.0 - 4.0];
        let compiled = CompiledResiduals::new(&[w], &residuals).unwrap();
        let options = LmOptions::default();
        let result = nonlinear_least_squares(&[5.0], &compiled, &options, None);
        assert!(result.final_cost < 0.5 * (2.0 * 5.0 - 4.0f64).powi(2));
    }
}
