//! Limited-memory BFGS (spec.md §4.7): minimizes a scalar objective given
//! its value and gradient at arbitrary points, using a bounded history of
//! (s, y) curvature pairs and the two-loop recursion for the search
//! direction.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::optim::linesearch::{backtracking_line_search, LineSearchOutcome};
use crate::optim::options::LbfgsOptions;
use crate::optim::result::{ConvergenceReason, OptimizeResult};
use crate::residuals::CompiledResiduals;
use tracing::{info, info_span};

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn sub(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b.iter()).map(|(x, y)| x - y).collect()
}

fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}

/// Two-loop recursion (spec.md §4.7 step 3): produces the quasi-Newton
/// descent direction `-H_k g` from the stored curvature history without
/// ever materializing `H_k`.
fn two_loop_direction(g: &[f64], history: &VecDeque<(Vec<f64>, Vec<f64>)>) -> Vec<f64> {
    let mut q = g.to_vec();
    let mut alphas = Vec::with_capacity(history.len());
    let mut rhos = Vec::with_capacity(history.len());

    for (s, y) in history.iter().rev() {
        let rho = 1.0 / dot(y, s);
        let alpha = rho * dot(s, &q);
        for (qi, yi) in q.iter_mut().zip(y.iter()) {
            *qi -= alpha * yi;
        }
        alphas.push(alpha);
        rhos.push(rho);
    }
    alphas.reverse();
    rhos.reverse();

    let gamma = match history.back() {
        Some((s, y)) => dot(s, y) / dot(y, y).max(f64::EPSILON),
        None => 1.0,
    };
    let mut r: Vec<f64> = q.iter().map(|qi| qi * gamma).collect();

    for (i, (s, y)) in history.iter().enumerate() {
        let rho = rhos[i];
        let beta = rho * dot(y, &r);
        let alpha = alphas[i];
        for (ri, si) in r.iter_mut().zip(s.iter()) {
            *ri += si * (alpha - beta);
        }
    }

    r.iter().map(|ri| -ri).collect()
}

/// Core driver operating on a plain value+gradient closure, so it works
/// equally against a [`CompiledResiduals`] objective or a hand-written one.
/// `stop_flag`, if given, is polled once per iteration (spec.md §5
/// "Cancellation"); when set, the driver returns at that point with the
/// current iterate and reason `StoppedByCaller`.
pub fn lbfgs_with_eval(
    initial: &[f64],
    options: &LbfgsOptions,
    mut eval: impl FnMut(&[f64]) -> (f64, Vec<f64>),
    stop_flag: Option<&AtomicBool>,
) -> OptimizeResult {
    let span = info_span!("lbfgs", max_iterations = options.max_iterations);
    let _guard = if options.verbose { Some(span.enter()) } else { None };

    let mut p = initial.to_vec();
    let mut history: VecDeque<(Vec<f64>, Vec<f64>)> = VecDeque::with_capacity(options.history_size);
    let mut evaluations = 0;

    let (mut f, mut g) = eval(&p);
    evaluations += 1;
    if !f.is_finite() || g.iter().any(|x| !x.is_finite()) {
        return OptimizeResult::new(p, f, 0, evaluations, ConvergenceReason::NonFiniteObjective);
    }

    for iteration in 0..options.max_iterations {
        if stop_flag.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return OptimizeResult::new(p, f, iteration, evaluations, ConvergenceReason::StoppedByCaller);
        }

        if inf_norm(&g) <= options.gradient_tolerance {
            return OptimizeResult::new(p, f, iteration, evaluations, ConvergenceReason::GradientTolerance);
        }

        let d = two_loop_direction(&g, &history);
        let search = backtracking_line_search(&p, f, &g, &d, options.line_search_max_steps, |x| {
            evaluations += 1;
            eval(x)
        });

        let result = match search {
            LineSearchOutcome::Accepted(result) => result,
            LineSearchOutcome::NonFiniteExhausted => {
                return OptimizeResult::new(p, f, iteration, evaluations, ConvergenceReason::NonFiniteObjective);
            }
            LineSearchOutcome::ArmijoExhausted => {
                return OptimizeResult::new(p, f, iteration, evaluations, ConvergenceReason::LineSearchFailed);
            }
        };

        let s: Vec<f64> = sub(&result.p_new, &p);
        let y: Vec<f64> = sub(&result.g_new, &g);
        let curvature = dot(&y, &s);

        let cost_improved = (f - result.f_new).abs() / f.abs().max(1.0);
        let param_moved = inf_norm(&s);

        p = result.p_new;
        let f_prev = f;
        f = result.f_new;
        g = result.g_new;

        if curvature > 0.0 {
            if history.len() == options.history_size.max(1) {
                history.pop_front();
            }
            history.push_back((s, y));
        } else {
            history.clear();
        }

        if options.verbose {
            info!(iteration, cost = f, gradient_inf_norm = inf_norm(&g), "lbfgs step");
        }

        if cost_improved <= options.cost_tolerance && f_prev.is_finite() {
            return OptimizeResult::new(p, f, iteration + 1, evaluations, ConvergenceReason::CostTolerance);
        }
        if param_moved <= options.param_tolerance {
            return OptimizeResult::new(p, f, iteration + 1, evaluations, ConvergenceReason::ParameterTolerance);
        }
    }

    OptimizeResult::new(p, f, options.max_iterations, evaluations, ConvergenceReason::MaxIterationsReached)
}

/// Minimizes the single-output objective held by `compiled` (spec.md §6
/// `lbfgs(params[], compiled, options)`).
pub fn lbfgs(
    initial: &[f64],
    compiled: &CompiledResiduals,
    options: &LbfgsOptions,
    stop_flag: Option<&AtomicBool>,
) -> OptimizeResult {
    lbfgs_with_eval(
        initial,
        options,
        |p| {
            compiled
                .evaluate_gradient(p)
                .expect("lbfgs requires a single-output CompiledResiduals")
        },
        stop_flag,
    )
}
