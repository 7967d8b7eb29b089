//! Optimizer option structs (spec.md §6 "Options enumerated"). Plain structs
//! with a `Default` impl and `with_*` builder methods, in the teacher's
//! style — no builder-derive crate.

/// Damping mode for Levenberg–Marquardt (spec.md §4.8 step 1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DampingMode {
    /// `lambda * diag(J^T J)` — Marquardt's scaling, the spec's default.
    Marquardt,
    /// `lambda * I` — classical Levenberg.
    Levenberg,
}

#[derive(Clone, Debug)]
pub struct LbfgsOptions {
    pub max_iterations: usize,
    pub gradient_tolerance: f64,
    pub cost_tolerance: f64,
    pub param_tolerance: f64,
    pub history_size: usize,
    pub line_search_max_steps: usize,
    pub verbose: bool,
}

impl Default for LbfgsOptions {
    fn default() -> Self {
        LbfgsOptions {
            max_iterations: 200,
            gradient_tolerance: 1e-8,
            cost_tolerance: 1e-12,
            param_tolerance: 1e-10,
            history_size: 10,
            line_search_max_steps: 20,
            verbose: false,
        }
    }
}

impl LbfgsOptions {
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_gradient_tolerance(mut self, tol: f64) -> Self {
        self.gradient_tolerance = tol;
        self
    }

    pub fn with_cost_tolerance(mut self, tol: f64) -> Self {
        self.cost_tolerance = tol;
        self
    }

    pub fn with_param_tolerance(mut self, tol: f64) -> Self {
        self.param_tolerance = tol;
        self
    }

    pub fn with_history_size(mut self, m: usize) -> Self {
        self.history_size = m;
        self
    }

    pub fn with_line_search_max_steps(mut self, n: usize) -> Self {
        self.line_search_max_steps = n;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

#[derive(Clone, Debug)]
pub struct LmOptions {
    pub max_iterations: usize,
    pub cost_tolerance: f64,
    pub param_tolerance: f64,
    pub gradient_tolerance: f64,
    pub initial_damping: f64,
    pub damping_increase_factor: f64,
    pub damping_decrease_factor: f64,
    pub line_search_steps: usize,
    pub adaptive_damping: bool,
    pub damping_mode: DampingMode,
    pub verbose: bool,
}

impl Default for LmOptions {
    fn default() -> Self {
        LmOptions {
            max_iterations: 100,
            cost_tolerance: 1e-12,
            param_tolerance: 1e-10,
            gradient_tolerance: 1e-8,
            initial_damping: 1e-3,
            damping_increase_factor: 10.0,
            damping_decrease_factor: 10.0,
            line_search_steps: 0,
            adaptive_damping: false,
            damping_mode: DampingMode::Marquardt,
            verbose: false,
        }
    }
}

impl LmOptions {
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_cost_tolerance(mut self, tol: f64) -> Self {
        self.cost_tolerance = tol;
        self
    }

    pub fn with_param_tolerance(mut self, tol: f64) -> Self {
        self.param_tolerance = tol;
        self
    }

    pub fn with_gradient_tolerance(mut self, tol: f64) -> Self {
        self.gradient_tolerance = tol;
        self
    }

    pub fn with_initial_damping(mut self, lambda: f64) -> Self {
        self.initial_damping = lambda;
        self
    }

    pub fn with_damping_increase_factor(mut self, f: f64) -> Self {
        self.damping_increase_factor = f;
        self
    }

    pub fn with_damping_decrease_factor(mut self, f: f64) -> Self {
        self.damping_decrease_factor = f;
        self
    }

    pub fn with_line_search_steps(mut self, n: usize) -> Self {
        self.line_search_steps = n;
        self
    }

    pub fn with_adaptive_damping(mut self, on: bool) -> Self {
        self.adaptive_damping = on;
        self
    }

    pub fn with_damping_mode(mut self, mode: DampingMode) -> Self {
        self.damping_mode = mode;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FirstOrderKind {
    Sgd,
    Adam,
    AdamW,
}

#[derive(Clone, Debug)]
pub struct FirstOrderOptions {
    pub kind: FirstOrderKind,
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub weight_decay: f64,
}

impl Default for FirstOrderOptions {
    fn default() -> Self {
        FirstOrderOptions {
            kind: FirstOrderKind::Sgd,
            learning_rate: 1e-2,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay: 0.0,
        }
    }
}

impl FirstOrderOptions {
    pub fn sgd(learning_rate: f64) -> Self {
        FirstOrderOptions {
            kind: FirstOrderKind::Sgd,
            learning_rate,
            ..Default::default()
        }
    }

    pub fn adam(learning_rate: f64) -> Self {
        FirstOrderOptions {
            kind: FirstOrderKind::Adam,
            learning_rate,
            ..Default::default()
        }
    }

    pub fn adamw(learning_rate: f64, weight_decay: f64) -> Self {
        FirstOrderOptions {
            kind: FirstOrderKind::AdamW,
            learning_rate,
            weight_decay,
            ..Default::default()
        }
    }

    pub fn with_betas(mut self, beta1: f64, beta2: f64) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = weight_decay;
        self
    }
}
