//! Process-wide (here: thread-local) no-grad context.
//!
//! While the flag is set, [`crate::value::Value`] factory operations still
//! record predecessor references (so forward evaluation keeps working) but
//! force `requires_grad = false` on the result, which in turn means the
//! backward pass never writes a contribution into those nodes (see
//! `backward.rs`). The flag is restored on every exit path, including
//! panics, via the guard's `Drop` impl.

use std::cell::Cell;

thread_local! {
    static NO_GRAD: Cell<bool> = Cell::new(false);
}

/// True while inside a [`no_grad`] scope.
pub fn is_no_grad() -> bool {
    NO_GRAD.with(|flag| flag.get())
}

struct NoGradGuard {
    previous: bool,
}

impl Drop for NoGradGuard {
    fn drop(&mut self) {
        NO_GRAD.with(|flag| flag.set(self.previous));
    }
}

/// Run `f` with the no-grad flag set, restoring the previous value
/// afterward regardless of how `f` returns (including unwinding).
pub fn no_grad<R>(f: impl FnOnce() -> R) -> R {
    let previous = NO_GRAD.with(|flag| flag.replace(true));
    let _guard = NoGradGuard { previous };
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn scoped_flag_restores_on_normal_exit() {
        assert!(!is_no_grad());
        no_grad(|| assert!(is_no_grad()));
        assert!(!is_no_grad());
    }

    #[test]
    fn scoped_flag_restores_on_panic() {
        let result = std::panic::catch_unwind(|| {
            no_grad(|| panic!("boom"));
        });
        assert!(result.is_err());
        assert!(!is_no_grad());
    }

    #[test]
    fn derived_values_are_non_differentiable_under_no_grad() {
        let a = Value::weight(2.0, None);
        let b = no_grad(|| a.clone() + Value::weight(3.0, None));
        assert!(!b.requires_grad());
    }
}
