//! Native stack growth for deep expression trees.
//!
//! The evaluator recurses over the expression arena; deeply nested source
//! (or a high call-depth limit) can outrun the OS thread stack long before
//! the logical depth bound trips. `ensure_sufficient_stack` grows the native
//! stack on demand at the recursion points that matter.

/// Grow the stack when fewer than `RED_ZONE` bytes remain.
const RED_ZONE: usize = 100 * 1024;

/// Allocate this much when growing.
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Run `f`, growing the native stack first when close to exhaustion.
///
/// On targets without stack growth support (wasm), this is a plain call.
#[cfg(not(target_family = "wasm"))]
#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[cfg(target_family = "wasm")]
#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
