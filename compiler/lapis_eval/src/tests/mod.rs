//! End-to-end evaluator scenarios.
//!
//! Unit tests live next to their modules; these files exercise whole
//! dispatch paths through small programs built with the [`support`]
//! builders: registration, evaluation, and the observable results.

mod support;

mod dispatch_tests;
mod exception_tests;
mod overload_tests;
