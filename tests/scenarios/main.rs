//! Scenario-based tests for ci-runner

mod helpers;

mod fail_fast;
mod triggers;
mod variables;
