// src/core/mod.rs

// The scanning core: validation, the probes and their orchestration, and
// the scoring that turns a report into a number.

/// Failure types shared by the validator and the probes.
pub mod error;

/// Data structures passed between the scanner, the scorer and callers:
/// `ScanTarget`, `Signal`, `ScanReport`, `CheckRule` and `ScoreResult`.
pub mod models;

/// The reference scoring policy, one row per check.
pub mod rules;

/// Houses the probes and the `Scanner` that runs them concurrently.
pub mod scanner;

pub mod scoring;

pub mod validator;
