// src/lib.rs

//! Website security posture scanning: probe a site for transport, header,
//! content, redirect and DNS signals, then reduce them to a 0–100 score.

pub mod config;
pub mod core;
pub mod logging;

pub use crate::config::ProbeConfig;
pub use crate::core::error::{ProbeError, ScanError};
pub use crate::core::models::{CheckRule, ScanReport, ScanTarget, ScoreResult, Signal, SignalValue};
pub use crate::core::scanner::Scanner;
pub use crate::core::scoring::{score, score_with_rules};
