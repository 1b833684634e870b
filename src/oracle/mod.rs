pub mod http;
pub mod retry;

pub use http::HttpOracle;
pub use retry::{AttemptError, RetryPolicy, Sleeper, ThreadSleeper};

/// Everything the oracle needs to propose a rewrite of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairRequest<'a> {
    pub problem_code: &'a str,
    pub error_description: &'a str,
    /// Reference code shown alongside the problem; may be empty.
    pub context_code: &'a str,
    pub language: &'a str,
}

/// Outcome of one oracle consultation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proposal {
    /// Full replacement text for the problem code.
    Fixed(String),
    /// The oracle was reached but could not produce a usable fix.
    Failed(String),
    /// No oracle is configured or reachable.
    Unavailable,
}

/// A service that proposes full-file rewrites.
///
/// Implementations must be safe to retry and must not corrupt code that is
/// already correct; they signal `Failed` instead.
pub trait RepairOracle {
    fn propose(&self, request: &RepairRequest<'_>) -> Proposal;
}

impl<T: RepairOracle + ?Sized> RepairOracle for &T {
    fn propose(&self, request: &RepairRequest<'_>) -> Proposal {
        (**self).propose(request)
    }
}

impl<T: RepairOracle + ?Sized> RepairOracle for Box<T> {
    fn propose(&self, request: &RepairRequest<'_>) -> Proposal {
        (**self).propose(request)
    }
}

/// Oracle stand-in for runs without a configured endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOracle;

impl RepairOracle for NoOracle {
    fn propose(&self, _request: &RepairRequest<'_>) -> Proposal {
        Proposal::Unavailable
    }
}
