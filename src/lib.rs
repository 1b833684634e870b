pub mod cli;
pub mod config;
pub mod defect;
pub mod error;
pub mod fix;
pub mod metrics;
pub mod oracle;
pub mod plan;
pub mod prompts;
pub mod refine;
pub mod result;
pub mod store;
pub mod strategy;

#[cfg(test)]
pub(crate) mod test_helpers;
