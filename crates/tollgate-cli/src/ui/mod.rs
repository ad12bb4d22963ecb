//! Terminal output and prompts.

mod output;
pub mod prompts;

pub use output::{HealthStatus, error, header, health_check, hint, info, kv, success, warning};
