//! Control plane for headless browser automation: a Task Queue with
//! priority and dependency scheduling, an LLM Router that picks a
//! provider/model per tool call and self-tunes over time, and an Adaptive
//! Memory Optimizer that keeps agent context within its token budget.

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod runtime;
pub mod services;

pub use domain::models::Config;
pub use runtime::RuntimeContext;
