pub mod abilities;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod runtime;
pub mod storage;
pub mod types;

pub use abilities::{Ability, AbilityContext, AbilityRegistry};
pub use config::Config;
pub use error::RuntimeError;
pub use runtime::{Runtime, RuntimeBuilder};
pub use types::*;
