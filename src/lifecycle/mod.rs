pub mod alerts;
pub mod health;
pub mod restart;
pub mod state_machine;

pub use alerts::{Alert, AlertKind, AlertManager, AlertSeverity};
pub use health::{
    AgentHealth, HealthCounts, HealthEvaluator, HealthProbe, HealthSnapshot, OverallHealth,
};
pub use restart::{RestartDecision, RestartPolicy};
pub use state_machine::{AgentStateMachine, LifecycleOp, Transition};
