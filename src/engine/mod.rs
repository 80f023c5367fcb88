pub mod agent;
pub mod dispatch;
pub mod executor;
pub mod lifecycle;
pub mod memory;
pub mod monitor;
pub mod queue;
pub mod registry;
pub mod results;
pub mod scheduler;
pub mod work_loop;

pub use agent::{Agent, AgentState};
pub use memory::AgentMemory;
pub use monitor::HealthMonitor;
pub use queue::{QueueEntry, TaskQueue};
pub use registry::AgentRegistry;
pub use results::ResultStore;
