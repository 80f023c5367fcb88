pub mod file;
pub mod memory;
pub mod traits;

pub use file::JsonFileStateStore;
pub use memory::InMemoryStateStore;
pub use traits::{PersistedAgent, StateStore};
