pub mod in_memory_error_log;
pub mod in_memory_queue;
pub mod in_memory_repository;
pub mod observability;

pub use in_memory_error_log::InMemoryErrorLogRepository;
pub use in_memory_queue::{InMemoryMessageQueue, InMemoryQueueConfig};
pub use in_memory_repository::{InMemoryFailedUnitRepository, InMemoryProfileRepository};
pub use observability::*;
