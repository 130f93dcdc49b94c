pub mod clock;
pub mod message_queue;
pub mod reprocessor;
pub mod repository;
pub mod subsystem;

pub use clock::*;
pub use message_queue::*;
pub use reprocessor::*;
pub use repository::*;
pub use subsystem::*;
