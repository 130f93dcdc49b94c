//! 内容路由、并发扇出聚合与注册处理管道

pub mod aggregator;
pub mod clients;
pub mod pipeline;
pub mod router;

pub use aggregator::ProfileAggregator;
pub use clients::SimulatedSubsystemClient;
pub use pipeline::RegistrationPipeline;
pub use router::ContentBasedRouter;
