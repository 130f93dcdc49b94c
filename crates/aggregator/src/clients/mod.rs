//! 下游子系统客户端实现

pub mod simulated;

pub use simulated::SimulatedSubsystemClient;
