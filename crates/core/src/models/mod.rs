//! # 数据模型
//!
//! 注册请求、路由计划、子系统响应、聚合档案以及失败单元。
//!
//! 所有时间字段使用 `DateTime<Utc>`；状态字段使用枚举，序列化为大写下划线形式，
//! 与下游报表和管理端保持一致。

pub mod error_log;
pub mod failed_unit;
pub mod message;
pub mod profile;
pub mod registration;

pub use error_log::*;
pub use failed_unit::*;
pub use message::*;
pub use profile::*;
pub use registration::*;
