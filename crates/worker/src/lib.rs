//! 注册提交入口与注册队列消费者

pub mod consumer;
pub mod intake;

pub use consumer::{PollReport, RegistrationConsumer};
pub use intake::{RegistrationIntake, SubmissionReceipt, SubmissionStatus};
