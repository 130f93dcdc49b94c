//! 学生注册系统的组合根：应用装配与优雅关闭

pub mod app;
pub mod shutdown;

pub use app::Application;
pub use shutdown::ShutdownManager;
