use thiserror::Error;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    #[error("配置解析失败: {0}")]
    Parse(String),

    #[error("配置项 {field} 无效: {message}")]
    InvalidValue { field: String, message: String },

    #[error("配置加载失败: {0}")]
    Load(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    pub fn invalid<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}

/// 各配置段实现的校验接口
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}

pub(crate) fn ensure_positive(field: &str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::invalid(field, "必须大于0"));
    }
    Ok(())
}

pub(crate) fn ensure_not_blank(field: &str, value: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid(field, "不能为空"));
    }
    Ok(())
}

pub(crate) fn ensure_rate(field: &str, value: f64) -> ConfigResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::invalid(
            field,
            format!("必须在0.0到1.0之间，当前值: {value}"),
        ));
    }
    Ok(())
}
