use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{RegistrationError, RegistrationResult};

/// 学生注册请求，提交后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub student_id: String,
    pub student_name: String,
    pub email: String,
    pub program: String,
    pub year_level: Option<String>,
}

impl RegistrationRequest {
    pub fn new(
        student_id: impl Into<String>,
        student_name: impl Into<String>,
        email: impl Into<String>,
        program: impl Into<String>,
        year_level: Option<String>,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            student_name: student_name.into(),
            email: email.into(),
            program: program.into(),
            year_level,
        }
    }

    /// 校验必填字段与邮箱格式
    pub fn validate(&self) -> RegistrationResult<()> {
        if self.student_id.trim().is_empty() {
            return Err(RegistrationError::validation("学号不能为空"));
        }
        if self.student_name.trim().is_empty() {
            return Err(RegistrationError::validation("学生姓名不能为空"));
        }
        if self.program.trim().is_empty() {
            return Err(RegistrationError::validation("专业不能为空"));
        }

        let email = self.email.trim();
        let valid_email = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !domain.contains('@')
            }
            None => false,
        };
        if !valid_email {
            return Err(RegistrationError::validation(format!(
                "邮箱格式无效: {}",
                self.email
            )));
        }

        Ok(())
    }
}

/// 下游子系统标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Subsystem {
    Academic,
    Housing,
    Billing,
    Library,
}

impl Subsystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subsystem::Academic => "ACADEMIC",
            Subsystem::Housing => "HOUSING",
            Subsystem::Billing => "BILLING",
            Subsystem::Library => "LIBRARY",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subsystem {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ACADEMIC" => Ok(Subsystem::Academic),
            "HOUSING" => Ok(Subsystem::Housing),
            "BILLING" => Ok(Subsystem::Billing),
            "LIBRARY" => Ok(Subsystem::Library),
            other => Err(RegistrationError::Routing(format!("未知子系统: {other}"))),
        }
    }
}

/// 路由计划
///
/// `targets` 始终包含 Library，且 Housing 与 Billing 二者恰有其一。
/// Academic 不属于路由决策，每次聚合都会调用。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingPlan {
    pub is_first_year: bool,
    pub targets: BTreeSet<Subsystem>,
}

impl RoutingPlan {
    /// 住宿或计费，取决于是否为新生
    pub fn housing_or_billing(&self) -> Subsystem {
        if self.is_first_year {
            Subsystem::Housing
        } else {
            Subsystem::Billing
        }
    }

    /// 聚合时需要调用的全部子系统，按固定顺序
    pub fn subsystems_to_invoke(&self) -> Vec<Subsystem> {
        std::iter::once(Subsystem::Academic)
            .chain(self.targets.iter().copied())
            .collect()
    }

    /// 返回给提交方的路由说明
    pub fn routing_message(&self) -> String {
        if self.is_first_year {
            "新生: 路由至住宿系统分配宿舍，并开通图书馆账户".to_string()
        } else {
            "在读生: 路由至计费系统核算学费，并开通图书馆账户".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str) -> RegistrationRequest {
        RegistrationRequest::new("S001", "Alice", email, "Computer Science", Some("1".into()))
    }

    #[test]
    fn test_validate_accepts_well_formed_request() {
        assert!(request("alice@rsu.edu").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_email() {
        for email in ["", "alice", "alice@", "@rsu.edu", "alice@rsu", "alice@.edu"] {
            let result = request(email).validate();
            assert!(
                matches!(result, Err(RegistrationError::Validation(_))),
                "email {email:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_rejects_blank_student_id() {
        let mut req = request("alice@rsu.edu");
        req.student_id = "   ".into();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_request_uses_camel_case_on_wire() {
        let json = serde_json::to_value(request("alice@rsu.edu")).unwrap();
        assert_eq!(json["studentId"], "S001");
        assert_eq!(json["yearLevel"], "1");
    }

    #[test]
    fn test_subsystems_to_invoke_starts_with_academic() {
        let plan = RoutingPlan {
            is_first_year: false,
            targets: [Subsystem::Billing, Subsystem::Library].into_iter().collect(),
        };
        assert_eq!(
            plan.subsystems_to_invoke(),
            vec![Subsystem::Academic, Subsystem::Billing, Subsystem::Library]
        );
        assert_eq!(plan.housing_or_billing(), Subsystem::Billing);
    }

    #[test]
    fn test_subsystem_from_str() {
        assert_eq!("library".parse::<Subsystem>().unwrap(), Subsystem::Library);
        assert!("dining".parse::<Subsystem>().is_err());
    }
}
