use std::collections::BTreeSet;

use registration_core::models::{RegistrationRequest, RoutingPlan, Subsystem};
use tracing::debug;

/// 视为新生的年级写法（已去空白并转小写）
const FIRST_YEAR_MARKERS: [&str; 4] = ["1", "1st year", "first year", "freshman"];

/// 基于内容的路由器
///
/// 按年级决定下游目标：新生走住宿，其余走计费，图书馆总是包含在内。
/// 无法识别或缺失的年级按非新生处理。
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentBasedRouter;

impl ContentBasedRouter {
    pub fn new() -> Self {
        Self
    }

    pub fn is_first_year(year_level: Option<&str>) -> bool {
        year_level
            .map(|level| level.trim().to_lowercase())
            .is_some_and(|level| FIRST_YEAR_MARKERS.contains(&level.as_str()))
    }

    pub fn route(&self, request: &RegistrationRequest) -> RoutingPlan {
        let is_first_year = Self::is_first_year(request.year_level.as_deref());
        let mut targets = BTreeSet::from([Subsystem::Library]);
        targets.insert(if is_first_year {
            Subsystem::Housing
        } else {
            Subsystem::Billing
        });

        debug!(
            "学生 {} 路由完成 (新生: {}, 目标: {:?})",
            request.student_id, is_first_year, targets
        );

        RoutingPlan {
            is_first_year,
            targets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_year_markers() {
        assert!(ContentBasedRouter::is_first_year(Some("1")));
        assert!(ContentBasedRouter::is_first_year(Some("1st Year")));
        assert!(ContentBasedRouter::is_first_year(Some(" Freshman ")));
        assert!(ContentBasedRouter::is_first_year(Some("FIRST YEAR")));
    }

    #[test]
    fn test_not_first_year() {
        assert!(!ContentBasedRouter::is_first_year(None));
        assert!(!ContentBasedRouter::is_first_year(Some("")));
        assert!(!ContentBasedRouter::is_first_year(Some("2")));
        assert!(!ContentBasedRouter::is_first_year(Some("first")));
        assert!(!ContentBasedRouter::is_first_year(Some("sophomore")));
    }
}
