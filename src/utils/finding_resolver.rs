//! 检测结果归并工具
//! 负责去重（规则ID + 起始行）和稳定排序（等级降序、位置升序、规则ID升序）

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::report::model::Finding;

/// 检测结果归并工具
pub struct FindingResolver;

impl FindingResolver {
    /// 去重并排序
    /// 同一规则在同一位置的重复结果只保留第一条；不同规则命中同一段代码全部保留
    pub fn resolve(findings: Vec<Finding>) -> Vec<Finding> {
        let mut seen = HashSet::with_capacity(findings.len());
        let mut resolved: Vec<Finding> = findings
            .into_iter()
            .filter(|finding| seen.insert((finding.rule_id.clone(), finding.location.start)))
            .collect();

        resolved.sort_by(Self::compare);
        resolved
    }

    /// 报告排序规则
    pub fn compare(a: &Finding, b: &Finding) -> Ordering {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.location.cmp(&b.location))
            .then_with(|| a.rule_id.cmp(&b.rule_id))
    }

    /// 检查结果是否满足排序和去重约束
    pub fn is_resolved(findings: &[Finding]) -> bool {
        let ordered = findings
            .windows(2)
            .all(|pair| Self::compare(&pair[0], &pair[1]) != Ordering::Greater);
        let mut seen = HashSet::new();
        let unique = findings
            .iter()
            .all(|f| seen.insert((f.rule_id.as_str(), f.location.start)));
        ordered && unique
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::model::LineRange;
    use crate::rule::model::Severity;

    fn finding(rule_id: &str, severity: Severity, line: usize, message: &str) -> Finding {
        Finding {
            rule_id: rule_id.to_string(),
            severity,
            category: "test".to_string(),
            location: LineRange::single(line),
            message: message.to_string(),
            matched_text: String::new(),
        }
    }

    #[test]
    fn test_resolve_orders_by_severity_line_rule() {
        let resolved = FindingResolver::resolve(vec![
            finding("b", Severity::Info, 1, ""),
            finding("z", Severity::Critical, 9, ""),
            finding("a", Severity::Critical, 9, ""),
            finding("c", Severity::Warning, 3, ""),
            finding("a", Severity::Critical, 2, ""),
        ]);
        let order: Vec<_> = resolved.iter().map(|f| (f.rule_id.as_str(), f.location.start)).collect();
        assert_eq!(order, vec![("a", 2), ("a", 9), ("z", 9), ("c", 3), ("b", 1)]);
        assert!(FindingResolver::is_resolved(&resolved));
    }

    #[test]
    fn test_resolve_keeps_first_duplicate_and_overlapping_rules() {
        let resolved = FindingResolver::resolve(vec![
            finding("r1", Severity::Warning, 4, "first"),
            finding("r1", Severity::Warning, 4, "second"),
            finding("r2", Severity::Warning, 4, "other rule"),
        ]);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].message, "first");
        assert_eq!(resolved[1].rule_id, "r2");
    }

    #[test]
    fn test_resolve_is_independent_of_input_order() {
        let findings = vec![
            finding("x", Severity::Info, 7, ""),
            finding("y", Severity::Critical, 1, ""),
            finding("w", Severity::Warning, 7, ""),
            finding("v", Severity::Warning, 0, ""),
        ];
        let mut reversed = findings.clone();
        reversed.reverse();
        assert_eq!(FindingResolver::resolve(findings), FindingResolver::resolve(reversed));
    }

    #[test]
    fn test_resolve_empty() {
        assert!(FindingResolver::resolve(Vec::new()).is_empty());
        assert!(FindingResolver::is_resolved(&[]));
    }
}
