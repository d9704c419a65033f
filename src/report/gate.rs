//! 部署闸门：报告 -> 放行 / 阻断
use super::model::{ComplianceReport, Finding};

/// 闸门结论
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// 阻断，携带达到阈值的检测结果
    Block(Vec<Finding>),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn reasons(&self) -> &[Finding] {
        match self {
            Decision::Allow => &[],
            Decision::Block(findings) => findings.as_slice(),
        }
    }
}

/// 部署闸门
pub struct GateDecision;

impl GateDecision {
    /// 纯函数：阈值随报告携带，不依赖当前生效的宪章
    pub fn decide(report: &ComplianceReport) -> Decision {
        if !report.is_blocked() {
            return Decision::Allow;
        }
        Decision::Block(report.blocking_findings().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportBuilder;
    use crate::report::model::LineRange;
    use crate::rule::model::Severity;
    use crate::rule::RuleLoader;

    const DOC: &str = r#"{"version": "g1", "rules": {
        "crit": {"category": "access-control", "severity": "CRITICAL", "matcher": {"type": "keyword", "keywords": ["selfdestruct"]}},
        "warn": {"category": "style", "severity": "WARNING", "matcher": {"type": "keyword", "keywords": ["tx.origin"]}}
    }}"#;

    fn finding(rule_id: &str, severity: Severity, line: usize) -> Finding {
        Finding {
            rule_id: rule_id.to_string(),
            severity,
            category: "c".to_string(),
            location: LineRange::single(line),
            message: String::new(),
            matched_text: String::new(),
        }
    }

    #[test]
    fn test_block_carries_only_blocking_findings() {
        let ruleset = RuleLoader::load(DOC).unwrap();
        let report = ReportBuilder::build(
            "c",
            &ruleset,
            vec![finding("warn", Severity::Warning, 2), finding("crit", Severity::Critical, 9)],
        );
        let decision = GateDecision::decide(&report);
        assert!(!decision.is_allowed());
        assert_eq!(decision.reasons().len(), 1);
        assert_eq!(decision.reasons()[0].rule_id, "crit");
    }

    #[test]
    fn test_allow_below_threshold() {
        let ruleset = RuleLoader::load(DOC).unwrap();
        let report = ReportBuilder::build("c", &ruleset, vec![finding("warn", Severity::Warning, 2)]);
        assert_eq!(GateDecision::decide(&report), Decision::Allow);
        assert!(GateDecision::decide(&report).reasons().is_empty());
    }
}
