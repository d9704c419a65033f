//! 报告组装
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::model::{ComplianceReport, Finding, ReportSummary, Verdict};
use crate::compiler::RuleSet;
use crate::utils::FindingResolver;

/// 报告构建器
pub struct ReportBuilder;

impl ReportBuilder {
    /// 组装合规报告（时间戳取当前时间）
    pub fn build(contract_id: &str, ruleset: &RuleSet, findings: Vec<Finding>) -> ComplianceReport {
        Self::build_at(contract_id, ruleset, findings, Utc::now())
    }

    /// 以指定时间戳组装合规报告，便于复现同一份报告
    ///
    /// 输入即使未经归并也会再次去重排序；引用了规则集之外规则的结果会被丢弃
    pub fn build_at(
        contract_id: &str,
        ruleset: &RuleSet,
        findings: Vec<Finding>,
        generated_at: DateTime<Utc>,
    ) -> ComplianceReport {
        let known: Vec<Finding> = findings
            .into_iter()
            .filter(|finding| {
                let exists = ruleset.contains(&finding.rule_id);
                if !exists {
                    warn!("丢弃未知规则的检测结果：{}", finding.rule_id);
                }
                exists
            })
            .collect();
        let findings = FindingResolver::resolve(known);

        let verdict = if findings.iter().any(|f| ruleset.is_blocking(f.severity)) {
            Verdict::Blocked
        } else {
            Verdict::Pass
        };
        let summary = ReportSummary::from_findings(&findings);
        debug!(
            "合约 {} 报告已生成：{}，结果 {} 条（宪章版本 {}）",
            contract_id,
            verdict,
            findings.len(),
            ruleset.version()
        );

        ComplianceReport {
            contract_id: contract_id.to_string(),
            ruleset_version: ruleset.version().to_string(),
            blocking_severity: ruleset.blocking_severity(),
            verdict,
            findings,
            summary,
            generated_at,
        }
    }
}
