//! 报告数据模型定义
//! Finding 和 ComplianceReport 创建后只读；报告是跨越系统边界的唯一产物

use std::collections::BTreeMap;
use std::fmt;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::compiler::RuleDefinition;
use crate::error::{RuleEvaluationError, TfResult};
use crate::rule::model::{Severity, CATEGORY_RULE_ERROR};

/// 行范围（从 1 开始；0 表示不绑定具体源码行）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineRange {
    #[serde(rename = "line")]
    pub start: usize,
    #[serde(rename = "endLine")]
    pub end: usize,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn single(line: usize) -> Self {
        Self::new(line, line)
    }

    /// 不绑定源码行
    pub fn unbound() -> Self {
        Self::new(0, 0)
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "L{}", self.start)
        } else {
            write!(f, "L{}-L{}", self.start, self.end)
        }
    }
}

/// 单条检测结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub rule_id: String,
    pub severity: Severity,
    pub category: String,
    #[serde(flatten)]
    pub location: LineRange,
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub matched_text: String,
}

impl Finding {
    /// 由规则命中创建
    pub fn new(rule: &RuleDefinition, location: LineRange, matched_text: String, message: String) -> Self {
        Self {
            rule_id: rule.id.clone(),
            severity: rule.severity,
            category: rule.category.clone(),
            location,
            message,
            matched_text,
        }
    }

    /// 规则求值失败时的降级结果
    pub fn rule_error(rule: &RuleDefinition, error: &RuleEvaluationError) -> Self {
        Self {
            rule_id: rule.id.clone(),
            severity: Severity::Warning,
            category: CATEGORY_RULE_ERROR.to_string(),
            location: LineRange::unbound(),
            message: error.to_string(),
            matched_text: String::new(),
        }
    }

    pub fn is_rule_error(&self) -> bool {
        self.category == CATEGORY_RULE_ERROR
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {} ({}): {}", self.severity, self.location, self.rule_id, self.category, self.message)
    }
}

/// 总体结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Blocked,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("PASS"),
            Verdict::Blocked => f.write_str("BLOCKED"),
        }
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
    // 分类 -> 数量
    pub categories: BTreeMap<String, usize>,
}

impl ReportSummary {
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut summary = Self::default();
        for finding in findings {
            match finding.severity {
                Severity::Critical => summary.critical += 1,
                Severity::Warning => summary.warning += 1,
                Severity::Info => summary.info += 1,
            }
            *summary.categories.entry(finding.category.clone()).or_insert(0) += 1;
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.critical + self.warning + self.info
    }
}

/// 合规报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub(crate) contract_id: String,
    pub(crate) ruleset_version: String,
    pub(crate) blocking_severity: Severity,
    pub(crate) verdict: Verdict,
    pub(crate) findings: Vec<Finding>,
    pub(crate) summary: ReportSummary,
    #[serde(with = "rfc3339_millis")]
    pub(crate) generated_at: DateTime<Utc>,
}

impl ComplianceReport {
    pub fn contract_id(&self) -> &str {
        &self.contract_id
    }

    pub fn ruleset_version(&self) -> &str {
        &self.ruleset_version
    }

    pub fn blocking_severity(&self) -> Severity {
        self.blocking_severity
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn is_blocked(&self) -> bool {
        self.verdict == Verdict::Blocked
    }

    /// 已去重并排序的检测结果
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn summary(&self) -> &ReportSummary {
        &self.summary
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// 达到阻断阈值的检测结果
    pub fn blocking_findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(move |f| f.severity >= self.blocking_severity)
    }

    /// 某分类是否被标记
    pub fn has_category(&self, category: &str) -> bool {
        self.summary.categories.contains_key(category)
    }

    pub fn to_json(&self) -> TfResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> TfResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(document: &str) -> TfResult<Self> {
        Ok(serde_json::from_str(document)?)
    }
}

/// 时间戳统一输出为毫秒精度的 RFC 3339（UTC）
mod rfc3339_millis {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
