//! 宪章文档数据模型定义
//! 仅存储文档原始数据，无任何业务逻辑；匹配器规格保持为 JSON 值，由编译器统一校验

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// 内置分类：ZK 证明使用
pub const CATEGORY_ZK_USAGE: &str = "zk-usage";
/// 内置分类：预言机依赖
pub const CATEGORY_ORACLE_DEPENDENCY: &str = "oracle-dependency";
/// 内置分类：KYC/合规标记
pub const CATEGORY_KYC_FLAG: &str = "kyc-flag";
/// 规则求值失败时的降级分类
pub const CATEGORY_RULE_ERROR: &str = "rule-error";

/// 严重等级（INFO < WARNING < CRITICAL）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    /// 忽略大小写解析，未知等级返回原始值
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INFO" => Ok(Severity::Info),
            "WARNING" => Ok(Severity::Warning),
            "CRITICAL" => Ok(Severity::Critical),
            _ => Err(s.to_string()),
        }
    }
}

/// 单条规则定义（从宪章 JSON 解析）
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRule {
    // 仅数组形式的 rules 需要
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    // 匹配器规格：{"type": "keyword" | "regex" | "structural", ...}
    #[serde(default)]
    pub matcher: Option<serde_json::Value>,
    #[serde(default, alias = "description")]
    pub message: Option<String>,
    // 旧版扁平写法：{"id", "type": "keyword", "keywords": [...], "severity": "high"}
    #[serde(default, rename = "type")]
    pub legacy_type: Option<String>,
    #[serde(default)]
    pub keywords: Option<serde_json::Value>,
    #[serde(default)]
    pub allowed_roles: Option<serde_json::Value>,
}

impl RawRule {
    /// 没有 matcher 对象、只有顶层 type 的旧版规则
    pub fn is_legacy(&self) -> bool {
        self.matcher.is_none() && self.legacy_type.is_some()
    }
}

/// rules 字段支持两种写法：以规则ID为键的对象，或带 id 字段的数组
/// 对象形式按文档顺序保留全部键，重复的键交给编译器报错
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RawRules {
    Map(Vec<(String, RawRule)>),
    List(Vec<RawRule>),
}

impl RawRules {
    /// 展开为 (规则ID, 规则) 列表，保持文档顺序
    pub fn into_entries(self) -> Vec<(Option<String>, RawRule)> {
        match self {
            RawRules::Map(entries) => entries
                .into_iter()
                .map(|(id, rule)| (Some(id), rule))
                .collect(),
            RawRules::List(list) => list
                .into_iter()
                .map(|rule| (rule.id.clone(), rule))
                .collect(),
        }
    }
}

struct RawRulesVisitor;

impl<'de> Visitor<'de> for RawRulesVisitor {
    type Value = RawRules;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object keyed by rule id or an array of rules")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RawRules, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((id, rule)) = map.next_entry::<String, RawRule>()? {
            entries.push((id, rule));
        }
        Ok(RawRules::Map(entries))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<RawRules, A::Error> {
        let mut list = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(rule) = seq.next_element::<RawRule>()? {
            list.push(rule);
        }
        Ok(RawRules::List(list))
    }
}

impl<'de> Deserialize<'de> for RawRules {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RawRulesVisitor)
    }
}

/// 完整宪章文档
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConstitutionDocument {
    #[serde(default)]
    pub version: Option<String>,
    // 阻断部署的最低严重等级，缺省为 CRITICAL
    #[serde(default, alias = "blockingSeverity")]
    pub blocking_severity: Option<String>,
    // 内置检测器的等级提升（分类 -> 等级）
    #[serde(default, alias = "builtinSeverity")]
    pub builtin_severity: HashMap<String, String>,
    #[serde(default)]
    pub rules: Option<RawRules>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order_and_parse() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert_eq!("critical".parse::<Severity>(), Ok(Severity::Critical));
        assert_eq!(" Warning ".parse::<Severity>(), Ok(Severity::Warning));
        assert!("high".parse::<Severity>().is_err());
    }

    #[test]
    fn test_rules_accept_map_and_list() {
        let map_doc: ConstitutionDocument = serde_json::from_str(
            r#"{"version": "1", "rules": {"b": {"severity": "INFO"}, "a": {"severity": "INFO"}}}"#,
        )
        .unwrap();
        let ids: Vec<_> = map_doc.rules.unwrap().into_entries().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![Some("b".to_string()), Some("a".to_string())]);

        let list_doc: ConstitutionDocument = serde_json::from_str(
            r#"{"version": "1", "rules": [{"id": "z"}, {"id": "y", "description": "legacy"}]}"#,
        )
        .unwrap();
        let entries = list_doc.rules.unwrap().into_entries();
        assert_eq!(entries[0].0.as_deref(), Some("z"));
        assert_eq!(entries[1].1.message.as_deref(), Some("legacy"));
    }

    #[test]
    fn test_repeated_map_keys_are_all_kept() {
        let doc: ConstitutionDocument = serde_json::from_str(
            r#"{"version": "1", "rules": {"r": {"severity": "CRITICAL"}, "r": {"severity": "INFO"}}}"#,
        )
        .unwrap();
        let entries = doc.rules.unwrap().into_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1.severity.as_deref(), Some("CRITICAL"));
    }

    #[test]
    fn test_legacy_flat_rule_shape() {
        let doc: ConstitutionDocument = serde_json::from_str(
            r#"{"version": "1", "rules": [{"id": "R1", "type": "keyword", "keywords": ["sudo"], "severity": "high"}]}"#,
        )
        .unwrap();
        let entries = doc.rules.unwrap().into_entries();
        assert!(entries[0].1.is_legacy());
        assert_eq!(entries[0].1.legacy_type.as_deref(), Some("keyword"));
    }

    #[test]
    fn test_rules_must_be_object_or_array() {
        let result = serde_json::from_str::<ConstitutionDocument>(r#"{"version": "1", "rules": "all"}"#);
        assert!(result.is_err());
    }
}
