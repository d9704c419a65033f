//! 规则编译器核心
//! 负责校验宪章文档并编译为不可变的规则集；任何一条规则不合法都会中止整次编译

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use regex::{Regex, RegexBuilder};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::pattern::{
    KeywordSpec, MatchScope, MatcherSpec, RegexSpec, RuleDefinition, RuleSet, StructuralPredicate,
};
use crate::error::{TfResult, TrustFlowError};
use crate::rule::builtin::{self, BUILTIN_ID_PREFIX};
use crate::rule::model::{ConstitutionDocument, RawRule, Severity};

/// 单条正则编译后的体积上限，防止规则文档构造超大自动机
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// 未配置消息模板时使用
const DEFAULT_MESSAGE: &str = "Rule `{rule}` matched `{match}`";

/// 旧版扁平规则未给出分类时使用
const LEGACY_CATEGORY: &str = "constitution";

const KEYWORD_KEYS: [&str; 5] = ["type", "keywords", "case_sensitive", "whole_word", "scope"];
const REGEX_KEYS: [&str; 4] = ["type", "pattern", "case_insensitive", "scope"];
const STRUCTURAL_KEYS: [&str; 2] = ["type", "predicate"];

/// 规则编译器
pub struct RuleCompiler;

impl RuleCompiler {
    /// 编译宪章文档
    pub fn compile(document: ConstitutionDocument) -> TfResult<RuleSet> {
        let start = Instant::now();

        // 1. 顶层字段
        let version = document
            .version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| TrustFlowError::RuleValidationError("宪章缺少 version 字段".to_string()))?
            .to_string();

        let blocking_severity = match document.blocking_severity.as_deref() {
            Some(raw) => Self::parse_severity(raw, "blocking_severity")?,
            None => Severity::Critical,
        };

        let raw_rules = document.rules.ok_or_else(|| {
            TrustFlowError::RuleValidationError("宪章必须包含 rules 字段".to_string())
        })?;

        // 2. 内置检测器先行注入
        let mut stats = CompileStats::default();
        let mut seen_ids = HashSet::new();
        let mut rules = Vec::new();
        for builtin_rule in builtin::builtin_rules(&document.builtin_severity)? {
            seen_ids.insert(builtin_rule.id.clone());
            stats.record(&builtin_rule.matcher);
            rules.push(Arc::new(builtin_rule));
        }

        // 3. 编译文档中的每条规则
        for (index, (rule_id, raw_rule)) in raw_rules.into_entries().into_iter().enumerate() {
            let rule_id = rule_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .ok_or_else(|| {
                    TrustFlowError::RuleValidationError(format!("第{}条规则缺少 id", index + 1))
                })?;

            if rule_id.starts_with(BUILTIN_ID_PREFIX) {
                return Err(TrustFlowError::RuleValidationError(format!(
                    "规则ID {} 使用了保留前缀 {}",
                    rule_id, BUILTIN_ID_PREFIX
                )));
            }
            if !seen_ids.insert(rule_id.clone()) {
                return Err(TrustFlowError::RuleValidationError(format!("规则ID重复：{}", rule_id)));
            }

            let rule = Self::compile_rule(rule_id, raw_rule)?;
            stats.record(&rule.matcher);
            rules.push(Arc::new(rule));
        }

        // 4. 输出编译统计
        debug!("✅ 宪章编译完成，版本{}，总耗时{:?}", version, start.elapsed());
        debug!(
            "📊 编译统计：关键字规则{}条、正则规则{}条（其中{}条无法编译）、结构规则{}条",
            stats.keyword_count, stats.regex_count, stats.broken_regex_count, stats.structural_count
        );

        Ok(RuleSet {
            version,
            blocking_severity,
            rules,
        })
    }

    /// 编译单条规则
    fn compile_rule(rule_id: String, raw_rule: RawRule) -> TfResult<RuleDefinition> {
        if raw_rule.is_legacy() {
            return Self::compile_legacy_rule(rule_id, raw_rule);
        }

        let category = raw_rule
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                TrustFlowError::RuleValidationError(format!("规则 {} 缺少 category", rule_id))
            })?
            .to_string();

        let severity = match raw_rule.severity.as_deref() {
            Some(raw) => Self::parse_severity(raw, &rule_id)?,
            None => {
                return Err(TrustFlowError::RuleValidationError(format!(
                    "规则 {} 缺少 severity",
                    rule_id
                )))
            }
        };

        let matcher_value = raw_rule.matcher.as_ref().ok_or_else(|| {
            TrustFlowError::RuleValidationError(format!("规则 {} 缺少 matcher", rule_id))
        })?;
        let matcher = Self::compile_matcher(&rule_id, matcher_value)?;

        let message = raw_rule
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());

        Ok(RuleDefinition {
            id: rule_id,
            category,
            severity,
            matcher,
            message,
            builtin: false,
        })
    }

    /// 编译旧版扁平规则
    /// keyword 规则按原文不区分大小写子串匹配；role 规则依赖调用方角色，无法在源码上求值
    fn compile_legacy_rule(rule_id: String, raw_rule: RawRule) -> TfResult<RuleDefinition> {
        let kind = raw_rule.legacy_type.as_deref().unwrap_or_default();
        let matcher_value = match kind {
            "keyword" => {
                let keywords = raw_rule
                    .keywords
                    .clone()
                    .ok_or_else(|| Self::malformed(&rule_id, "keyword 缺少 keywords"))?;
                json!({"type": "keyword", "keywords": keywords, "scope": "all"})
            }
            "role" => {
                return Err(Self::malformed(
                    &rule_id,
                    "role 规则按调用方角色判定，合约源码分析中无法求值",
                ))
            }
            other => return Err(Self::malformed(&rule_id, &format!("不支持的旧版规则类型 {}", other))),
        };
        let matcher = Self::compile_matcher(&rule_id, &matcher_value)?;

        let severity = match raw_rule.severity.as_deref() {
            Some(raw) => Self::parse_legacy_severity(raw, &rule_id)?,
            None => Severity::Info,
        };
        let category = raw_rule
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(LEGACY_CATEGORY)
            .to_string();
        let message = raw_rule
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());

        Ok(RuleDefinition {
            id: rule_id,
            category,
            severity,
            matcher,
            message,
            builtin: false,
        })
    }

    /// 旧版等级 low / medium / high 映射到 INFO / WARNING / CRITICAL
    fn parse_legacy_severity(raw: &str, rule_id: &str) -> TfResult<Severity> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Info),
            "medium" => Ok(Severity::Warning),
            "high" => Ok(Severity::Critical),
            _ => Self::parse_severity(raw, rule_id),
        }
    }

    /// 编译匹配器规格（keyword | regex | structural）
    pub(crate) fn compile_matcher(rule_id: &str, value: &Value) -> TfResult<MatcherSpec> {
        let Value::Object(spec) = value else {
            return Err(Self::malformed(rule_id, "matcher 必须是对象"));
        };

        let kind = spec
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Self::malformed(rule_id, "matcher 缺少 type"))?;

        match kind {
            "keyword" | "keywords" => {
                Self::reject_unknown_keys(rule_id, spec, &KEYWORD_KEYS)?;
                Self::compile_keyword_spec(rule_id, spec)
            }
            "regex" => {
                Self::reject_unknown_keys(rule_id, spec, &REGEX_KEYS)?;
                Self::compile_regex_spec(rule_id, spec)
            }
            "structural" => {
                Self::reject_unknown_keys(rule_id, spec, &STRUCTURAL_KEYS)?;
                let name = spec
                    .get("predicate")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Self::malformed(rule_id, "structural 缺少 predicate"))?;
                StructuralPredicate::from_name(name)
                    .map(MatcherSpec::Structural)
                    .ok_or_else(|| Self::malformed(rule_id, &format!("未知的结构谓词 {}", name)))
            }
            other => Err(Self::malformed(rule_id, &format!("不支持的 matcher 类型 {}", other))),
        }
    }

    /// 编译关键字规格（单个字符串或字符串数组）
    fn compile_keyword_spec(rule_id: &str, spec: &Map<String, Value>) -> TfResult<MatcherSpec> {
        let mut keywords = Vec::new();
        match spec.get("keywords") {
            Some(Value::String(s)) => keywords.push(s.clone()),
            Some(Value::Array(arr)) => {
                for item in arr {
                    let Value::String(s) = item else {
                        return Err(Self::malformed(rule_id, "keywords 只能包含字符串"));
                    };
                    keywords.push(s.clone());
                }
            }
            _ => return Err(Self::malformed(rule_id, "keyword 缺少 keywords")),
        }

        if keywords.is_empty() || keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(Self::malformed(rule_id, "keywords 不能为空"));
        }

        let case_sensitive = Self::bool_field(rule_id, spec, "case_sensitive")?;
        let whole_word = Self::bool_field(rule_id, spec, "whole_word")?;
        let scope = Self::scope_field(rule_id, spec)?;

        let matcher = Self::build_keyword_regex(&keywords, case_sensitive, whole_word)
            .map_err(|e| Self::malformed(rule_id, &format!("关键字无法编译：{}", e)))?;

        Ok(MatcherSpec::Keyword(KeywordSpec {
            keywords,
            case_sensitive,
            whole_word,
            scope,
            matcher,
        }))
    }

    /// 编译正则规格：正则本身的语法错误不在此处拒绝
    fn compile_regex_spec(rule_id: &str, spec: &Map<String, Value>) -> TfResult<MatcherSpec> {
        let pattern = spec
            .get("pattern")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Self::malformed(rule_id, "regex 缺少 pattern"))?
            .to_string();

        let case_insensitive = Self::bool_field(rule_id, spec, "case_insensitive")?;
        let scope = Self::scope_field(rule_id, spec)?;
        let compiled = Self::compile_pattern(&pattern, case_insensitive);
        if let Err(e) = &compiled {
            debug!("规则 {} 的正则无法编译，将在匹配阶段降级：{}", rule_id, e);
        }

        Ok(MatcherSpec::Regex(RegexSpec {
            pattern,
            case_insensitive,
            scope,
            compiled,
        }))
    }

    /// 编译单个正则（多行模式，带体积上限）
    pub(crate) fn compile_pattern(pattern: &str, case_insensitive: bool) -> Result<Regex, String> {
        RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .multi_line(true)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|e| e.to_string())
    }

    /// 将关键字列表合并为一条转义后的正则
    fn build_keyword_regex(
        keywords: &[String],
        case_sensitive: bool,
        whole_word: bool,
    ) -> Result<Regex, regex::Error> {
        let is_word_char = |c: char| c.is_alphanumeric() || c == '_';
        let alternatives: Vec<String> = keywords
            .iter()
            .map(|keyword| {
                let escaped = regex::escape(keyword);
                if !whole_word {
                    return escaped;
                }
                // 仅在关键字边缘为单词字符时加 \b
                let prefix = if keyword.starts_with(is_word_char) { r"\b" } else { "" };
                let suffix = if keyword.ends_with(is_word_char) { r"\b" } else { "" };
                format!("{}{}{}", prefix, escaped, suffix)
            })
            .collect();

        RegexBuilder::new(&alternatives.join("|"))
            .case_insensitive(!case_sensitive)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
    }

    pub(crate) fn parse_severity(raw: &str, context: &str) -> TfResult<Severity> {
        raw.parse::<Severity>().map_err(|unknown| {
            TrustFlowError::RuleValidationError(format!("{} 的严重等级无法识别：{}", context, unknown))
        })
    }

    fn bool_field(rule_id: &str, spec: &Map<String, Value>, key: &str) -> TfResult<bool> {
        match spec.get(key) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(Self::malformed(rule_id, &format!("{} 必须是布尔值", key))),
        }
    }

    fn scope_field(rule_id: &str, spec: &Map<String, Value>) -> TfResult<MatchScope> {
        match spec.get("scope").map(|v| v.as_str()) {
            None => Ok(MatchScope::Code),
            Some(Some("code")) => Ok(MatchScope::Code),
            Some(Some("all")) => Ok(MatchScope::All),
            Some(_) => Err(Self::malformed(rule_id, "scope 只能是 code 或 all")),
        }
    }

    /// 拼写错误的选项不能静默回落到默认值
    fn reject_unknown_keys(rule_id: &str, spec: &Map<String, Value>, allowed: &[&str]) -> TfResult<()> {
        match spec.keys().find(|key| !allowed.contains(&key.as_str())) {
            Some(key) => Err(Self::malformed(rule_id, &format!("未知的 matcher 字段 {}", key))),
            None => Ok(()),
        }
    }

    fn malformed(rule_id: &str, reason: &str) -> TrustFlowError {
        TrustFlowError::RuleValidationError(format!("规则 {} 的 matcher 不合法：{}", rule_id, reason))
    }
}

/// 编译统计信息
#[derive(Debug, Clone, Default)]
struct CompileStats {
    keyword_count: usize,
    regex_count: usize,
    broken_regex_count: usize,
    structural_count: usize,
}

impl CompileStats {
    fn record(&mut self, matcher: &MatcherSpec) {
        match matcher {
            MatcherSpec::Keyword(_) => self.keyword_count += 1,
            MatcherSpec::Regex(spec) => {
                self.regex_count += 1;
                if spec.compiled.is_err() {
                    self.broken_regex_count += 1;
                }
            }
            MatcherSpec::Structural(_) => self.structural_count += 1,
        }
    }
}
