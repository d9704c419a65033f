//! 规则分析器：按匹配器类型在归一化源码上求值单条规则
use regex::Regex;
use tracing::{debug, warn};

use super::budget::Budget;
use super::structural::StructuralMatcher;
use crate::compiler::{MatchScope, MatcherSpec, RuleDefinition, StructuralPredicate};
use crate::error::RuleEvaluationError;
use crate::normalizer::{FunctionBlock, NormalizedSource};
use crate::report::model::{Finding, LineRange};
use crate::utils::{MessageContext, MessageRenderer};

/// 命中所在的函数名（函数体外返回 None）
fn enclosing_function(src: &NormalizedSource, line: usize) -> Option<&FunctionBlock> {
    src.functions()
        .iter()
        .filter(|f| f.start_line <= line && line <= f.end_line)
        .last()
}

/// 根据规则和命中构造检测结果
fn build_finding(
    rule: &RuleDefinition,
    location: LineRange,
    matched: &str,
    function: Option<&str>,
) -> Finding {
    let severity = rule.severity.as_str();
    let ctx = MessageContext {
        rule_id: &rule.id,
        category: &rule.category,
        severity,
        line: location.start,
        matched,
        function,
    };
    let message = MessageRenderer::render(&rule.message, &ctx);
    Finding::new(rule, location, MessageRenderer::condense(matched), message)
}

/// 正则类匹配（关键字规则在加载时已合并为正则）
fn scan_regex(
    src: &NormalizedSource,
    rule: &RuleDefinition,
    regex: &Regex,
    scope: MatchScope,
    budget: &Budget,
) -> Result<Vec<Finding>, RuleEvaluationError> {
    let text = src.text_for_scope(scope == MatchScope::All);
    let mut findings = Vec::new();

    for m in regex.find_iter(text) {
        budget.check(&rule.id)?;
        // 空匹配没有可定位的代码
        if m.as_str().is_empty() {
            continue;
        }
        let (start, end) = src.line_range(&m.range());
        let matched = &src.raw()[m.range()];
        let function = enclosing_function(src, start).map(|f| f.display_name());
        findings.push(build_finding(rule, LineRange::new(start, end), matched, function));
    }
    Ok(findings)
}

/// 关键字分析器
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    pub fn analyze(
        src: &NormalizedSource,
        rule: &RuleDefinition,
        budget: &Budget,
    ) -> Result<Vec<Finding>, RuleEvaluationError> {
        let MatcherSpec::Keyword(spec) = &rule.matcher else {
            return Ok(Vec::new());
        };
        scan_regex(src, rule, &spec.matcher, spec.scope, budget)
    }
}

/// 正则分析器
pub struct RegexAnalyzer;

impl RegexAnalyzer {
    pub fn analyze(
        src: &NormalizedSource,
        rule: &RuleDefinition,
        budget: &Budget,
    ) -> Result<Vec<Finding>, RuleEvaluationError> {
        let MatcherSpec::Regex(spec) = &rule.matcher else {
            return Ok(Vec::new());
        };
        // 编译失败的正则在此降级
        let regex = spec
            .compiled
            .as_ref()
            .map_err(|reason| RuleEvaluationError::InvalidRegex {
                rule_id: rule.id.clone(),
                reason: reason.clone(),
            })?;
        scan_regex(src, rule, regex, spec.scope, budget)
    }
}

/// 结构分析器
pub struct StructuralAnalyzer;

impl StructuralAnalyzer {
    pub fn analyze(
        src: &NormalizedSource,
        rule: &RuleDefinition,
        predicate: StructuralPredicate,
        budget: &Budget,
    ) -> Result<Vec<Finding>, RuleEvaluationError> {
        let hits = StructuralMatcher::new(src, &rule.id, budget).run(predicate)?;
        Ok(hits
            .into_iter()
            .map(|hit| build_finding(rule, hit.location, &hit.matched, Some(&hit.function)))
            .collect())
    }
}

/// 规则分析入口
pub struct RuleAnalyzer;

impl RuleAnalyzer {
    /// 求值单条规则
    ///
    /// # 参数
    /// - `src`: 归一化后的源码，只读共享
    /// - `rule`: 编译后的规则
    /// - `budget`: 本条规则的时间预算
    ///
    /// # 返回值
    /// 规则命中列表；正则无效、超时或取消时返回 RuleEvaluationError
    pub fn analyze(
        src: &NormalizedSource,
        rule: &RuleDefinition,
        budget: &Budget,
    ) -> Result<Vec<Finding>, RuleEvaluationError> {
        budget.check(&rule.id)?;
        match &rule.matcher {
            MatcherSpec::Keyword(_) => KeywordAnalyzer::analyze(src, rule, budget),
            MatcherSpec::Regex(_) => RegexAnalyzer::analyze(src, rule, budget),
            MatcherSpec::Structural(predicate) => StructuralAnalyzer::analyze(src, rule, *predicate, budget),
        }
    }
}

/// 求值单条规则，错误降级为 rule-error 结果，不影响其它规则
pub fn evaluate_rule(src: &NormalizedSource, rule: &RuleDefinition, budget: &Budget) -> Vec<Finding> {
    match RuleAnalyzer::analyze(src, rule, budget) {
        Ok(findings) => {
            if !findings.is_empty() {
                debug!("规则 {} 命中 {} 处（{}）", rule.id, findings.len(), rule.matcher.describe());
            }
            findings
        }
        Err(e) => {
            warn!("规则 {} 求值失败，降级为 rule-error：{}", rule.id, e);
            vec![Finding::rule_error(rule, &e)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::RuleCompiler;
    use crate::normalizer::SourceNormalizer;
    use crate::rule::model::{Severity, CATEGORY_RULE_ERROR};
    use serde_json::json;
    use std::time::Duration;

    fn rule(id: &str, matcher: serde_json::Value, message: &str) -> RuleDefinition {
        RuleDefinition {
            id: id.to_string(),
            category: "test".to_string(),
            severity: Severity::Warning,
            matcher: RuleCompiler::compile_matcher(id, &matcher).unwrap(),
            message: message.to_string(),
            builtin: false,
        }
    }

    const SOURCE: &str = "contract A {\n    // selfdestruct is forbidden\n    function kill() public {\n        selfdestruct(payable(msg.sender));\n    }\n}\n";

    #[test]
    fn test_keyword_skips_comments_by_default() {
        let src = SourceNormalizer::normalize(SOURCE);
        let r = rule("sd", json!({"type": "keyword", "keywords": ["selfdestruct"]}), "{match} in {function} at {line}");
        let findings = evaluate_rule(&src, &r, &Budget::unlimited());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].location, LineRange::single(4));
        assert_eq!(findings[0].matched_text, "selfdestruct");
        assert_eq!(findings[0].message, "selfdestruct in kill at 4");
    }

    #[test]
    fn test_keyword_scope_all_includes_comments() {
        let src = SourceNormalizer::normalize(SOURCE);
        let r = rule(
            "sd",
            json!({"type": "keyword", "keywords": ["selfdestruct"], "scope": "all"}),
            "{match}",
        );
        let lines: Vec<_> = evaluate_rule(&src, &r, &Budget::unlimited())
            .iter()
            .map(|f| f.location.start)
            .collect();
        assert_eq!(lines, vec![2, 4]);
    }

    #[test]
    fn test_multiline_regex_reports_line_range() {
        let src = SourceNormalizer::normalize(SOURCE);
        let r = rule("fn", json!({"type": "regex", "pattern": r"function\s+kill\(\)\s+public\s*\{\s*selfdestruct"}), "{rule}");
        let findings = evaluate_rule(&src, &r, &Budget::unlimited());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].location, LineRange::new(3, 4));
        assert!(!findings[0].matched_text.contains('\n'));
    }

    #[test]
    fn test_invalid_regex_degrades_to_rule_error() {
        let src = SourceNormalizer::normalize(SOURCE);
        let r = rule("bad", json!({"type": "regex", "pattern": "(unclosed"}), "{rule}");
        let findings = evaluate_rule(&src, &r, &Budget::unlimited());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, CATEGORY_RULE_ERROR);
        assert_eq!(findings[0].severity, Severity::Warning);
        assert_eq!(findings[0].location, LineRange::unbound());
        assert!(findings[0].message.contains("bad"));
    }

    #[test]
    fn test_zero_budget_degrades_every_kind() {
        let src = SourceNormalizer::normalize(SOURCE);
        let budget = Budget::start(Duration::ZERO, None);
        let rules = [
            rule("k", json!({"type": "keyword", "keywords": ["nothing-here"]}), "{rule}"),
            rule("s", json!({"type": "structural", "predicate": "missing-access-control"}), "{rule}"),
        ];
        for r in &rules {
            let findings = evaluate_rule(&src, r, &budget);
            assert_eq!(findings.len(), 1);
            assert!(findings[0].is_rule_error());
        }
    }

    #[test]
    fn test_structural_rule_finding() {
        let src = SourceNormalizer::normalize(SOURCE);
        let r = rule(
            "mac",
            json!({"type": "structural", "predicate": "missing-access-control"}),
            "{function} lacks access control",
        );
        let findings = evaluate_rule(&src, &r, &Budget::unlimited());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].location, LineRange::new(3, 4));
        assert_eq!(findings[0].message, "kill lacks access control");
    }
}
