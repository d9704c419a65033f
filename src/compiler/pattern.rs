//! 编译后规则模型
//! 匹配器规格是封闭的枚举，宪章文档只能选择其中一种，不能携带可执行代码

use std::fmt;
use std::sync::Arc;
use regex::Regex;

use crate::rule::model::Severity;

/// 匹配范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchScope {
    /// 去除注释和字符串内容后的代码视图
    #[default]
    Code,
    /// 原始文本（含注释和字符串）
    All,
}

/// 关键字匹配规格，关键字在加载时合并为一条正则
#[derive(Debug, Clone)]
pub struct KeywordSpec {
    pub keywords: Vec<String>,
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub scope: MatchScope,
    pub matcher: Regex,
}

/// 正则匹配规格
/// 编译结果随规格保存：编译失败不影响加载，由匹配阶段降级为 rule-error
#[derive(Debug, Clone)]
pub struct RegexSpec {
    pub pattern: String,
    pub case_insensitive: bool,
    pub scope: MatchScope,
    pub compiled: Result<Regex, String>,
}

/// 结构谓词（启发式，非数据流分析）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructuralPredicate {
    /// 公开的状态修改函数缺少访问控制
    MissingAccessControl,
    /// 外部调用先于状态写入（重入风险）
    ExternalCallBeforeStateWrite,
    /// 低级调用的返回值未检查
    UncheckedLowLevelCall,
    /// 使用 tx.origin 做身份校验
    TxOriginAuthorization,
}

impl StructuralPredicate {
    pub const ALL: [StructuralPredicate; 4] = [
        StructuralPredicate::MissingAccessControl,
        StructuralPredicate::ExternalCallBeforeStateWrite,
        StructuralPredicate::UncheckedLowLevelCall,
        StructuralPredicate::TxOriginAuthorization,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StructuralPredicate::MissingAccessControl => "missing-access-control",
            StructuralPredicate::ExternalCallBeforeStateWrite => "external-call-before-state-write",
            StructuralPredicate::UncheckedLowLevelCall => "unchecked-low-level-call",
            StructuralPredicate::TxOriginAuthorization => "tx-origin-authorization",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name.trim())
    }
}

impl fmt::Display for StructuralPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub enum MatcherSpec {
    Keyword(KeywordSpec),
    Regex(RegexSpec),
    Structural(StructuralPredicate),
}

impl MatcherSpec {
    /// 规格描述（日志用）
    pub fn describe(&self) -> String {
        match self {
            MatcherSpec::Keyword(spec) => format!("keyword{:?}", spec.keywords),
            MatcherSpec::Regex(spec) => format!("regex /{}/", spec.pattern),
            MatcherSpec::Structural(predicate) => format!("structural:{}", predicate),
        }
    }
}

/// 编译后的规则
#[derive(Debug, Clone)]
pub struct RuleDefinition {
    pub id: String,
    pub category: String,
    pub severity: Severity,
    pub matcher: MatcherSpec,
    pub message: String,
    pub builtin: bool,
}

/// 编译后的规则集，加载后不可变，重载时整体替换
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub(crate) version: String,
    pub(crate) blocking_severity: Severity,
    pub(crate) rules: Vec<Arc<RuleDefinition>>,
}

impl RuleSet {
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn blocking_severity(&self) -> Severity {
        self.blocking_severity
    }

    /// 按加载顺序排列的规则（内置规则在前）
    pub fn rules(&self) -> &[Arc<RuleDefinition>] {
        &self.rules
    }

    pub fn get(&self, rule_id: &str) -> Option<&Arc<RuleDefinition>> {
        self.rules.iter().find(|rule| rule.id == rule_id)
    }

    pub fn contains(&self, rule_id: &str) -> bool {
        self.get(rule_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 该等级是否达到阻断阈值
    pub fn is_blocking(&self, severity: Severity) -> bool {
        severity >= self.blocking_severity
    }
}
