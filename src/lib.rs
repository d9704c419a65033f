//! rstrustflow - 基于宪章的智能合约合规检测引擎

// 导出全局错误类型
pub use self::error::{TrustFlowError, TfResult, RuleEvaluationError};

// 导出配置模块
pub use self::config::{EngineConfig, ConfigManager, CustomConfigBuilder};

// 导出规则模块核心接口
pub use self::rule::{
    ConstitutionDocument, Severity, RuleLoader, RuleRepository,
    CATEGORY_ZK_USAGE, CATEGORY_ORACLE_DEPENDENCY, CATEGORY_KYC_FLAG, CATEGORY_RULE_ERROR,
};

// 导出编译模块核心接口
pub use self::compiler::{
    RuleCompiler, RuleDefinition, RuleSet, MatcherSpec, MatchScope, StructuralPredicate,
};

// 导出归一化模块核心接口
pub use self::normalizer::{SourceNormalizer, NormalizedSource};

// 导出工具模块核心接口
pub use self::utils::{FindingResolver, MessageRenderer};

// 导出报告模块核心接口
pub use self::report::{
    ComplianceReport, Finding, LineRange, ReportSummary, Verdict,
    ReportBuilder, GateDecision, Decision,
};

// 导出检测模块核心接口（含全局引擎的简化接口）
pub use self::detector::{
    ComplianceEngine,
    Budget,
    RuleAnalyzer,
    evaluate_rule,
    init_engine,
    init_engine_with_config,
    init_engine_with_document,
    analyze_contract,
    analyze_contract_concurrent,
    reload_constitution,
};

// 声明所有子模块
pub mod config;
pub mod error;
pub mod rule;
pub mod compiler;
pub mod normalizer;
pub mod utils;
pub mod report;
pub mod detector;
