//! 检测模块：规则求值、时间预算、引擎编排
pub mod global;
pub mod budget;
pub mod analyzer;
pub mod structural;
pub mod detector;

// 导出核心接口
pub use self::global::{init_engine, init_engine_with_config, init_engine_with_document};
pub use self::budget::{Budget, CancelOnDrop};
pub use self::analyzer::{evaluate_rule, KeywordAnalyzer, RegexAnalyzer, RuleAnalyzer, StructuralAnalyzer};
pub use self::structural::{StructuralHit, StructuralMatcher};
pub use self::detector::{
    ComplianceEngine,
    analyze_contract,
    analyze_contract_concurrent,
    reload_constitution,
};
