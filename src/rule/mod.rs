//! 规则模块：负责宪章的数据模型、加载、内置检测器和生效规则集管理
pub mod model;
pub mod builtin;
pub mod loader;
pub mod repository;

// 导出核心接口
pub use self::model::{
    ConstitutionDocument, RawRule, RawRules, Severity, CATEGORY_KYC_FLAG,
    CATEGORY_ORACLE_DEPENDENCY, CATEGORY_RULE_ERROR, CATEGORY_ZK_USAGE,
};
pub use self::builtin::{builtin_rule_id, BUILTIN_ID_PREFIX};
pub use self::loader::RuleLoader;
pub use self::repository::RuleRepository;
