//! 编译模块：将宪章文档校验并编译为可执行的匹配器规格
pub mod pattern;
pub mod compiler;

pub use self::pattern::{
    KeywordSpec, MatchScope, MatcherSpec, RegexSpec, RuleDefinition, RuleSet, StructuralPredicate,
};
pub use self::compiler::RuleCompiler;
