//! 全局错误类型定义
//! 配置类错误（宪章加载/校验）对加载和重载是致命的；
//! 单条规则的求值错误在运行内部消化，降级为 rule-error 结果

use std::io::Error as IoError;
use std::time::Duration;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrustFlowError {
    // 宪章相关错误（ConfigError）
    #[error("宪章加载失败：{0}")]
    RuleLoadError(String),
    #[error("规则校验失败：{0}")]
    RuleValidationError(String),
    #[error("JSON解析失败：{0}")]
    JsonError(#[from] SerdeJsonError),
    #[error("IO操作失败：{0}")]
    IoError(#[from] IoError),

    // 引擎相关错误
    #[error("引擎未初始化: {0}")]
    EngineNotInitialized(String),
    #[error("引擎初始化失败: {0}")]
    EngineInitError(String),
    #[error("异步任务执行失败：{0}")]
    AsyncTaskError(String),
}

impl TrustFlowError {
    /// 是否属于宪章配置错误（需要上报给运维，不能静默忽略）
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            TrustFlowError::RuleLoadError(_)
                | TrustFlowError::RuleValidationError(_)
                | TrustFlowError::JsonError(_)
                | TrustFlowError::IoError(_)
                | TrustFlowError::EngineNotInitialized(_)
        )
    }
}

/// 单条规则求值失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleEvaluationError {
    #[error("rule `{rule_id}` has an invalid regex: {reason}")]
    InvalidRegex { rule_id: String, reason: String },
    #[error("rule `{rule_id}` exceeded its time budget of {budget:?}")]
    BudgetExhausted { rule_id: String, budget: Duration },
    #[error("evaluation of rule `{rule_id}` was cancelled")]
    Cancelled { rule_id: String },
    #[error("matcher for rule `{rule_id}` aborted: {reason}")]
    Panicked { rule_id: String, reason: String },
}

impl RuleEvaluationError {
    pub fn rule_id(&self) -> &str {
        match self {
            RuleEvaluationError::InvalidRegex { rule_id, .. }
            | RuleEvaluationError::BudgetExhausted { rule_id, .. }
            | RuleEvaluationError::Cancelled { rule_id }
            | RuleEvaluationError::Panicked { rule_id, .. } => rule_id,
        }
    }
}

// 全局Result类型
pub type TfResult<T> = Result<T, TrustFlowError>;
