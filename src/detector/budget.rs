//! 匹配器时间预算
//! 协作式检查：匹配器在命中、语句、函数等循环节点调用 check()，
//! 超时或收到取消信号时返回 RuleEvaluationError

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::RuleEvaluationError;

/// 单条规则的求值预算
#[derive(Debug, Clone)]
pub struct Budget {
    limit: Duration,
    // None 表示不设截止时间
    deadline: Option<Instant>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Budget {
    /// 以当前时刻为起点开始计时
    pub fn start(limit: Duration, cancel: Option<Arc<AtomicBool>>) -> Self {
        Self {
            limit,
            deadline: Instant::now().checked_add(limit),
            cancel,
        }
    }

    /// 不受限的预算
    pub fn unlimited() -> Self {
        Self {
            limit: Duration::MAX,
            deadline: None,
            cancel: None,
        }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// 检查预算；零预算在第一次检查时即耗尽
    pub fn check(&self, rule_id: &str) -> Result<(), RuleEvaluationError> {
        if self.is_cancelled() {
            return Err(RuleEvaluationError::Cancelled {
                rule_id: rule_id.to_string(),
            });
        }
        let expired = self.deadline.map(|d| Instant::now() >= d).unwrap_or(false);
        if self.limit.is_zero() || expired {
            return Err(RuleEvaluationError::BudgetExhausted {
                rule_id: rule_id.to_string(),
                budget: self.limit,
            });
        }
        Ok(())
    }
}

/// 析构时置位取消标记
/// 并发分析的 future 被丢弃时，已在阻塞线程池中运行的匹配器在下一次 check() 退出
#[derive(Debug)]
pub struct CancelOnDrop {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl CancelOnDrop {
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag, armed: true }
    }

    /// 正常完成后解除，不再置位
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::Relaxed);
        }
    }
}
