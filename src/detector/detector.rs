//! 合规引擎核心：归一化源码，逐条求值规则，归并结果并生成报告
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::analyzer::evaluate_rule;
use super::budget::{Budget, CancelOnDrop};
use crate::compiler::{RuleDefinition, RuleSet};
use crate::config::EngineConfig;
use crate::error::{RuleEvaluationError, TfResult, TrustFlowError};
use crate::normalizer::{NormalizedSource, SourceNormalizer};
use crate::report::{ComplianceReport, Finding, ReportBuilder};
use crate::rule::RuleRepository;

/// 合规引擎
#[derive(Debug, Clone)]
pub struct ComplianceEngine {
    repository: Arc<RuleRepository>,
    config: EngineConfig,
}

impl ComplianceEngine {
    /// 创建引擎，从配置中的宪章文件加载规则
    pub async fn new(config: EngineConfig) -> TfResult<Self> {
        let repository = RuleRepository::from_path(&config.constitution_path).await?;
        info!(
            "合规引擎初始化完成，宪章：{}，版本：{}",
            config.constitution_path.display(),
            repository.active_version()
        );
        Ok(Self {
            repository: Arc::new(repository),
            config,
        })
    }

    /// 以已编译的规则集创建
    pub fn with_rules(ruleset: RuleSet, config: EngineConfig) -> Self {
        Self {
            repository: Arc::new(RuleRepository::new(ruleset)),
            config,
        }
    }

    /// 以宪章文档文本创建
    pub fn from_document(document: &str, config: EngineConfig) -> TfResult<Self> {
        Ok(Self {
            repository: Arc::new(RuleRepository::from_document(document)?),
            config,
        })
    }

    pub fn repository(&self) -> &Arc<RuleRepository> {
        &self.repository
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 当前生效的规则集快照
    pub fn ruleset(&self) -> Arc<RuleSet> {
        self.repository.snapshot()
    }

    /// 在调用线程上顺序求值全部规则
    pub fn analyze(&self, contract_id: &str, source: &str) -> ComplianceReport {
        let ruleset = self.repository.snapshot();
        let src = SourceNormalizer::normalize(source);
        debug!(
            "开始分析合约 {}：{} 行，规则 {} 条，降级：{}",
            contract_id,
            src.line_count(),
            ruleset.len(),
            src.is_degraded()
        );

        let mut findings = Vec::new();
        for rule in ruleset.rules() {
            let budget = Budget::start(self.config.matcher_budget, None);
            findings.extend(evaluate_isolated(&src, rule, &budget));
        }

        self.finish(contract_id, &ruleset, findings)
    }

    /// 在阻塞线程池上并发求值规则
    ///
    /// 并发度受 `max_concurrency` 限制；结果按规则顺序重新拼接后再归并，
    /// 与顺序分析的输出一致。future 被丢弃时，排队中的任务被中止，
    /// 运行中的匹配器在下一次预算检查时退出，部分结果不会出现在任何报告中
    pub async fn analyze_concurrent(&self, contract_id: &str, source: &str) -> TfResult<ComplianceReport> {
        self.analyze_concurrent_with_cancel(contract_id, source, Arc::new(AtomicBool::new(false)))
            .await
    }

    /// 与 [`analyze_concurrent`](Self::analyze_concurrent) 相同，取消标志由调用方提供，
    /// 调用方也可以主动置位来中止本次分析
    pub async fn analyze_concurrent_with_cancel(
        &self,
        contract_id: &str,
        source: &str,
        cancel: Arc<AtomicBool>,
    ) -> TfResult<ComplianceReport> {
        let ruleset = self.repository.snapshot();
        let src = Arc::new(SourceNormalizer::normalize(source));
        let guard = CancelOnDrop::new(Arc::clone(&cancel));
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));

        let mut tasks = JoinSet::new();
        for (index, rule) in ruleset.rules().iter().enumerate() {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| TrustFlowError::AsyncTaskError(format!("获取并发许可失败：{}", e)))?;
            let src = Arc::clone(&src);
            let rule = Arc::clone(rule);
            let cancel = Arc::clone(&cancel);
            let limit = self.config.matcher_budget;

            tasks.spawn_blocking(move || {
                let _permit = permit;
                let budget = Budget::start(limit, Some(cancel));
                (index, evaluate_isolated(&src, &rule, &budget))
            });
        }

        let mut slots: Vec<Vec<Finding>> = vec![Vec::new(); ruleset.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, findings) =
                joined.map_err(|e| TrustFlowError::AsyncTaskError(format!("匹配任务异常退出：{}", e)))?;
            slots[index] = findings;
        }
        guard.disarm();

        let findings = slots.into_iter().flatten().collect();
        Ok(self.finish(contract_id, &ruleset, findings))
    }

    /// 重新读取宪章文件；失败时保留原规则集
    pub async fn reload(&self) -> TfResult<()> {
        self.repository.reload().await?;
        Ok(())
    }

    /// 以新文档重载；失败时保留原规则集
    pub fn reload_from_document(&self, document: &str) -> TfResult<()> {
        self.repository.reload_from_document(document)?;
        Ok(())
    }

    fn finish(&self, contract_id: &str, ruleset: &RuleSet, findings: Vec<Finding>) -> ComplianceReport {
        let report = ReportBuilder::build(contract_id, ruleset, findings);
        if self.config.verbose {
            for finding in report.findings() {
                info!("{}：{}", contract_id, finding);
            }
        }
        info!(
            "合约 {} 分析完成：{}（CRITICAL {} / WARNING {} / INFO {}）",
            contract_id,
            report.verdict(),
            report.summary().critical,
            report.summary().warning,
            report.summary().info
        );
        report
    }
}

/// 求值单条规则，匹配器 panic 也降级为 rule-error
fn evaluate_isolated(src: &NormalizedSource, rule: &RuleDefinition, budget: &Budget) -> Vec<Finding> {
    contain_panics(rule, || evaluate_rule(src, rule, budget))
}

fn contain_panics(rule: &RuleDefinition, evaluate: impl FnOnce() -> Vec<Finding>) -> Vec<Finding> {
    panic::catch_unwind(AssertUnwindSafe(evaluate)).unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        warn!("规则 {} 求值时 panic：{}", rule.id, reason);
        let error = RuleEvaluationError::Panicked {
            rule_id: rule.id.clone(),
            reason,
        };
        vec![Finding::rule_error(rule, &error)]
    })
}

// 对外暴露的简化接口（使用全局引擎）
pub fn analyze_contract(contract_id: &str, source: &str) -> TfResult<ComplianceReport> {
    let engine = super::global::get_global_engine()?;
    Ok(engine.analyze(contract_id, source))
}

pub async fn analyze_contract_concurrent(contract_id: &str, source: &str) -> TfResult<ComplianceReport> {
    let engine = super::global::get_global_engine()?;
    engine.analyze_concurrent(contract_id, source).await
}

pub async fn reload_constitution() -> TfResult<()> {
    let engine = super::global::get_global_engine()?;
    engine.reload().await
}
