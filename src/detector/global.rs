//! 全局引擎单例管理
use once_cell::sync::Lazy;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::detector::ComplianceEngine;
use crate::error::{TfResult, TrustFlowError};
use crate::config::{ConfigManager, EngineConfig};

/// 全局引擎实例
static GLOBAL_ENGINE: Lazy<Arc<OnceCell<ComplianceEngine>>> = Lazy::new(|| {
    Arc::new(OnceCell::new())
});

/// 初始化全局引擎（默认配置）
pub async fn init_engine() -> TfResult<()> {
    init_engine_with_config(ConfigManager::get_default()).await
}

/// 带自定义配置初始化全局引擎
pub async fn init_engine_with_config(config: EngineConfig) -> TfResult<()> {
    if GLOBAL_ENGINE.get().is_some() {
        return Ok(());
    }

    let engine = ComplianceEngine::new(config).await?;
    install(engine)
}

/// 以宪章文档文本初始化全局引擎（不关联文件，reload 需走文档接口）
pub fn init_engine_with_document(document: &str, config: EngineConfig) -> TfResult<()> {
    if GLOBAL_ENGINE.get().is_some() {
        return Ok(());
    }

    let engine = ComplianceEngine::from_document(document, config)?;
    install(engine)
}

fn install(engine: ComplianceEngine) -> TfResult<()> {
    GLOBAL_ENGINE.set(engine).map_err(|_| {
        TrustFlowError::EngineInitError("全局引擎已被并发初始化".to_string())
    })
}

/// 获取全局引擎
pub(crate) fn get_global_engine() -> TfResult<&'static ComplianceEngine> {
    GLOBAL_ENGINE.get().ok_or_else(|| {
        TrustFlowError::EngineNotInitialized("请先调用 init_engine 加载宪章".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::detector::analyze_contract;

    #[test]
    fn test_global_engine_lifecycle() {
        // 全局状态只能在单个测试里按顺序验证
        if GLOBAL_ENGINE.get().is_none() {
            let err = analyze_contract("c", "contract A {}").unwrap_err();
            assert!(matches!(err, TrustFlowError::EngineNotInitialized(_)));
            assert!(err.is_config_error());
        }

        let doc = r#"{"version": "global-1", "rules": {}}"#;
        init_engine_with_document(doc, ConfigManager::get_default()).unwrap();
        // 重复初始化是空操作
        init_engine_with_document(r#"{"version": "global-2", "rules": {}}"#, ConfigManager::get_default()).unwrap();

        let report = analyze_contract("c", "contract A {}").unwrap();
        assert_eq!(report.ruleset_version(), "global-1");
    }
}
