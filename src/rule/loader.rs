//! 宪章加载管理器
//! 负责读取并解析宪章文档，交由编译器校验；失败时不返回任何部分规则集

use std::path::Path;
use tracing::{debug, warn};

use super::model::ConstitutionDocument;
use crate::compiler::{RuleCompiler, RuleSet};
use crate::error::{TfResult, TrustFlowError};

/// 宪章加载管理器
pub struct RuleLoader;

impl RuleLoader {
    /// 从文档文本加载规则集
    pub fn load(document: &str) -> TfResult<RuleSet> {
        let parsed = Self::parse_document(document)?;
        let ruleset = RuleCompiler::compile(parsed).map_err(|e| {
            warn!("宪章校验失败：{}", e);
            e
        })?;
        debug!("宪章加载成功，版本：{}，规则总数：{}", ruleset.version(), ruleset.len());
        Ok(ruleset)
    }

    /// 从本地文件加载规则集
    pub async fn load_from_path(path: &Path) -> TfResult<RuleSet> {
        let document = tokio::fs::read_to_string(path).await.map_err(|e| {
            TrustFlowError::RuleLoadError(format!("读取宪章文件 {} 失败：{}", path.display(), e))
        })?;
        debug!("读取宪章文件成功：{}，大小：{} 字节", path.display(), document.len());
        Self::load(&document)
    }

    /// 解析宪章 JSON
    pub fn parse_document(document: &str) -> TfResult<ConstitutionDocument> {
        if document.trim().is_empty() {
            return Err(TrustFlowError::RuleLoadError("宪章文档为空".to_string()));
        }
        Ok(serde_json::from_str(document)?)
    }
}
