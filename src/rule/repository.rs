//! 规则仓库
//! 持有当前生效的规则集引用；重载先完整校验再整体替换引用，
//! 正在运行的分析继续使用各自开始时拿到的快照

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use super::loader::RuleLoader;
use crate::compiler::RuleSet;
use crate::error::{TfResult, TrustFlowError};

/// 规则仓库
#[derive(Debug)]
pub struct RuleRepository {
    active: RwLock<Arc<RuleSet>>,
    // 宪章文件路径，reload() 时重新读取
    source_path: Option<PathBuf>,
}

impl RuleRepository {
    /// 以已加载的规则集创建
    pub fn new(ruleset: RuleSet) -> Self {
        Self {
            active: RwLock::new(Arc::new(ruleset)),
            source_path: None,
        }
    }

    /// 从文档文本创建
    pub fn from_document(document: &str) -> TfResult<Self> {
        Ok(Self::new(RuleLoader::load(document)?))
    }

    /// 从宪章文件创建，之后可通过 reload() 重新读取该文件
    pub async fn from_path(path: impl AsRef<Path>) -> TfResult<Self> {
        let path = path.as_ref();
        let ruleset = RuleLoader::load_from_path(path).await?;
        Ok(Self {
            active: RwLock::new(Arc::new(ruleset)),
            source_path: Some(path.to_path_buf()),
        })
    }

    /// 当前规则集快照
    pub fn snapshot(&self) -> Arc<RuleSet> {
        let guard = self.active.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&*guard)
    }

    /// 当前生效的宪章版本
    pub fn active_version(&self) -> String {
        self.snapshot().version().to_string()
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// 用新文档重载；校验失败时原规则集保持不变
    pub fn reload_from_document(&self, document: &str) -> TfResult<Arc<RuleSet>> {
        match RuleLoader::load(document) {
            Ok(ruleset) => Ok(self.swap(ruleset)),
            Err(e) => {
                warn!("宪章重载失败，继续使用版本 {}：{}", self.active_version(), e);
                Err(e)
            }
        }
    }

    /// 重新读取宪章文件
    pub async fn reload(&self) -> TfResult<Arc<RuleSet>> {
        let Some(path) = self.source_path.as_deref() else {
            return Err(TrustFlowError::RuleLoadError(
                "规则仓库未关联宪章文件，无法重载".to_string(),
            ));
        };

        match RuleLoader::load_from_path(path).await {
            Ok(ruleset) => Ok(self.swap(ruleset)),
            Err(e) => {
                warn!("宪章文件 {} 重载失败，继续使用版本 {}：{}", path.display(), self.active_version(), e);
                Err(e)
            }
        }
    }

    /// 原子替换当前规则集
    pub fn swap(&self, ruleset: RuleSet) -> Arc<RuleSet> {
        let next = Arc::new(ruleset);
        let mut guard = self.active.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous = std::mem::replace(&mut *guard, Arc::clone(&next));
        drop(guard);

        info!("宪章已切换：{} -> {}，规则总数：{}", previous.version(), next.version(), next.len());
        next
    }
}
