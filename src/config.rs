//! 全局配置管理,存储引擎的所有可配置项

use std::path::PathBuf;
use std::time::Duration;

/// 引擎配置
#[derive(Debug, Clone)]
pub struct EngineConfig {
    // 宪章文件路径
    pub constitution_path: PathBuf,
    // 单个匹配器的时间预算
    pub matcher_budget: Duration,
    // 并发分析时同时运行的匹配器上限
    pub max_concurrency: usize,
    // 是否启用详细日志
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            constitution_path: PathBuf::from("constitution.json"),
            matcher_budget: Duration::from_secs(2),
            max_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            verbose: false,
        }
    }
}

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 获取默认配置
    pub fn get_default() -> EngineConfig {
        EngineConfig::default()
    }

    /// 自定义配置
    pub fn custom() -> CustomConfigBuilder {
        CustomConfigBuilder::new()
    }
}

/// 配置构建器（便于自定义配置）
#[derive(Debug, Clone, Default)]
pub struct CustomConfigBuilder {
    config: EngineConfig,
}

impl CustomConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn constitution_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.constitution_path = path.into();
        self
    }

    pub fn matcher_budget(mut self, budget: Duration) -> Self {
        self.config.matcher_budget = budget;
        self
    }

    /// 至少保留一个并发槽位
    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.config.max_concurrency = limit.max(1);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}
