use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::query::continuation::Version;

/// 跨分区流水线的调优参数
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// 同时在途的分区拉取数上限
    pub max_concurrency: usize,
    /// 所有分区缓冲文档总数达到此值后暂停预取
    pub max_buffered_item_count: usize,
    /// 每次返回给调用方的最大条目数，同时是自适应页大小的上限
    pub max_item_count: usize,
    pub initial_page_size: usize,
    pub page_size_growth_factor: f64,
    /// 续传令牌携带查询计划时允许的最大字节数
    pub continuation_token_size_limit_bytes: usize,
    pub max_known_token_version: Version,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: num_cpus::get(),
            max_buffered_item_count: 512,
            max_item_count: 100,
            initial_page_size: 50,
            page_size_growth_factor: 1.6,
            continuation_token_size_limit_bytes: 16 * 1024,
            max_known_token_version: Version::LATEST,
        }
    }
}

impl PipelineConfig {
    /// 校验参数取值
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("max_concurrency 必须大于 0".to_string());
        }
        if self.max_item_count == 0 || self.initial_page_size == 0 {
            return Err("页大小必须大于 0".to_string());
        }
        if !(self.page_size_growth_factor >= 1.0) {
            return Err(format!(
                "page_size_growth_factor 必须不小于 1.0, 实际为 {}",
                self.page_size_growth_factor
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub dir: String,
    pub file: String,
    pub max_file_size: u64,
    pub max_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: "logs".to_string(),
            file: "crossquery".to_string(),
            max_file_size: 100 * 1024 * 1024, // 100MB
            max_files: 5,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub log: LogConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.pipeline.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
