// ==========================================
// DBR 约束排产引擎 - 配置层
// ==========================================
// 职责: 排产参数管理（缓冲系数 / 分档阈值 / 日历参数）
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod scheduling_config;

// 重导出核心配置
pub use config_manager::{config_keys, ConfigManager};
pub use scheduling_config::{CalendarSettings, PrioThresholds, SchedulingConfig};
