// ==========================================
// DBR 约束排产引擎 - 核心库
// ==========================================
// 方法: Drum-Buffer-Rope（鼓-缓冲-绳）
// 技术栈: Rust + SQLite
// 流程: 冲突检测 → 缓冲 → 鼓 → 绳 → 缓冲 → 紧急度分档
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 工作日历 - 工作时间推算
pub mod calendar;

// 引擎层 - 排产规则
pub mod engine;

// 配置层 - 排产参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 排产触发接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{PassStage, PrioTag, RunStatus};

// 领域实体
pub use domain::{CalendarDay, OrderStep, ScheduleRunLog, ScheduledResource};

// 日历
pub use calendar::{CalendarError, CalendarOracle, TableCalendar};

// 引擎
pub use engine::{
    BufferRecalculator, ConflictDetector, ConflictReport, DrumScheduler, PassError, PassReport,
    PriorityClassifier, RopePropagator, SchedulingOrchestrator,
};

// 配置
pub use config::{ConfigManager, SchedulingConfig};

// API
pub use api::{ApiError, SchedulingApi};

// ==========================================
// 系统常量
// ==========================================

/// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 系统名称
pub const SYSTEM_NAME: &str = "DBR 约束排产引擎";
