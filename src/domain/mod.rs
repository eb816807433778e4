// ==========================================
// DBR 约束排产引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体与类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod order_step;
pub mod resource;
pub mod run_log;
pub mod types;

// 重导出核心类型
pub use order_step::{OrderStep, TargetDateOverride};
pub use resource::{CalendarDay, ScheduledResource};
pub use run_log::ScheduleRunLog;
pub use types::{PassStage, PrioTag, RunStatus};
