// ==========================================
// DBR 约束排产引擎 - API 层
// ==========================================
// 职责: 对外提供排产触发接口（CLI / 上层服务调用）
// ==========================================

pub mod error;
pub mod scheduling_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use scheduling_api::SchedulingApi;
