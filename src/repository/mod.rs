// ==========================================
// DBR 约束排产引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod calendar_repo;
pub mod error;
pub mod order_step_repo;
pub mod order_step_repo_impl;
pub mod resource_repo;
pub mod run_log_repo;

// 重导出核心仓储
pub use calendar_repo::ResourceCalendarRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use order_step_repo::{
    FieldAssignment, OrderStepRepository, StepCommand, StepFilter, StepUnitOfWork,
};
pub use order_step_repo_impl::OrderStepRepositoryImpl;
pub use resource_repo::ScheduledResourceRepository;
pub use run_log_repo::ScheduleRunLogRepository;
