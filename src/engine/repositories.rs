// ==========================================
// DBR 约束排产引擎 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合排产流程所需的仓储，简化编排器的依赖注入
// ==========================================

use std::sync::Arc;

use crate::repository::OrderStepRepository;

/// 排产流程仓储集合
///
/// - `order_step_repo`: 工作单元（读取 + 瓶颈清单 + 提交） / 目标日期改写 / 备份恢复
///   （trait 对象，便于替换实现）
#[derive(Clone)]
pub struct SchedulingRepositories {
    pub order_step_repo: Arc<dyn OrderStepRepository>,
}

impl SchedulingRepositories {
    pub fn new(order_step_repo: Arc<dyn OrderStepRepository>) -> Self {
        Self { order_step_repo }
    }
}
