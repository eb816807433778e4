// ==========================================
// 测试数据构建器 - 用于集成测试
// ==========================================

use chrono::NaiveDateTime;
use dbr_scheduler::domain::OrderStep;

// ==========================================
// OrderStep 构建器
// ==========================================

pub struct OrderStepBuilder {
    step: OrderStep,
}

impl OrderStepBuilder {
    /// 默认: priority=1, worksteps_to_go=0, production_time=0
    pub fn new(production_order_nr: &str, work_step_nr: &str, resource: &str) -> Self {
        Self {
            step: OrderStep::new(production_order_nr, work_step_nr, resource, 1, 0, 0.0),
        }
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.step.priority = priority;
        self
    }

    pub fn worksteps_to_go(mut self, worksteps_to_go: i64) -> Self {
        self.step.worksteps_to_go = worksteps_to_go;
        self
    }

    pub fn production_time(mut self, minutes: f64) -> Self {
        self.step.production_time = minutes;
        self
    }

    pub fn target_date(mut self, target_date: NaiveDateTime) -> Self {
        self.step.target_date = Some(target_date);
        self
    }

    pub fn target_type(mut self, target_type: &str) -> Self {
        self.step.target_type = Some(target_type.to_string());
        self
    }

    pub fn excluded(mut self) -> Self {
        self.step.is_excluded = true;
        self
    }

    pub fn build(self) -> OrderStep {
        self.step
    }
}

// ==========================================
// 常用场景
// ==========================================

/// 两工序订单: 瓶颈 blau（100 分钟）→ 非瓶颈 gruen
pub fn two_step_order(production_order_nr: &str) -> Vec<OrderStep> {
    vec![
        OrderStepBuilder::new(production_order_nr, "10", "blau")
            .worksteps_to_go(1)
            .production_time(100.0)
            .build(),
        OrderStepBuilder::new(production_order_nr, "20", "gruen")
            .worksteps_to_go(0)
            .production_time(30.0)
            .build(),
    ]
}

/// 按 (订单号, 工步号) 查找
pub fn find_step<'a>(steps: &'a [OrderStep], order_nr: &str, step_nr: &str) -> &'a OrderStep {
    steps
        .iter()
        .find(|s| s.production_order_nr == order_nr && s.work_step_nr == step_nr)
        .unwrap_or_else(|| panic!("step {}/{} not found", order_nr, step_nr))
}
