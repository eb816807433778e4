// ==========================================
// DBR 约束排产引擎 - 绳（日期下推）
// ==========================================
// 对瓶颈资源上已排出 start_date_assumption 的每一行:
//   同订单、未排除、worksteps_to_go 严格更小的工序
//   → target_date = 该行 start_date_assumption
//   → target_type = 前缀 + 资源名（如 "EP-blau"）
// 同一订单在该资源上有多道工序时，按 worksteps_to_go 降序处理，
// 离下游最近的瓶颈工序最后写入
// ==========================================

use crate::domain::order_step::OrderStep;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use tracing::{debug, instrument};

// ==========================================
// RopePropagator - 日期下推器
// ==========================================
#[derive(Debug, Clone)]
pub struct RopePropagator {
    target_type_prefix: String,
}

impl RopePropagator {
    pub fn new(target_type_prefix: impl Into<String>) -> Self {
        Self {
            target_type_prefix: target_type_prefix.into(),
        }
    }

    /// 目标类型标记，如 "EP-blau"
    pub fn target_type_for(&self, resource: &str) -> String {
        format!("{}{}", self.target_type_prefix, resource)
    }

    /// 将瓶颈资源的开工时刻下推到同订单的后续工序
    ///
    /// # 返回
    /// 被改写的工序行数（同一行被多次改写按多次计）
    #[instrument(skip(self, steps), fields(rows = steps.len()))]
    pub fn propagate(&self, steps: &mut [OrderStep], resource: &str) -> usize {
        // (订单号, 瓶颈工序剩余工步数, 开工时刻)
        let mut anchors: Vec<(String, i64, NaiveDateTime)> = steps
            .iter()
            .filter(|s| !s.is_excluded && s.resource == resource)
            .filter_map(|s| {
                s.start_date_assumption
                    .map(|start| (s.production_order_nr.clone(), s.worksteps_to_go, start))
            })
            .collect();
        anchors.sort_by(|a, b| b.1.cmp(&a.1));

        if anchors.is_empty() {
            return 0;
        }

        let mut by_order: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, step) in steps.iter().enumerate() {
            if !step.is_excluded {
                by_order
                    .entry(step.production_order_nr.as_str())
                    .or_default()
                    .push(idx);
            }
        }

        let target_type = self.target_type_for(resource);
        let mut updates: Vec<(usize, NaiveDateTime)> = Vec::new();
        for (order_nr, anchor_wtg, start) in &anchors {
            if let Some(indices) = by_order.get(order_nr.as_str()) {
                updates.extend(
                    indices
                        .iter()
                        .filter(|&&idx| steps[idx].worksteps_to_go < *anchor_wtg)
                        .map(|&idx| (idx, *start)),
                );
            }
        }

        for &(idx, start) in &updates {
            steps[idx].target_date = Some(start);
            steps[idx].target_type = Some(target_type.clone());
        }

        debug!(
            resource = resource,
            anchors = anchors.len(),
            rows_updated = updates.len(),
            "瓶颈日期下推完成"
        );

        updates.len()
    }
}
