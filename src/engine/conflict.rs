// ==========================================
// DBR 约束排产引擎 - 多瓶颈冲突检测
// ==========================================
// 规则: 一个订单若经过 ≥ 2 个不同的瓶颈资源 → 整单排除
//       其余订单显式置为未排除
// 输出: ConflictReport（按订单号升序）
// ==========================================

use crate::domain::order_step::OrderStep;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{instrument, warn};

// ==========================================
// ConflictReport - 冲突报告
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub excluded_orders: Vec<String>, // 被排除的订单号（升序）
    pub excluded_steps: usize,        // 被排除的工序行数
}

impl ConflictReport {
    pub fn has_conflicts(&self) -> bool {
        !self.excluded_orders.is_empty()
    }

    /// 冲突订单列表文本，如 "PO1 / PO2 / "
    pub fn summary(&self) -> String {
        self.excluded_orders
            .iter()
            .map(|order_nr| format!("{} / ", order_nr))
            .collect()
    }
}

// ==========================================
// ConflictDetector - 冲突检测器
// ==========================================
#[derive(Debug, Default)]
pub struct ConflictDetector;

impl ConflictDetector {
    pub fn new() -> Self {
        Self
    }

    /// 只读检测：找出经过多个瓶颈资源的订单
    pub fn find(&self, steps: &[OrderStep], constraints: &HashSet<String>) -> ConflictReport {
        let mut touched: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for step in steps.iter().filter(|s| constraints.contains(&s.resource)) {
            touched
                .entry(step.production_order_nr.as_str())
                .or_default()
                .insert(step.resource.as_str());
        }

        let excluded_orders: Vec<String> = touched
            .into_iter()
            .filter(|(_, resources)| resources.len() >= 2)
            .map(|(order_nr, _)| order_nr.to_string())
            .collect();

        let excluded_steps = steps
            .iter()
            .filter(|s| excluded_orders.binary_search(&s.production_order_nr).is_ok())
            .count();

        ConflictReport {
            excluded_orders,
            excluded_steps,
        }
    }

    /// 检测并改写 is_excluded（每一行都会被显式赋值）
    #[instrument(skip_all, fields(rows = steps.len(), constraints = constraints.len()))]
    pub fn detect(&self, steps: &mut [OrderStep], constraints: &HashSet<String>) -> ConflictReport {
        let report = self.find(steps, constraints);

        for step in steps.iter_mut() {
            step.is_excluded = report
                .excluded_orders
                .binary_search(&step.production_order_nr)
                .is_ok();
        }

        if report.has_conflicts() {
            warn!(
                orders = report.excluded_orders.len(),
                steps = report.excluded_steps,
                list = %report.summary(),
                "存在经过多个瓶颈资源的订单，已整单排除"
            );
        }

        report
    }
}
