// ==========================================
// DBR 约束排产引擎 - 工序领域模型
// ==========================================
// 一行 = (生产订单号, 工步号)
// 引擎只改写派生字段，不新增 / 删除行
// ==========================================

use crate::domain::types::PrioTag;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// OrderStep - 生产订单工序
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStep {
    // ===== 主键 =====
    pub production_order_nr: String, // 生产订单号（同一订单所有工序共享）
    pub work_step_nr: String,        // 工步号（订单内唯一）

    // ===== 外部输入 =====
    pub resource: String,     // 资源组
    pub priority: i64,        // 外部优先级（越小越先排）
    pub worksteps_to_go: i64, // 剩余工步数（最后一步为 0）
    pub production_time: f64, // 加工时长（分钟）

    // ===== 缓冲 (Buffer) =====
    pub target_buffer_size: Option<f64>,
    pub remaining_target_buffer_size: Option<f64>,
    pub target_rbc: Option<f64>, // 缓冲消耗比（百分比）
    pub prio: Option<PrioTag>,

    // ===== 鼓 (Drum) =====
    pub running_sum_production_time: Option<f64>,
    pub expected_start_time_min: Option<f64>,
    pub start_date_assumption: Option<NaiveDateTime>,
    pub end_date_assumption: Option<NaiveDateTime>,

    // ===== 绳 (Rope) =====
    pub target_date: Option<NaiveDateTime>,
    pub target_type: Option<String>, // 记录由哪个瓶颈拉动，如 "EP-blau"

    pub is_excluded: bool,
    pub customized_target_date: bool, // 目标日期为人工指定
}

impl OrderStep {
    /// 创建仅包含外部输入字段的工序（派生字段为空）
    pub fn new(
        production_order_nr: impl Into<String>,
        work_step_nr: impl Into<String>,
        resource: impl Into<String>,
        priority: i64,
        worksteps_to_go: i64,
        production_time: f64,
    ) -> Self {
        Self {
            production_order_nr: production_order_nr.into(),
            work_step_nr: work_step_nr.into(),
            resource: resource.into(),
            priority,
            worksteps_to_go,
            production_time,
            target_buffer_size: None,
            remaining_target_buffer_size: None,
            target_rbc: None,
            prio: None,
            running_sum_production_time: None,
            expected_start_time_min: None,
            start_date_assumption: None,
            end_date_assumption: None,
            target_date: None,
            target_type: None,
            is_excluded: false,
            customized_target_date: false,
        }
    }

    /// 指定目标日期（构造辅助）
    pub fn with_target_date(mut self, target_date: NaiveDateTime) -> Self {
        self.target_date = Some(target_date);
        self
    }
}

// ==========================================
// TargetDateOverride - 人工目标日期
// ==========================================
// 作用于整单所有工序；target_date = None 表示撤销
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDateOverride {
    pub production_order_nr: String,
    pub target_date: Option<NaiveDateTime>,
}

impl TargetDateOverride {
    pub fn new(production_order_nr: impl Into<String>, target_date: Option<NaiveDateTime>) -> Self {
        Self {
            production_order_nr: production_order_nr.into(),
            target_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_date_override_json_shape() {
        let raw = r#"{"productionOrderNr":"PO1","targetDate":"2025-08-06T09:00:00"}"#;
        let parsed: TargetDateOverride = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.production_order_nr, "PO1");
        assert!(parsed.target_date.is_some());

        let cleared: TargetDateOverride =
            serde_json::from_str(r#"{"productionOrderNr":"PO1","targetDate":null}"#).unwrap();
        assert_eq!(cleared.target_date, None);
    }
}
