// ==========================================
// DBR 约束排产引擎 - 缓冲重算
// ==========================================
// 对所有未排除工序:
//   target_buffer_size           = 订单工序数 × buffer_factor
//   remaining_target_buffer_size = 工作日数(now → target_date)
//   target_rbc                   = (size - remaining) / size × 100
// 边界:
// - target_date 为空 → remaining / rbc 置空
// - size ≤ 0 → rbc 置空，计为数据异常
// 日历错误为致命错误，直接返回
// ==========================================

use crate::calendar::{CalendarOracle, CalendarResult};
use crate::domain::order_step::OrderStep;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{instrument, warn};

/// 单轮缓冲重算统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BufferStats {
    pub rows_updated: usize,
    pub without_target_date: usize,
    pub anomalies: usize,
}

// ==========================================
// BufferRecalculator - 缓冲重算器
// ==========================================
#[derive(Debug, Clone)]
pub struct BufferRecalculator {
    buffer_factor: f64,
}

impl BufferRecalculator {
    pub fn new(buffer_factor: f64) -> Self {
        Self { buffer_factor }
    }

    /// 重算全部未排除工序的缓冲字段（target_date 不变时幂等）
    #[instrument(skip(self, steps, calendar), fields(rows = steps.len()))]
    pub fn recalculate(
        &self,
        steps: &mut [OrderStep],
        now: NaiveDateTime,
        calendar: &dyn CalendarOracle,
    ) -> CalendarResult<BufferStats> {
        // 工序数按订单全部行统计
        let mut step_counts: HashMap<String, usize> = HashMap::new();
        for step in steps.iter() {
            *step_counts.entry(step.production_order_nr.clone()).or_insert(0) += 1;
        }

        let mut stats = BufferStats::default();

        for step in steps.iter_mut().filter(|s| !s.is_excluded) {
            let step_count = step_counts
                .get(&step.production_order_nr)
                .copied()
                .unwrap_or(0);
            let size = step_count as f64 * self.buffer_factor;
            step.target_buffer_size = Some(size);

            match step.target_date {
                None => {
                    step.remaining_target_buffer_size = None;
                    step.target_rbc = None;
                    stats.without_target_date += 1;
                }
                Some(target_date) => {
                    let remaining =
                        calendar.working_days_between(now, target_date, &step.resource)?;
                    step.remaining_target_buffer_size = Some(remaining);

                    if size > 0.0 {
                        step.target_rbc = Some((size - remaining) / size * 100.0);
                    } else {
                        step.target_rbc = None;
                        stats.anomalies += 1;
                        warn!(
                            production_order_nr = %step.production_order_nr,
                            work_step_nr = %step.work_step_nr,
                            target_buffer_size = size,
                            "缓冲大小非正，无法计算缓冲消耗比"
                        );
                    }
                }
            }

            stats.rows_updated += 1;
        }

        Ok(stats)
    }
}
