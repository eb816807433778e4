// ==========================================
// DBR 约束排产引擎 - 鼓（瓶颈资源排序）
// ==========================================
// 输入: 指定瓶颈资源上、未排除、worksteps_to_go >= 0 的工序
// 排序: priority 升序 → worksteps_to_go 升序 → target_rbc 降序（空值最后）
//       → production_order_nr 升序；稳定排序，完全相同的键保持读取顺序
// 输出:
//   running_sum_production_time = 含本行的累计加工时长
//   expected_start_time_min     = 前一行的累计值（首行为 0）
//   start_date_assumption       = 日历推算(now + expected_start_time_min)
//   end_date_assumption         = 日历推算(now + running_sum_production_time)
// ==========================================

use crate::calendar::{CalendarOracle, CalendarResult};
use crate::domain::order_step::OrderStep;
use chrono::NaiveDateTime;
use std::cmp::Ordering;
use tracing::{debug, instrument};

/// 空值排在最后的降序比较
fn cmp_desc_nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// 鼓排序比较器
pub fn drum_order(a: &OrderStep, b: &OrderStep) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then(a.worksteps_to_go.cmp(&b.worksteps_to_go))
        .then_with(|| cmp_desc_nulls_last(a.target_rbc, b.target_rbc))
        .then_with(|| a.production_order_nr.cmp(&b.production_order_nr))
}

// ==========================================
// DrumScheduler - 鼓排程器
// ==========================================
#[derive(Debug, Default)]
pub struct DrumScheduler;

impl DrumScheduler {
    pub fn new() -> Self {
        Self
    }

    /// 对单个瓶颈资源排序并推算开工 / 完工时刻
    ///
    /// # 返回
    /// - Ok(usize): 排入的工序数（无工序时为 0，不做任何改写）
    /// - Err: 日历推算错误
    #[instrument(skip(self, steps, calendar), fields(rows = steps.len()))]
    pub fn schedule(
        &self,
        steps: &mut [OrderStep],
        resource: &str,
        now: NaiveDateTime,
        calendar: &dyn CalendarOracle,
    ) -> CalendarResult<usize> {
        let mut queue: Vec<usize> = steps
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_excluded && s.resource == resource && s.worksteps_to_go >= 0)
            .map(|(idx, _)| idx)
            .collect();

        // sort_by 为稳定排序
        queue.sort_by(|&a, &b| drum_order(&steps[a], &steps[b]));

        let mut cumulative = 0.0;
        for &idx in &queue {
            let step = &mut steps[idx];
            let start_min = cumulative;
            cumulative += step.production_time;

            step.expected_start_time_min = Some(start_min);
            step.running_sum_production_time = Some(cumulative);
            step.start_date_assumption =
                Some(calendar.add_working_minutes(now, start_min, resource)?);
            step.end_date_assumption =
                Some(calendar.add_working_minutes(now, cumulative, resource)?);
        }

        debug!(
            resource = resource,
            scheduled = queue.len(),
            total_minutes = cumulative,
            "瓶颈资源排序完成"
        );

        Ok(queue.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::TableCalendar;
    use crate::config::scheduling_config::CalendarSettings;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 8, 4)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn calendar() -> TableCalendar {
        TableCalendar::new(CalendarSettings::default()).with_uniform_days(
            "blau",
            NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
            60,
            8,
        )
    }

    fn step(order: &str, priority: i64, wtg: i64, rbc: Option<f64>, minutes: f64) -> OrderStep {
        let mut s = OrderStep::new(order, "10", "blau", priority, wtg, minutes);
        s.target_rbc = rbc;
        s
    }

    fn scheduled_order(steps: &[OrderStep]) -> Vec<String> {
        let mut rows: Vec<&OrderStep> = steps
            .iter()
            .filter(|s| s.expected_start_time_min.is_some())
            .collect();
        rows.sort_by(|a, b| a.running_sum_production_time.partial_cmp(&b.running_sum_production_time).unwrap());
        rows.iter().map(|s| s.production_order_nr.clone()).collect()
    }

    #[test]
    fn test_total_order_of_sort_keys() {
        let mut steps = vec![
            step("PO5", 2, 0, Some(90.0), 10.0),
            step("PO4", 1, 1, Some(10.0), 10.0),
            step("PO3", 1, 0, None, 10.0),
            step("PO2", 1, 0, Some(20.0), 10.0),
            step("PO1", 1, 0, Some(20.0), 10.0),
            step("PO0", 1, 0, Some(80.0), 10.0),
        ];

        DrumScheduler::new()
            .schedule(&mut steps, "blau", now(), &calendar())
            .unwrap();

        assert_eq!(
            scheduled_order(&steps),
            vec!["PO0", "PO1", "PO2", "PO3", "PO4", "PO5"]
        );
    }

    #[test]
    fn test_cumulative_sums_and_lag() {
        let mut steps = vec![
            step("PO1", 1, 0, None, 100.0),
            step("PO2", 2, 0, None, 0.0),
            step("PO3", 3, 0, None, 50.0),
        ];

        let count = DrumScheduler::new()
            .schedule(&mut steps, "blau", now(), &calendar())
            .unwrap();

        assert_eq!(count, 3);
        assert_eq!(steps[0].expected_start_time_min, Some(0.0));
        assert_eq!(steps[0].running_sum_production_time, Some(100.0));
        assert_eq!(steps[1].expected_start_time_min, Some(100.0));
        assert_eq!(steps[1].running_sum_production_time, Some(100.0));
        assert_eq!(steps[2].expected_start_time_min, Some(100.0));
        assert_eq!(steps[2].running_sum_production_time, Some(150.0));

        let base = now();
        assert_eq!(steps[0].start_date_assumption, Some(base));
        assert_eq!(steps[0].end_date_assumption, Some(base + chrono::Duration::minutes(100)));
        assert_eq!(steps[2].start_date_assumption, Some(base + chrono::Duration::minutes(100)));
    }

    #[test]
    fn test_filters_resource_excluded_and_negative_wtg() {
        let mut other = step("PO1", 1, 0, None, 10.0);
        other.resource = "rot".to_string();
        let mut excluded = step("PO2", 1, 0, None, 10.0);
        excluded.is_excluded = true;
        let negative = step("PO3", 1, -1, None, 10.0);

        let mut steps = vec![other, excluded, negative];
        let count = DrumScheduler::new()
            .schedule(&mut steps, "blau", now(), &calendar())
            .unwrap();

        assert_eq!(count, 0);
        assert!(steps.iter().all(|s| s.start_date_assumption.is_none()));
    }

    #[test]
    fn test_identical_keys_keep_input_order() {
        let mut steps = vec![step("PO1", 1, 0, None, 10.0), step("PO1", 1, 0, None, 20.0)];
        steps[1].work_step_nr = "20".to_string();

        DrumScheduler::new()
            .schedule(&mut steps, "blau", now(), &calendar())
            .unwrap();

        assert_eq!(steps[0].running_sum_production_time, Some(10.0));
        assert_eq!(steps[1].running_sum_production_time, Some(30.0));
    }
}
