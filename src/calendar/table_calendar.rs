// ==========================================
// DBR 约束排产引擎 - 表驱动工作日历
// ==========================================
// 模型:
// - 每个工作日一个班次: [日期 + shift_start, + working_hours 小时)
// - is_off / working_hours = 0 / 日历缺行 的日期不提供工作时间
// - 资源完全没有日历行 → UnknownResource
// - 推算扫描天数受 horizon_days 限制 → HorizonExceeded
// ==========================================

use crate::calendar::{CalendarError, CalendarOracle, CalendarResult};
use crate::config::scheduling_config::CalendarSettings;
use crate::domain::resource::CalendarDay;
use crate::repository::calendar_repo::ResourceCalendarRepository;
use crate::repository::error::RepositoryResult;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound::{Excluded, Included};

const MS_PER_MINUTE: f64 = 60_000.0;

// ==========================================
// TableCalendar - 资源日历快照
// ==========================================
#[derive(Debug, Clone)]
pub struct TableCalendar {
    settings: CalendarSettings,
    // resource → (date → 有效工时)
    hours: HashMap<String, BTreeMap<NaiveDate, i64>>,
}

impl TableCalendar {
    pub fn new(settings: CalendarSettings) -> Self {
        Self {
            settings,
            hours: HashMap::new(),
        }
    }

    /// 从日历行构建快照
    pub fn from_days(settings: CalendarSettings, days: impl IntoIterator<Item = CalendarDay>) -> Self {
        let mut calendar = Self::new(settings);
        for day in days {
            calendar.insert_day(day);
        }
        calendar
    }

    /// 从日历表加载全部资源的日历
    pub fn load(
        repo: &ResourceCalendarRepository,
        settings: CalendarSettings,
    ) -> RepositoryResult<Self> {
        let days = repo.list_all()?;
        let calendar = Self::from_days(settings, days);
        tracing::debug!(resources = calendar.resource_count(), "工作日历已加载");
        Ok(calendar)
    }

    /// 写入（覆盖）单个日历行
    pub fn insert_day(&mut self, day: CalendarDay) {
        // 单班不超过 24 小时，避免与次日班次重叠
        let effective = day
            .effective_hours(self.settings.default_working_hours)
            .min(24);
        self.hours
            .entry(day.resource)
            .or_default()
            .insert(day.date, effective);
    }

    /// 连续 n 天相同工时（测试夹具 / 初始化使用）
    pub fn with_uniform_days(
        mut self,
        resource: &str,
        from: NaiveDate,
        n_days: i64,
        hours: i64,
    ) -> Self {
        for offset in 0..n_days.max(0) {
            let date = from + Duration::days(offset);
            self.insert_day(CalendarDay::working(resource, date, hours));
        }
        self
    }

    /// 已加载日历的资源数
    pub fn resource_count(&self) -> usize {
        self.hours.len()
    }

    fn resource_hours(&self, resource: &str) -> CalendarResult<&BTreeMap<NaiveDate, i64>> {
        self.hours
            .get(resource)
            .ok_or_else(|| CalendarError::UnknownResource(resource.to_string()))
    }
}

impl CalendarOracle for TableCalendar {
    fn add_working_minutes(
        &self,
        start: NaiveDateTime,
        minutes: f64,
        resource: &str,
    ) -> CalendarResult<NaiveDateTime> {
        if !minutes.is_finite() || minutes < 0.0 {
            return Err(CalendarError::InvalidDuration(minutes));
        }

        let hours = self.resource_hours(resource)?;

        let mut remaining_ms = (minutes * MS_PER_MINUTE).round() as i64;
        if remaining_ms == 0 {
            return Ok(start);
        }

        // 前一天的班次可能跨过午夜覆盖 start，从前一天开始扫描
        let mut date = start.date() - Duration::days(1);
        for _ in 0..=self.settings.horizon_days + 1 {
            let day_hours = hours.get(&date).copied().unwrap_or(0);
            if day_hours > 0 {
                let window_start = date.and_time(self.settings.shift_start);
                let window_end = window_start + Duration::hours(day_hours);
                let begin = start.max(window_start);

                if begin < window_end {
                    let available_ms = (window_end - begin).num_milliseconds();
                    if remaining_ms <= available_ms {
                        return Ok(begin + Duration::milliseconds(remaining_ms));
                    }
                    remaining_ms -= available_ms;
                }
            }
            date += Duration::days(1);
        }

        Err(CalendarError::HorizonExceeded {
            resource: resource.to_string(),
            horizon_days: self.settings.horizon_days,
        })
    }

    fn working_days_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        resource: &str,
    ) -> CalendarResult<f64> {
        let hours = self.resource_hours(resource)?;

        let (from, to, sign) = if end >= start {
            (start.date(), end.date(), 1.0)
        } else {
            (end.date(), start.date(), -1.0)
        };

        // (from, to] 区间内的工作日
        let count = hours
            .range((Excluded(from), Included(to)))
            .filter(|(_, h)| **h > 0)
            .count();

        Ok(sign * count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(d: NaiveDate, h: u32, min: u32) -> NaiveDateTime {
        d.and_hms_opt(h, min, 0).unwrap()
    }

    /// 2025-08-04 (周一) 起 14 天，周末休息，每天 8 小时（08:00-16:00）
    fn weekday_calendar() -> TableCalendar {
        let mut calendar = TableCalendar::new(CalendarSettings::default());
        let monday = date(2025, 8, 4);
        for offset in 0..14 {
            let d = monday + Duration::days(offset);
            if offset % 7 >= 5 {
                calendar.insert_day(CalendarDay::off("blau", d));
            } else {
                calendar.insert_day(CalendarDay::working("blau", d, 8));
            }
        }
        calendar
    }

    #[test]
    fn test_zero_minutes_returns_start() {
        let calendar = weekday_calendar();
        let start = at(date(2025, 8, 9), 3, 0); // 周六凌晨
        assert_eq!(calendar.add_working_minutes(start, 0.0, "blau").unwrap(), start);
    }

    #[test]
    fn test_minutes_within_one_shift() {
        let calendar = weekday_calendar();
        let start = at(date(2025, 8, 4), 9, 0);
        let result = calendar.add_working_minutes(start, 100.0, "blau").unwrap();
        assert_eq!(result, at(date(2025, 8, 4), 10, 40));
    }

    #[test]
    fn test_start_before_shift_is_clamped_to_shift_start() {
        let calendar = weekday_calendar();
        let start = at(date(2025, 8, 4), 6, 0);
        let result = calendar.add_working_minutes(start, 30.0, "blau").unwrap();
        assert_eq!(result, at(date(2025, 8, 4), 8, 30));
    }

    #[test]
    fn test_minutes_spill_over_weekend() {
        let calendar = weekday_calendar();
        // 周五 15:00 起 120 分钟: 周五剩 60 分钟，周末休息，周一 08:00 + 60 分钟
        let start = at(date(2025, 8, 8), 15, 0);
        let result = calendar.add_working_minutes(start, 120.0, "blau").unwrap();
        assert_eq!(result, at(date(2025, 8, 11), 9, 0));
    }

    #[test]
    fn test_exact_shift_length_ends_at_shift_end() {
        let calendar = weekday_calendar();
        let start = at(date(2025, 8, 4), 8, 0);
        let result = calendar.add_working_minutes(start, 480.0, "blau").unwrap();
        assert_eq!(result, at(date(2025, 8, 4), 16, 0));
    }

    #[test]
    fn test_fractional_minutes() {
        let calendar = weekday_calendar();
        let start = at(date(2025, 8, 4), 8, 0);
        let result = calendar.add_working_minutes(start, 1.5, "blau").unwrap();
        assert_eq!(result, at(date(2025, 8, 4), 8, 1) + Duration::seconds(30));
    }

    #[test]
    fn test_night_shift_crossing_midnight() {
        let settings = CalendarSettings {
            shift_start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            ..CalendarSettings::default()
        };
        let calendar =
            TableCalendar::new(settings).with_uniform_days("nacht", date(2025, 8, 4), 3, 8);
        // 8 月 5 日 02:00 仍处于 8 月 4 日 22:00 开始的班次内
        let start = at(date(2025, 8, 5), 2, 0);
        let result = calendar.add_working_minutes(start, 60.0, "nacht").unwrap();
        assert_eq!(result, at(date(2025, 8, 5), 3, 0));
    }

    #[test]
    fn test_unknown_resource() {
        let calendar = weekday_calendar();
        let start = at(date(2025, 8, 4), 9, 0);
        assert_eq!(
            calendar.add_working_minutes(start, 10.0, "gelb"),
            Err(CalendarError::UnknownResource("gelb".to_string()))
        );
        assert!(calendar
            .working_days_between(start, start, "gelb")
            .is_err());
    }

    #[test]
    fn test_horizon_exceeded() {
        let calendar = weekday_calendar();
        let start = at(date(2025, 8, 4), 9, 0);
        // 日历只有 10 个工作日 = 4800 分钟
        let err = calendar.add_working_minutes(start, 10_000.0, "blau").unwrap_err();
        assert!(matches!(err, CalendarError::HorizonExceeded { .. }));
    }

    #[test]
    fn test_negative_minutes_rejected() {
        let calendar = weekday_calendar();
        let start = at(date(2025, 8, 4), 9, 0);
        assert_eq!(
            calendar.add_working_minutes(start, -1.0, "blau"),
            Err(CalendarError::InvalidDuration(-1.0))
        );
    }

    #[test]
    fn test_working_days_between_skips_off_days() {
        let calendar = weekday_calendar();
        let now = at(date(2025, 8, 4), 9, 0);
        // (周一, 下周一] = 周二..周五 4 天 + 下周一 1 天
        let target = at(date(2025, 8, 11), 16, 0);
        assert_eq!(calendar.working_days_between(now, target, "blau").unwrap(), 5.0);
    }

    #[test]
    fn test_working_days_between_same_day_is_zero() {
        let calendar = weekday_calendar();
        let now = at(date(2025, 8, 4), 9, 0);
        let target = at(date(2025, 8, 4), 15, 0);
        assert_eq!(calendar.working_days_between(now, target, "blau").unwrap(), 0.0);
    }

    #[test]
    fn test_working_days_between_past_target_is_negative() {
        let calendar = weekday_calendar();
        let now = at(date(2025, 8, 7), 9, 0);
        let target = at(date(2025, 8, 4), 9, 0);
        assert_eq!(calendar.working_days_between(now, target, "blau").unwrap(), -3.0);
    }
}
