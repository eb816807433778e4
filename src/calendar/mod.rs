// ==========================================
// DBR 约束排产引擎 - 工作日历 (Calendar Oracle)
// ==========================================
// 职责: 按资源日历做工作时间推算
// 约定: 引擎只依赖 CalendarOracle trait，具体算法可替换
// ==========================================

pub mod table_calendar;

pub use table_calendar::TableCalendar;

use chrono::NaiveDateTime;
use thiserror::Error;

/// 日历推算错误（对排产来说是致命错误）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalendarError {
    #[error("未知资源（无日历数据）: {0}")]
    UnknownResource(String),

    #[error("超出日历推算范围: resource={resource}, horizon_days={horizon_days}")]
    HorizonExceeded { resource: String, horizon_days: i64 },

    #[error("无效的工作时长: {0}")]
    InvalidDuration(f64),
}

pub type CalendarResult<T> = Result<T, CalendarError>;

// ==========================================
// CalendarOracle Trait
// ==========================================
// 实现者: TableCalendar（资源 × 日期 工时表）
pub trait CalendarOracle: Send + Sync {
    /// 从 start 起消耗 minutes 分钟工作时间后的时刻
    fn add_working_minutes(
        &self,
        start: NaiveDateTime,
        minutes: f64,
        resource: &str,
    ) -> CalendarResult<NaiveDateTime>;

    /// start 与 end 之间的工作日数（end 早于 start 时为负）
    fn working_days_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        resource: &str,
    ) -> CalendarResult<f64>;
}
