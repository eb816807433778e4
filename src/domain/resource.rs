// ==========================================
// DBR 约束排产引擎 - 资源与日历领域模型
// ==========================================
// ScheduledResource: 资源组主数据（is_constraint 标记瓶颈/鼓）
// CalendarDay:       资源 × 日期 的工作时长 / 休息日
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ==========================================
// ScheduledResource - 排产资源组
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledResource {
    pub resource_group: String, // 主键
    pub is_constraint: bool,    // 是否为瓶颈（鼓）
    pub capacity: Option<i64>,  // 仅展示，不参与计算
}

impl ScheduledResource {
    pub fn new(resource_group: impl Into<String>, is_constraint: bool) -> Self {
        Self {
            resource_group: resource_group.into(),
            is_constraint,
            capacity: None,
        }
    }
}

// ==========================================
// CalendarDay - 资源日历行
// ==========================================
// 规则: working_hours == 0 ⇒ is_off；is_off ⇒ working_hours = 0
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarDay {
    pub resource: String,
    pub date: NaiveDate,
    pub working_hours: Option<i64>, // None 表示沿用默认班长
    pub is_off: bool,
    pub is_customised: bool,
}

impl CalendarDay {
    /// 创建工作日（hours = 0 时自动视为休息日）
    pub fn working(resource: impl Into<String>, date: NaiveDate, hours: i64) -> Self {
        Self {
            resource: resource.into(),
            date,
            working_hours: Some(hours.max(0)),
            is_off: hours <= 0,
            is_customised: false,
        }
        .normalized()
    }

    /// 创建休息日
    pub fn off(resource: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            resource: resource.into(),
            date,
            working_hours: Some(0),
            is_off: true,
            is_customised: false,
        }
    }

    /// 人工修改工作时长（标记 is_customised）
    pub fn with_capacity(mut self, hours: i64) -> Self {
        self.working_hours = Some(hours.max(0));
        self.is_off = hours <= 0;
        self.is_customised = true;
        self
    }

    /// 统一 is_off / working_hours 的一致性
    pub fn normalized(mut self) -> Self {
        if self.working_hours == Some(0) {
            self.is_off = true;
        }
        if self.is_off {
            self.working_hours = Some(0);
        }
        self
    }

    /// 当日有效工作时长（小时）
    pub fn effective_hours(&self, default_hours: i64) -> i64 {
        if self.is_off {
            return 0;
        }
        self.working_hours.unwrap_or(default_hours).max(0)
    }
}
