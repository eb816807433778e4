// ==========================================
// DBR 约束排产引擎 - 排产参数
// ==========================================
// 原为硬编码常量（缓冲系数 2 / 分档阈值 0-33-66-100 / "EP-" 前缀），
// 现统一为具名配置，缺省值保持不变
// ==========================================

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// 默认缓冲系数（每道工序占用的缓冲天数）
pub const DEFAULT_BUFFER_FACTOR: f64 = 2.0;

/// 默认目标类型前缀
pub const DEFAULT_TARGET_TYPE_PREFIX: &str = "EP-";

// ==========================================
// PrioThresholds - 紧急度分档阈值
// ==========================================
// 下界包含: rbc < gray_below → gray; < green_below → green; ...; 其余 expedite
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrioThresholds {
    pub gray_below: f64,
    pub green_below: f64,
    pub yellow_below: f64,
    pub red_below: f64,
}

impl Default for PrioThresholds {
    fn default() -> Self {
        Self {
            gray_below: 0.0,
            green_below: 33.0,
            yellow_below: 66.0,
            red_below: 100.0,
        }
    }
}

impl PrioThresholds {
    /// 阈值必须严格递增
    pub fn validate(&self) -> Result<(), String> {
        let values = [
            self.gray_below,
            self.green_below,
            self.yellow_below,
            self.red_below,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err("紧急度阈值必须为有限数值".to_string());
        }
        if values.windows(2).any(|w| w[0] >= w[1]) {
            return Err(format!(
                "紧急度阈值必须严格递增: {} < {} < {} < {}",
                self.gray_below, self.green_below, self.yellow_below, self.red_below
            ));
        }
        Ok(())
    }
}

// ==========================================
// CalendarSettings - 日历计算参数
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalendarSettings {
    pub shift_start: NaiveTime,      // 班次开始时间
    pub default_working_hours: i64,  // 日历行未填工时时的默认班长
    pub horizon_days: i64,           // 日期推算的最大扫描天数
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            shift_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            default_working_hours: 8,
            horizon_days: 3660,
        }
    }
}

// ==========================================
// SchedulingConfig - 排产配置聚合
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingConfig {
    pub buffer_factor: f64,
    pub prio_thresholds: PrioThresholds,
    pub target_type_prefix: String,
    pub calendar: CalendarSettings,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            buffer_factor: DEFAULT_BUFFER_FACTOR,
            prio_thresholds: PrioThresholds::default(),
            target_type_prefix: DEFAULT_TARGET_TYPE_PREFIX.to_string(),
            calendar: CalendarSettings::default(),
        }
    }
}

impl SchedulingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.buffer_factor.is_finite() || self.buffer_factor <= 0.0 {
            return Err(format!("buffer_factor 必须大于 0: {}", self.buffer_factor));
        }
        if self.calendar.default_working_hours < 0 || self.calendar.default_working_hours > 24 {
            return Err(format!(
                "default_working_hours 超出范围 [0, 24]: {}",
                self.calendar.default_working_hours
            ));
        }
        if self.calendar.horizon_days <= 0 {
            return Err(format!(
                "horizon_days 必须大于 0: {}",
                self.calendar.horizon_days
            ));
        }
        self.prio_thresholds.validate()
    }
}
