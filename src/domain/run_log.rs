// ==========================================
// DBR 约束排产引擎 - 排产运行日志
// ==========================================
// 每次全量排产 / 重置都记录一条，便于追溯失败阶段
// ==========================================

use crate::domain::types::RunStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRunLog {
    pub run_id: String,
    pub run_kind: String, // FULL_PASS / RESET
    pub status: RunStatus,
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub failed_stage: Option<String>,
    pub rows_processed: i64,
    pub message: Option<String>,
    pub config_snapshot_json: Option<String>,
}
