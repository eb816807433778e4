// ==========================================
// DBR 约束排产引擎 - 排产运行日志仓储
// ==========================================
// 表: schedule_run_log
// 说明: 只追加，不修改历史记录
// ==========================================

use crate::domain::run_log::ScheduleRunLog;
use crate::domain::types::RunStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};

pub struct ScheduleRunLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ScheduleRunLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn insert(&self, log: &ScheduleRunLog) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO schedule_run_log (
                run_id, run_kind, status, started_at, finished_at,
                failed_stage, rows_processed, message, config_snapshot_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                log.run_id,
                log.run_kind,
                log.status.as_str(),
                log.started_at,
                log.finished_at,
                log.failed_stage,
                log.rows_processed,
                log.message,
                log.config_snapshot_json,
            ],
        )?;
        Ok(())
    }

    /// 最近的运行记录（按开始时间倒序）
    pub fn list_recent(&self, limit: usize) -> RepositoryResult<Vec<ScheduleRunLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT run_id, run_kind, status, started_at, finished_at,
                   failed_stage, rows_processed, message, config_snapshot_json
            FROM schedule_run_log
            ORDER BY started_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )?;

        let logs = stmt
            .query_map(params![limit as i64], |row| {
                let status: String = row.get(2)?;
                Ok(ScheduleRunLog {
                    run_id: row.get(0)?,
                    run_kind: row.get(1)?,
                    status: RunStatus::from_str(&status),
                    started_at: row.get(3)?,
                    finished_at: row.get(4)?,
                    failed_stage: row.get(5)?,
                    rows_processed: row.get(6)?,
                    message: row.get(7)?,
                    config_snapshot_json: row.get(8)?,
                })
            })?
            .collect::<SqliteResult<Vec<ScheduleRunLog>>>()?;

        Ok(logs)
    }
}
