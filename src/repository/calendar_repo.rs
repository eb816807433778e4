// ==========================================
// DBR 约束排产引擎 - 资源日历仓储
// ==========================================
// 表: resource_calendar (resource + dates 主键)
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::resource::CalendarDay;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Result as SqliteResult, Row, TransactionBehavior};
use std::sync::{Arc, Mutex};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// 资源日历仓储
pub struct ResourceCalendarRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ResourceCalendarRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row<'_>) -> SqliteResult<CalendarDay> {
        let date_str: String = row.get(1)?;
        let date = NaiveDate::parse_from_str(&date_str, DATE_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let is_off: i64 = row.get(3)?;
        let is_customised: i64 = row.get(4)?;
        Ok(CalendarDay {
            resource: row.get(0)?,
            date,
            working_hours: row.get(2)?,
            is_off: is_off != 0,
            is_customised: is_customised != 0,
        })
    }

    /// 查询全部日历行（加载日历快照使用）
    pub fn list_all(&self) -> RepositoryResult<Vec<CalendarDay>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT resource, dates, working_hours, is_off, is_customised \
             FROM resource_calendar ORDER BY resource, dates",
        )?;
        let days = stmt
            .query_map([], Self::map_row)?
            .collect::<SqliteResult<Vec<CalendarDay>>>()?;
        Ok(days)
    }

    /// 按资源和日期范围查询（闭区间）
    pub fn find_by_range(
        &self,
        resource: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<CalendarDay>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT resource, dates, working_hours, is_off, is_customised \
             FROM resource_calendar \
             WHERE resource = ?1 AND dates BETWEEN ?2 AND ?3 \
             ORDER BY dates",
        )?;
        let days = stmt
            .query_map(
                params![
                    resource,
                    from.format(DATE_FORMAT).to_string(),
                    to.format(DATE_FORMAT).to_string()
                ],
                Self::map_row,
            )?
            .collect::<SqliteResult<Vec<CalendarDay>>>()?;
        Ok(days)
    }

    /// 批量插入或更新日历行（写入前统一 is_off / working_hours）
    pub fn upsert_batch(&self, days: Vec<CalendarDay>) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut count = 0;
        for day in days.into_iter().map(CalendarDay::normalized) {
            count += tx.execute(
                r#"
                INSERT OR REPLACE INTO resource_calendar
                    (resource, dates, working_hours, is_off, is_customised)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    day.resource,
                    day.date.format(DATE_FORMAT).to_string(),
                    day.working_hours,
                    day.is_off,
                    day.is_customised
                ],
            )?;
        }

        tx.commit()?;
        Ok(count)
    }
}
