// ==========================================
// DBR 约束排产引擎 - 排产资源仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::resource::ScheduledResource;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};

// ==========================================
// ScheduledResourceRepository - 资源组仓储
// ==========================================

/// 资源组仓储
/// 职责: 管理 scheduled_resource 表的读取与写入
pub struct ScheduledResourceRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ScheduledResourceRepository {
    /// 创建新的资源组仓储实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 查询全部资源组（按 resource_group 排序）
    pub fn list_all(&self) -> RepositoryResult<Vec<ScheduledResource>> {
        self.query(
            "SELECT resource_group, is_constraint, capacity FROM scheduled_resource \
             ORDER BY resource_group",
        )
    }

    /// 查询瓶颈资源组（按 resource_group 排序，保证排产顺序可复现）
    pub fn list_constraints(&self) -> RepositoryResult<Vec<ScheduledResource>> {
        self.query(
            "SELECT resource_group, is_constraint, capacity FROM scheduled_resource \
             WHERE is_constraint = 1 ORDER BY resource_group",
        )
    }

    fn query(&self, sql: &str) -> RepositoryResult<Vec<ScheduledResource>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map([], |row| {
                let is_constraint: i64 = row.get(1)?;
                Ok(ScheduledResource {
                    resource_group: row.get(0)?,
                    is_constraint: is_constraint != 0,
                    capacity: row.get(2)?,
                })
            })?
            .collect::<SqliteResult<Vec<ScheduledResource>>>()?;
        Ok(rows)
    }

    /// 插入或更新资源组
    pub fn upsert(&self, resource: &ScheduledResource) -> RepositoryResult<()> {
        if resource.resource_group.trim().is_empty() {
            return Err(RepositoryError::ValidationError(
                "resource_group 不能为空".to_string(),
            ));
        }

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO scheduled_resource (resource_group, is_constraint, capacity)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(resource_group) DO UPDATE SET
                is_constraint = excluded.is_constraint,
                capacity = excluded.capacity
            "#,
            params![
                resource.resource_group,
                resource.is_constraint,
                resource.capacity
            ],
        )?;
        Ok(())
    }
}
