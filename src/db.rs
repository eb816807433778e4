// ==========================================
// DBR 约束排产引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 提供建表脚本（工序表 / 备份表 / 资源 / 日历 / 配置 / 运行日志）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 工序表列定义（order_step 与 order_step_bak 共用，保证可整表复制）
const ORDER_STEP_COLUMNS_DDL: &str = r#"
    production_order_nr TEXT NOT NULL,
    work_step_nr TEXT NOT NULL,
    resource TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0,
    worksteps_to_go INTEGER NOT NULL DEFAULT 0,
    production_time REAL NOT NULL DEFAULT 0,
    target_buffer_size REAL,
    remaining_target_buffer_size REAL,
    target_rbc REAL,
    prio TEXT,
    running_sum_production_time REAL,
    expected_start_time_min REAL,
    start_date_assumption TEXT,
    end_date_assumption TEXT,
    target_date TEXT,
    target_type TEXT,
    is_excluded INTEGER NOT NULL DEFAULT 0,
    customized_target_date INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (production_order_nr, work_step_nr)
"#;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 建表（幂等）
///
/// 说明：所有表均使用 IF NOT EXISTS，可在已有库上重复执行。
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS order_step ({cols});
        CREATE TABLE IF NOT EXISTS order_step_bak ({cols});

        CREATE INDEX IF NOT EXISTS idx_order_step_resource ON order_step(resource);

        CREATE TABLE IF NOT EXISTS scheduled_resource (
            resource_group TEXT PRIMARY KEY,
            is_constraint INTEGER NOT NULL DEFAULT 0,
            capacity INTEGER
        );

        CREATE TABLE IF NOT EXISTS resource_calendar (
            resource TEXT NOT NULL REFERENCES scheduled_resource(resource_group) ON DELETE CASCADE,
            dates TEXT NOT NULL,
            working_hours INTEGER,
            is_off INTEGER NOT NULL DEFAULT 0,
            is_customised INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (resource, dates)
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS schedule_run_log (
            run_id TEXT PRIMARY KEY,
            run_kind TEXT NOT NULL,
            status TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            failed_stage TEXT,
            rows_processed INTEGER NOT NULL DEFAULT 0,
            message TEXT,
            config_snapshot_json TEXT
        );

        INSERT OR IGNORE INTO schema_version (version) VALUES ({version});
        "#,
        cols = ORDER_STEP_COLUMNS_DDL,
        version = CURRENT_SCHEMA_VERSION,
    ))
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
