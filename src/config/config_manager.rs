// ==========================================
// DBR 约束排产引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::scheduling_config::{CalendarSettings, PrioThresholds, SchedulingConfig};
use crate::db::open_sqlite_connection;
use chrono::NaiveTime;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取并解析配置；缺失或格式错误时回落默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> Result<T, Box<dyn Error>>
    where
        T: FromStr + Copy + std::fmt::Display,
    {
        let raw = match self.get_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };

        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %raw,
                    default = %default,
                    "配置格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 每次排产运行时记录配置快照，便于追溯
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }

    // ===== 排产配置 =====

    /// 加载排产配置（缺省项使用默认值，加载后整体校验）
    pub fn load_scheduling_config(&self) -> Result<SchedulingConfig, Box<dyn Error>> {
        let defaults = SchedulingConfig::default();

        let prio_thresholds = PrioThresholds {
            gray_below: self.get_parsed_or_default(
                config_keys::PRIO_GRAY_BELOW,
                defaults.prio_thresholds.gray_below,
            )?,
            green_below: self.get_parsed_or_default(
                config_keys::PRIO_GREEN_BELOW,
                defaults.prio_thresholds.green_below,
            )?,
            yellow_below: self.get_parsed_or_default(
                config_keys::PRIO_YELLOW_BELOW,
                defaults.prio_thresholds.yellow_below,
            )?,
            red_below: self.get_parsed_or_default(
                config_keys::PRIO_RED_BELOW,
                defaults.prio_thresholds.red_below,
            )?,
        };

        let shift_start = match self.get_config_value(config_keys::CALENDAR_SHIFT_START)? {
            Some(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M").unwrap_or_else(|_| {
                tracing::warn!(
                    config_key = config_keys::CALENDAR_SHIFT_START,
                    raw_value = %raw,
                    "班次开始时间格式错误（应为 HH:MM），使用默认值"
                );
                defaults.calendar.shift_start
            }),
            None => defaults.calendar.shift_start,
        };

        let calendar = CalendarSettings {
            shift_start,
            default_working_hours: self.get_parsed_or_default(
                config_keys::CALENDAR_DEFAULT_WORKING_HOURS,
                defaults.calendar.default_working_hours,
            )?,
            horizon_days: self.get_parsed_or_default(
                config_keys::CALENDAR_HORIZON_DAYS,
                defaults.calendar.horizon_days,
            )?,
        };

        let target_type_prefix = self
            .get_config_value(config_keys::TARGET_TYPE_PREFIX)?
            .unwrap_or(defaults.target_type_prefix);

        let config = SchedulingConfig {
            buffer_factor: self
                .get_parsed_or_default(config_keys::BUFFER_FACTOR, defaults.buffer_factor)?,
            prio_thresholds,
            target_type_prefix,
            calendar,
        };

        config.validate()?;
        Ok(config)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 缓冲
    pub const BUFFER_FACTOR: &str = "dbr.buffer_factor";

    // 紧急度分档
    pub const PRIO_GRAY_BELOW: &str = "dbr.prio.gray_below";
    pub const PRIO_GREEN_BELOW: &str = "dbr.prio.green_below";
    pub const PRIO_YELLOW_BELOW: &str = "dbr.prio.yellow_below";
    pub const PRIO_RED_BELOW: &str = "dbr.prio.red_below";

    // 绳
    pub const TARGET_TYPE_PREFIX: &str = "dbr.target_type_prefix";

    // 日历
    pub const CALENDAR_SHIFT_START: &str = "calendar.shift_start"; // HH:MM
    pub const CALENDAR_DEFAULT_WORKING_HOURS: &str = "calendar.default_working_hours";
    pub const CALENDAR_HORIZON_DAYS: &str = "calendar.horizon_days";
}
