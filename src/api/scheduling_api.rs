// ==========================================
// DBR 约束排产引擎 - 排产触发 API
// ==========================================
// 职责: 全量排产 / 人工目标日期 / 备份恢复 / 冲突查询 / 运行日志
// 说明: 每次排产前重新加载配置与日历，运行结果写入 schedule_run_log
// ==========================================

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDateTime};
use rusqlite::Connection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::calendar::TableCalendar;
use crate::config::{ConfigManager, SchedulingConfig};
use crate::db::{
    configure_sqlite_connection, init_schema, open_sqlite_connection, read_schema_version,
    CURRENT_SCHEMA_VERSION,
};
use crate::domain::order_step::TargetDateOverride;
use crate::domain::run_log::ScheduleRunLog;
use crate::domain::types::RunStatus;
use crate::engine::{
    ConflictDetector, ConflictReport, PassError, PassReport, SchedulingOrchestrator,
    SchedulingRepositories,
};
use crate::repository::{
    OrderStepRepository, OrderStepRepositoryImpl, ResourceCalendarRepository,
    ScheduleRunLogRepository, ScheduledResourceRepository,
};

const RUN_KIND_FULL_PASS: &str = "FULL_PASS";
const RUN_KIND_RESET: &str = "RESET";

// ==========================================
// SchedulingApi - 排产触发 API
// ==========================================
pub struct SchedulingApi {
    orchestrator: Arc<SchedulingOrchestrator>,
    order_step_repo: Arc<dyn OrderStepRepository>,
    resource_repo: Arc<ScheduledResourceRepository>,
    calendar_repo: Arc<ResourceCalendarRepository>,
    run_log_repo: Arc<ScheduleRunLogRepository>,
    config_manager: Arc<ConfigManager>,
}

impl SchedulingApi {
    /// 打开数据库并创建 API（自动建表）
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn open(db_path: &str) -> ApiResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
        Self::from_connection(Arc::new(Mutex::new(conn)))
    }

    /// 从已有连接创建 API（自动建表，幂等）
    ///
    /// # 返回
    /// - Err(ApiError::SchemaVersionUnsupported): 库由更新版本的程序创建
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ApiResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| ApiError::DatabaseConnectionError(format!("锁获取失败: {}", e)))?;
            configure_sqlite_connection(&guard)
                .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;

            let found = read_schema_version(&guard)
                .map_err(|e| ApiError::DatabaseError(e.to_string()))?;
            if let Some(found) = found.filter(|v| *v > CURRENT_SCHEMA_VERSION) {
                return Err(ApiError::SchemaVersionUnsupported {
                    found,
                    supported: CURRENT_SCHEMA_VERSION,
                });
            }

            init_schema(&guard).map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        }

        let order_step_repo: Arc<dyn OrderStepRepository> =
            Arc::new(OrderStepRepositoryImpl::from_connection(conn.clone()));
        let resource_repo = Arc::new(ScheduledResourceRepository::from_connection(conn.clone()));
        let calendar_repo = Arc::new(ResourceCalendarRepository::from_connection(conn.clone()));
        let run_log_repo = Arc::new(ScheduleRunLogRepository::new(conn.clone()));
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn)
                .map_err(|e| ApiError::ConfigError(e.to_string()))?,
        );

        let orchestrator = Arc::new(SchedulingOrchestrator::new(SchedulingRepositories::new(
            order_step_repo.clone(),
        )));

        Ok(Self {
            orchestrator,
            order_step_repo,
            resource_repo,
            calendar_repo,
            run_log_repo,
            config_manager,
        })
    }

    /// 编排器（取消 / 查询当前阶段）
    pub fn orchestrator(&self) -> &Arc<SchedulingOrchestrator> {
        &self.orchestrator
    }

    pub fn config_manager(&self) -> &Arc<ConfigManager> {
        &self.config_manager
    }

    /// 加载排产配置
    pub fn load_config(&self) -> ApiResult<SchedulingConfig> {
        self.config_manager
            .load_scheduling_config()
            .map_err(|e| ApiError::ConfigError(e.to_string()))
    }

    // ==========================================
    // 全量排产
    // ==========================================

    /// 以当前时刻执行全量排产
    pub fn run_full_pass(&self) -> ApiResult<PassReport> {
        self.run_full_pass_at(Local::now().naive_local())
    }

    /// 以当前时刻执行全量排产，只返回成功与否
    pub fn run_full_pass_ok(&self) -> bool {
        self.run_full_pass().is_ok()
    }

    /// 以指定时刻执行全量排产
    ///
    /// # 返回
    /// - Ok(PassReport): 排产已提交
    /// - Err(ApiError::PassFailed / PassCancelled): 带失败阶段，数据库未改写
    pub fn run_full_pass_at(&self, now: NaiveDateTime) -> ApiResult<PassReport> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Local::now().naive_local();

        let config = self.load_config()?;
        let config_snapshot = match self.config_manager.get_config_snapshot() {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, "配置快照获取失败");
                None
            }
        };
        let calendar = TableCalendar::load(&self.calendar_repo, config.calendar)?;

        info!(run_id = %run_id, now = %now, "触发全量排产");
        let result = self.orchestrator.run_full_pass(now, &calendar, &config);

        let log = match &result {
            Ok(report) => ScheduleRunLog {
                run_id: run_id.clone(),
                run_kind: RUN_KIND_FULL_PASS.to_string(),
                status: RunStatus::Completed,
                started_at,
                finished_at: Local::now().naive_local(),
                failed_stage: None,
                rows_processed: report.rows_processed as i64,
                message: serde_json::to_string(report).ok(),
                config_snapshot_json: config_snapshot,
            },
            Err(err) => Self::failure_log(&run_id, RUN_KIND_FULL_PASS, started_at, err, config_snapshot),
        };
        self.record_run(&log);

        result.map_err(ApiError::from)
    }

    // ==========================================
    // 人工目标日期
    // ==========================================

    /// 按订单写入人工目标日期（下一次全量排产的缓冲 / 分档以此为准）
    ///
    /// # 参数
    /// - overrides: 订单号 + 目标日期；target_date = None 撤销人工指定
    ///
    /// # 返回
    /// 受影响的工序行数
    pub fn update_target_dates(&self, overrides: &[TargetDateOverride]) -> ApiResult<usize> {
        if overrides.is_empty() {
            return Ok(0);
        }
        if let Some(bad) = overrides
            .iter()
            .find(|o| o.production_order_nr.trim().is_empty())
        {
            return Err(ApiError::InvalidInput(format!(
                "production_order_nr 不能为空: {:?}",
                bad
            )));
        }

        let affected = self.orchestrator.apply_target_date_overrides(overrides)?;
        info!(orders = overrides.len(), affected = affected, "人工目标日期已更新");
        Ok(affected)
    }

    // ==========================================
    // 备份恢复
    // ==========================================

    /// 从备份表整表恢复工序
    pub fn reset_to_backup(&self) -> ApiResult<usize> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Local::now().naive_local();

        let result = self.orchestrator.reset_to_backup();

        let log = match &result {
            Ok(restored) => ScheduleRunLog {
                run_id: run_id.clone(),
                run_kind: RUN_KIND_RESET.to_string(),
                status: RunStatus::Completed,
                started_at,
                finished_at: Local::now().naive_local(),
                failed_stage: None,
                rows_processed: *restored as i64,
                message: None,
                config_snapshot_json: None,
            },
            Err(err) => Self::failure_log(&run_id, RUN_KIND_RESET, started_at, err, None),
        };
        self.record_run(&log);

        result.map_err(ApiError::from)
    }

    /// 将当前工序整表复制为备份
    pub fn snapshot_to_backup(&self) -> ApiResult<usize> {
        let copied = self.order_step_repo.snapshot_to_backup()?;
        info!(copied = copied, "工序表已备份");
        Ok(copied)
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 只读查询：经过多个瓶颈资源的订单
    pub fn find_conflicting_orders(&self) -> ApiResult<ConflictReport> {
        let steps = self.order_step_repo.read_all()?;
        let constraints: HashSet<String> = self
            .resource_repo
            .list_constraints()?
            .into_iter()
            .map(|r| r.resource_group)
            .collect();
        Ok(ConflictDetector::new().find(&steps, &constraints))
    }

    /// 最近的运行日志
    pub fn list_run_logs(&self, limit: usize) -> ApiResult<Vec<ScheduleRunLog>> {
        if limit == 0 {
            return Err(ApiError::InvalidInput("limit 必须大于 0".to_string()));
        }
        Ok(self.run_log_repo.list_recent(limit)?)
    }

    // ==========================================
    // 内部方法
    // ==========================================

    fn failure_log(
        run_id: &str,
        run_kind: &str,
        started_at: NaiveDateTime,
        err: &PassError,
        config_snapshot: Option<String>,
    ) -> ScheduleRunLog {
        ScheduleRunLog {
            run_id: run_id.to_string(),
            run_kind: run_kind.to_string(),
            status: if err.is_cancelled() {
                RunStatus::Cancelled
            } else {
                RunStatus::Failed
            },
            started_at,
            finished_at: Local::now().naive_local(),
            failed_stage: Some(err.stage.clone()),
            rows_processed: err.rows_processed as i64,
            message: Some(err.to_string()),
            config_snapshot_json: config_snapshot,
        }
    }

    /// 写运行日志；失败只告警，不影响排产结果
    fn record_run(&self, log: &ScheduleRunLog) {
        if let Err(e) = self.run_log_repo.insert(log) {
            warn!(run_id = %log.run_id, error = %e, "运行日志写入失败");
        }
    }
}
