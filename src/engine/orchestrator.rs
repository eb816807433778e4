// ==========================================
// DBR 约束排产引擎 - 排产编排器
// ==========================================
// 状态机:
//   Idle → Resetting → DetectingConflicts → RecalculatingBuffers(1)
//   → Scheduling(逐个瓶颈资源: 鼓 → 绳) → RecalculatingBuffers(2)
//   → Classifying → Committing → Done
//   任意阶段失败 → Failed
// 约束:
// - 整个流程在同一个工作单元（BEGIN IMMEDIATE 事务）内执行:
//   读取、瓶颈清单、各阶段计算与 Committing 写回共用一个事务
//   其他连接的写入排队到提交之后；失败 / 取消时回滚，数据库保持原状
// - 运行锁保证同一时刻只有一个流程在执行（后来者排队等待）
// - 取消标志只在阶段之间检查
// ==========================================

use crate::calendar::CalendarOracle;
use crate::config::scheduling_config::SchedulingConfig;
use crate::domain::order_step::OrderStep;
use crate::domain::types::{PassStage, PrioTag};
use crate::engine::buffer::{BufferRecalculator, BufferStats};
use crate::engine::classifier::PriorityClassifier;
use crate::engine::conflict::{ConflictDetector, ConflictReport};
use crate::engine::drum::DrumScheduler;
use crate::engine::error::{PassError, PassErrorKind};
use crate::engine::repositories::SchedulingRepositories;
use crate::engine::rope::RopePropagator;
use crate::domain::order_step::TargetDateOverride;
use crate::repository::{RepositoryError, RepositoryResult, StepCommand};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

// ==========================================
// PassReport - 全量排产结果
// ==========================================
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    pub now: Option<NaiveDateTime>,
    pub rows_read: usize,
    pub conflicts: ConflictReport,
    pub constraints: Vec<String>, // 按 resource_group 排序
    pub scheduled_per_resource: BTreeMap<String, usize>,
    pub rope_updates: usize,
    pub first_buffer: BufferStats,
    pub second_buffer: BufferStats,
    pub prio_histogram: BTreeMap<PrioTag, usize>,
    pub anomalies: usize,
    pub rows_processed: usize,
    pub rows_committed: usize,
    pub elapsed_ms: i64,
}

/// 流程进度（失败时用于定位阶段）
#[derive(Debug)]
struct PassProgress {
    stage: PassStage,
    rows_processed: usize,
}

// ==========================================
// SchedulingOrchestrator - 排产编排器
// ==========================================
pub struct SchedulingOrchestrator {
    repos: SchedulingRepositories,
    run_lock: Mutex<()>,
    cancel_requested: AtomicBool,
    current_stage: Mutex<PassStage>,
}

impl SchedulingOrchestrator {
    /// 创建编排器
    ///
    /// # 参数
    /// - repos: 工序仓储
    pub fn new(repos: SchedulingRepositories) -> Self {
        Self {
            repos,
            run_lock: Mutex::new(()),
            cancel_requested: AtomicBool::new(false),
            current_stage: Mutex::new(PassStage::Idle),
        }
    }

    /// 请求取消（作用于正在执行的流程；空闲时作用于下一次流程）
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    /// 当前阶段（流程结束后为 Done / Failed）
    pub fn current_stage(&self) -> PassStage {
        self.current_stage
            .lock()
            .map(|stage| stage.clone())
            .unwrap_or(PassStage::Failed)
    }

    fn enter(&self, progress: &mut PassProgress, stage: PassStage) {
        debug!(stage = %stage, "进入阶段");
        if let Ok(mut current) = self.current_stage.lock() {
            *current = stage.clone();
        }
        progress.stage = stage;
    }

    fn ensure_not_cancelled(&self) -> Result<(), PassErrorKind> {
        if self.cancel_requested.load(Ordering::SeqCst) {
            return Err(PassErrorKind::Cancelled);
        }
        Ok(())
    }

    // ==========================================
    // 全量排产
    // ==========================================

    /// 执行一次全量排产
    ///
    /// # 参数
    /// - now: 排产基准时刻
    /// - calendar: 工作日历
    /// - config: 排产参数
    ///
    /// # 返回
    /// - Ok(PassReport): 已提交
    /// - Err(PassError): 失败阶段 + 已处理行数；数据库未改写
    #[instrument(skip_all, fields(now = %now))]
    pub fn run_full_pass(
        &self,
        now: NaiveDateTime,
        calendar: &dyn CalendarOracle,
        config: &SchedulingConfig,
    ) -> Result<PassReport, PassError> {
        let _guard = self.run_lock.lock().map_err(|e| {
            PassError::new(PassStage::Idle.name(), 0, PassErrorKind::Lock(e.to_string()))
        })?;

        let started = Instant::now();
        let mut progress = PassProgress {
            stage: PassStage::Idle,
            rows_processed: 0,
        };

        info!("开始执行全量排产");
        let result = self.execute_pass(now, calendar, config, &mut progress);
        self.cancel_requested.store(false, Ordering::SeqCst);

        match result {
            Ok(mut report) => {
                report.elapsed_ms = started.elapsed().as_millis() as i64;
                self.enter(&mut progress, PassStage::Done);
                info!(
                    rows_committed = report.rows_committed,
                    conflicts = report.conflicts.excluded_orders.len(),
                    anomalies = report.anomalies,
                    elapsed_ms = report.elapsed_ms,
                    "全量排产完成"
                );
                Ok(report)
            }
            Err(kind) => {
                let err = PassError::new(progress.stage.name(), progress.rows_processed, kind);
                self.enter(&mut progress, PassStage::Failed);
                if err.is_cancelled() {
                    warn!(stage = %err.stage, "全量排产已取消，未提交任何改写");
                } else {
                    error!(error = %err, "全量排产失败，未提交任何改写");
                }
                Err(err)
            }
        }
    }

    fn execute_pass(
        &self,
        now: NaiveDateTime,
        calendar: &dyn CalendarOracle,
        config: &SchedulingConfig,
        progress: &mut PassProgress,
    ) -> Result<PassReport, PassErrorKind> {
        let mut report = PassReport {
            now: Some(now),
            ..PassReport::default()
        };

        // ==========================================
        // 步骤1: 开启工作单元，读取快照并清除排除标记
        // ==========================================
        // unit 在本函数任何提前返回时被 drop → 回滚
        self.enter(progress, PassStage::Resetting);
        let mut unit = self.repos.order_step_repo.begin_pass()?;
        let mut steps: Vec<OrderStep> = unit.read_all()?;
        for step in steps.iter_mut() {
            step.is_excluded = false;
        }
        report.rows_read = steps.len();
        progress.rows_processed += steps.len();
        debug!("步骤1: 读取工序 {} 行", steps.len());
        self.ensure_not_cancelled()?;

        // ==========================================
        // 步骤2: 多瓶颈冲突检测
        // ==========================================
        self.enter(progress, PassStage::DetectingConflicts);
        let constraints: Vec<String> = unit.constraint_resources()?;
        let constraint_set: HashSet<String> = constraints.iter().cloned().collect();
        report.conflicts = ConflictDetector::new().detect(&mut steps, &constraint_set);
        report.constraints = constraints.clone();
        progress.rows_processed += steps.len();
        debug!(
            "步骤2: 瓶颈资源 {} 个，冲突订单 {} 个",
            constraints.len(),
            report.conflicts.excluded_orders.len()
        );
        self.ensure_not_cancelled()?;

        // ==========================================
        // 步骤3: 缓冲重算（第一轮）
        // ==========================================
        let buffer = BufferRecalculator::new(config.buffer_factor);
        self.enter(progress, PassStage::RecalculatingBuffers { round: 1 });
        report.first_buffer = buffer.recalculate(&mut steps, now, calendar)?;
        progress.rows_processed += report.first_buffer.rows_updated;
        debug!("步骤3: 第一轮缓冲重算 {} 行", report.first_buffer.rows_updated);
        self.ensure_not_cancelled()?;

        // ==========================================
        // 步骤4: 逐个瓶颈资源 鼓 → 绳
        // ==========================================
        let drum = DrumScheduler::new();
        let rope = RopePropagator::new(config.target_type_prefix.clone());
        for resource in &constraints {
            self.enter(
                progress,
                PassStage::Scheduling {
                    resource: resource.clone(),
                },
            );
            let scheduled = drum.schedule(&mut steps, resource, now, calendar)?;
            let propagated = rope.propagate(&mut steps, resource);

            report
                .scheduled_per_resource
                .insert(resource.clone(), scheduled);
            report.rope_updates += propagated;
            progress.rows_processed += scheduled + propagated;
            debug!(
                "步骤4: 资源 {} 排入 {} 行，下推 {} 行",
                resource, scheduled, propagated
            );
            self.ensure_not_cancelled()?;
        }

        // ==========================================
        // 步骤5: 缓冲重算（第二轮，使用下推后的 target_date）
        // ==========================================
        self.enter(progress, PassStage::RecalculatingBuffers { round: 2 });
        report.second_buffer = buffer.recalculate(&mut steps, now, calendar)?;
        progress.rows_processed += report.second_buffer.rows_updated;
        report.anomalies = report.second_buffer.anomalies;
        if report.anomalies > 0 {
            warn!(anomalies = report.anomalies, "存在缓冲数据异常");
        }
        self.ensure_not_cancelled()?;

        // ==========================================
        // 步骤6: 紧急度分档
        // ==========================================
        self.enter(progress, PassStage::Classifying);
        report.prio_histogram = PriorityClassifier::new(config.prio_thresholds).classify(&mut steps);
        progress.rows_processed += steps.iter().filter(|s| !s.is_excluded).count();
        self.ensure_not_cancelled()?;

        // ==========================================
        // 步骤7: 写回并提交工作单元
        // ==========================================
        self.enter(progress, PassStage::Committing);
        let commands: Vec<StepCommand> = steps.iter().map(StepCommand::write_derived).collect();
        report.rows_committed = unit.bulk_update(&commands)?;
        unit.commit()?;
        progress.rows_processed += report.rows_committed;
        report.rows_processed = progress.rows_processed;

        Ok(report)
    }

    // ==========================================
    // 人工目标日期
    // ==========================================

    /// 按订单改写人工目标日期（与全量排产互斥）
    ///
    /// # 参数
    /// - overrides: 订单号 + 目标日期；None 撤销人工指定
    ///
    /// # 返回
    /// 受影响的工序行数
    #[instrument(skip_all, fields(orders = overrides.len()))]
    pub fn apply_target_date_overrides(
        &self,
        overrides: &[TargetDateOverride],
    ) -> RepositoryResult<usize> {
        let _guard = self
            .run_lock
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        let commands: Vec<StepCommand> = overrides
            .iter()
            .map(|o| StepCommand::override_target_date(&o.production_order_nr, o.target_date))
            .collect();

        let affected = self.repos.order_step_repo.bulk_update(&commands)?;
        info!(affected = affected, "人工目标日期已写入");
        Ok(affected)
    }

    // ==========================================
    // 备份恢复
    // ==========================================

    /// 从备份表整表恢复工序（与全量排产互斥）
    ///
    /// # 返回
    /// 恢复的行数
    #[instrument(skip(self))]
    pub fn reset_to_backup(&self) -> Result<usize, PassError> {
        let _guard = self.run_lock.lock().map_err(|e| {
            PassError::new(PassStage::Idle.name(), 0, PassErrorKind::Lock(e.to_string()))
        })?;

        let mut progress = PassProgress {
            stage: PassStage::Idle,
            rows_processed: 0,
        };
        self.enter(&mut progress, PassStage::Resetting);

        match self.repos.order_step_repo.replace_all_from_backup() {
            Ok(restored) => {
                self.enter(&mut progress, PassStage::Done);
                info!(restored = restored, "已从备份恢复工序表");
                Ok(restored)
            }
            Err(e) => {
                let err = PassError::new(progress.stage.name(), 0, e);
                self.enter(&mut progress, PassStage::Failed);
                error!(error = %err, "备份恢复失败");
                Err(err)
            }
        }
    }
}
