// ==========================================
// DBR 约束排产引擎 - 工序仓储 Trait
// ==========================================
// 职责: 定义工序表的数据访问接口（不包含业务逻辑）
// 红线: 批量更新只接受结构化命令（过滤条件 + 字段赋值），
//       不接受拼接好的 SQL 文本
// ==========================================

use crate::domain::order_step::OrderStep;
use crate::domain::types::PrioTag;
use crate::repository::error::RepositoryResult;
use chrono::NaiveDateTime;

// ==========================================
// StepFilter - 批量更新的行过滤条件
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum StepFilter {
    /// 全部行
    All,
    /// 指定生产订单的全部工序
    Order(String),
    /// 指定资源组的全部工序
    Resource(String),
    /// 单行
    Step {
        production_order_nr: String,
        work_step_nr: String,
    },
}

impl StepFilter {
    /// 单行过滤（取工序主键）
    pub fn for_step(step: &OrderStep) -> Self {
        StepFilter::Step {
            production_order_nr: step.production_order_nr.clone(),
            work_step_nr: step.work_step_nr.clone(),
        }
    }
}

// ==========================================
// FieldAssignment - 派生字段赋值
// ==========================================
// 只开放派生字段与人工目标日期；外部输入字段（资源 / 优先级 / 工时）不可经此修改
#[derive(Debug, Clone, PartialEq)]
pub enum FieldAssignment {
    IsExcluded(bool),
    TargetBufferSize(Option<f64>),
    RemainingTargetBufferSize(Option<f64>),
    TargetRbc(Option<f64>),
    Prio(Option<PrioTag>),
    RunningSumProductionTime(Option<f64>),
    ExpectedStartTimeMin(Option<f64>),
    StartDateAssumption(Option<NaiveDateTime>),
    EndDateAssumption(Option<NaiveDateTime>),
    TargetDate(Option<NaiveDateTime>),
    TargetType(Option<String>),
    CustomizedTargetDate(bool),
}

impl FieldAssignment {
    /// 对应的列名（固定白名单）
    pub fn column(&self) -> &'static str {
        match self {
            FieldAssignment::IsExcluded(_) => "is_excluded",
            FieldAssignment::TargetBufferSize(_) => "target_buffer_size",
            FieldAssignment::RemainingTargetBufferSize(_) => "remaining_target_buffer_size",
            FieldAssignment::TargetRbc(_) => "target_rbc",
            FieldAssignment::Prio(_) => "prio",
            FieldAssignment::RunningSumProductionTime(_) => "running_sum_production_time",
            FieldAssignment::ExpectedStartTimeMin(_) => "expected_start_time_min",
            FieldAssignment::StartDateAssumption(_) => "start_date_assumption",
            FieldAssignment::EndDateAssumption(_) => "end_date_assumption",
            FieldAssignment::TargetDate(_) => "target_date",
            FieldAssignment::TargetType(_) => "target_type",
            FieldAssignment::CustomizedTargetDate(_) => "customized_target_date",
        }
    }
}

// ==========================================
// StepCommand - 批量更新命令
// ==========================================
// 等价于 UPDATE order_step SET <assignments> WHERE <filter>
#[derive(Debug, Clone, PartialEq)]
pub struct StepCommand {
    pub filter: StepFilter,
    pub assignments: Vec<FieldAssignment>,
}

impl StepCommand {
    pub fn new(filter: StepFilter, assignments: Vec<FieldAssignment>) -> Self {
        Self {
            filter,
            assignments,
        }
    }

    /// 将一行的全部派生字段写回（排产提交使用）
    pub fn write_derived(step: &OrderStep) -> Self {
        Self::new(
            StepFilter::for_step(step),
            vec![
                FieldAssignment::IsExcluded(step.is_excluded),
                FieldAssignment::TargetBufferSize(step.target_buffer_size),
                FieldAssignment::RemainingTargetBufferSize(step.remaining_target_buffer_size),
                FieldAssignment::TargetRbc(step.target_rbc),
                FieldAssignment::Prio(step.prio),
                FieldAssignment::RunningSumProductionTime(step.running_sum_production_time),
                FieldAssignment::ExpectedStartTimeMin(step.expected_start_time_min),
                FieldAssignment::StartDateAssumption(step.start_date_assumption),
                FieldAssignment::EndDateAssumption(step.end_date_assumption),
                FieldAssignment::TargetDate(step.target_date),
                FieldAssignment::TargetType(step.target_type.clone()),
            ],
        )
    }

    /// 人工指定整单目标日期（None 表示撤销，同时清除人工标记）
    pub fn override_target_date(production_order_nr: &str, target_date: Option<NaiveDateTime>) -> Self {
        Self::new(
            StepFilter::Order(production_order_nr.to_string()),
            vec![
                FieldAssignment::TargetDate(target_date),
                FieldAssignment::CustomizedTargetDate(target_date.is_some()),
            ],
        )
    }
}

// ==========================================
// StepUnitOfWork - 排产工作单元
// ==========================================
// 以写锁开启的事务（SQLite: BEGIN IMMEDIATE）
// 读取、各阶段计算与提交共用同一事务；其他连接的写入在提交前排队等待
// 未调用 commit 即释放时回滚
pub trait StepUnitOfWork {
    /// 读取全部工序（事务内快照）
    fn read_all(&mut self) -> RepositoryResult<Vec<OrderStep>>;

    /// 瓶颈资源组（按 resource_group 排序）
    fn constraint_resources(&mut self) -> RepositoryResult<Vec<String>>;

    /// 在事务内执行批量更新
    fn bulk_update(&mut self, commands: &[StepCommand]) -> RepositoryResult<usize>;

    /// 提交事务
    fn commit(self: Box<Self>) -> RepositoryResult<()>;
}

// ==========================================
// OrderStepRepository Trait
// ==========================================
// 实现者: OrderStepRepositoryImpl（使用 rusqlite）
pub trait OrderStepRepository: Send + Sync {
    /// 读取全部工序（按订单号、工步号排序）
    fn read_all(&self) -> RepositoryResult<Vec<OrderStep>>;

    /// 开启排产工作单元（阻塞直到拿到数据库写锁或超时）
    fn begin_pass(&self) -> RepositoryResult<Box<dyn StepUnitOfWork + '_>>;

    /// 批量更新
    ///
    /// # 返回
    /// - Ok(usize): 受影响的总行数
    /// - Err: 数据库错误（整批回滚）
    fn bulk_update(&self, commands: &[StepCommand]) -> RepositoryResult<usize>;

    /// 从备份表整表恢复（先清空再复制，非合并），并清除 is_excluded
    fn replace_all_from_backup(&self) -> RepositoryResult<usize>;

    /// 将当前工序整表复制到备份表（覆盖原备份）
    fn snapshot_to_backup(&self) -> RepositoryResult<usize>;

    /// 插入或替换工序（导入工具 / 测试夹具使用）
    fn upsert_steps(&self, steps: &[OrderStep]) -> RepositoryResult<usize>;
}
