// ==========================================
// DBR 约束排产引擎 - 工序仓储实现 (SQLite)
// ==========================================
// 红线: Repository 不含业务逻辑
// 约束: 所有语句参数化；列名只来自 FieldAssignment 白名单
// 写事务一律 BEGIN IMMEDIATE，跨连接写入在 busy_timeout 内排队
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::order_step::OrderStep;
use crate::domain::types::PrioTag;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::order_step_repo::{
    FieldAssignment, OrderStepRepository, StepCommand, StepFilter, StepUnitOfWork,
};
use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, Result as SqliteResult, Row, TransactionBehavior,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// 工序表查询列（顺序与 map_row 对应）
const SELECT_COLUMNS: &str = r#"
    production_order_nr, work_step_nr, resource, priority, worksteps_to_go,
    production_time, target_buffer_size, remaining_target_buffer_size, target_rbc,
    prio, running_sum_production_time, expected_start_time_min,
    start_date_assumption, end_date_assumption, target_date, target_type, is_excluded,
    customized_target_date
"#;

/// 时间写入格式（与 rusqlite chrono 读取格式兼容）
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// ==========================================
// OrderStepRepositoryImpl - 工序仓储
// ==========================================
pub struct OrderStepRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl OrderStepRepositoryImpl {
    /// 创建新的工序仓储实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
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

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row<'_>) -> SqliteResult<OrderStep> {
        let prio: Option<String> = row.get(9)?;
        let is_excluded: i64 = row.get(16)?;
        let customized_target_date: i64 = row.get(17)?;
        Ok(OrderStep {
            production_order_nr: row.get(0)?,
            work_step_nr: row.get(1)?,
            resource: row.get(2)?,
            priority: row.get(3)?,
            worksteps_to_go: row.get(4)?,
            production_time: row.get(5)?,
            target_buffer_size: row.get(6)?,
            remaining_target_buffer_size: row.get(7)?,
            target_rbc: row.get(8)?,
            prio: prio.as_deref().and_then(PrioTag::parse),
            running_sum_production_time: row.get(10)?,
            expected_start_time_min: row.get(11)?,
            start_date_assumption: row.get(12)?,
            end_date_assumption: row.get(13)?,
            target_date: row.get(14)?,
            target_type: row.get(15)?,
            is_excluded: is_excluded != 0,
            customized_target_date: customized_target_date != 0,
        })
    }
}

fn datetime_value(v: &Option<NaiveDateTime>) -> Value {
    match v {
        Some(dt) => Value::Text(dt.format(DATETIME_FORMAT).to_string()),
        None => Value::Null,
    }
}

fn real_value(v: &Option<f64>) -> Value {
    match v {
        Some(x) => Value::Real(*x),
        None => Value::Null,
    }
}

fn text_value(v: Option<&str>) -> Value {
    match v {
        Some(s) => Value::Text(s.to_string()),
        None => Value::Null,
    }
}

/// 赋值 → SQL 参数
fn assignment_value(assignment: &FieldAssignment) -> Value {
    match assignment {
        FieldAssignment::IsExcluded(v) | FieldAssignment::CustomizedTargetDate(v) => {
            Value::Integer(i64::from(*v))
        }
        FieldAssignment::TargetBufferSize(v)
        | FieldAssignment::RemainingTargetBufferSize(v)
        | FieldAssignment::TargetRbc(v)
        | FieldAssignment::RunningSumProductionTime(v)
        | FieldAssignment::ExpectedStartTimeMin(v) => real_value(v),
        FieldAssignment::Prio(v) => text_value(v.map(|p| p.as_str())),
        FieldAssignment::StartDateAssumption(v)
        | FieldAssignment::EndDateAssumption(v)
        | FieldAssignment::TargetDate(v) => datetime_value(v),
        FieldAssignment::TargetType(v) => text_value(v.as_deref()),
    }
}

/// 渲染单条命令: (SQL, 参数)
fn render_command(command: &StepCommand) -> (String, Vec<Value>) {
    let mut values: Vec<Value> = Vec::with_capacity(command.assignments.len() + 2);
    let mut sets: Vec<String> = Vec::with_capacity(command.assignments.len());

    for assignment in &command.assignments {
        values.push(assignment_value(assignment));
        sets.push(format!("{} = ?{}", assignment.column(), values.len()));
    }

    let where_clause = match &command.filter {
        StepFilter::All => String::new(),
        StepFilter::Order(order_nr) => {
            values.push(Value::Text(order_nr.clone()));
            format!(" WHERE production_order_nr = ?{}", values.len())
        }
        StepFilter::Resource(resource) => {
            values.push(Value::Text(resource.clone()));
            format!(" WHERE resource = ?{}", values.len())
        }
        StepFilter::Step {
            production_order_nr,
            work_step_nr,
        } => {
            values.push(Value::Text(production_order_nr.clone()));
            let order_idx = values.len();
            values.push(Value::Text(work_step_nr.clone()));
            format!(
                " WHERE production_order_nr = ?{} AND work_step_nr = ?{}",
                order_idx,
                values.len()
            )
        }
    };

    (
        format!("UPDATE order_step SET {}{}", sets.join(", "), where_clause),
        values,
    )
}

/// 读取全部工序（按订单号、工步号排序）
fn query_all(conn: &Connection) -> RepositoryResult<Vec<OrderStep>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM order_step ORDER BY production_order_nr, work_step_nr",
        SELECT_COLUMNS
    ))?;

    let steps = stmt
        .query_map([], OrderStepRepositoryImpl::map_row)?
        .collect::<SqliteResult<Vec<OrderStep>>>()?;

    Ok(steps)
}

/// 逐条执行命令（调用方负责事务边界）
fn apply_commands(conn: &Connection, commands: &[StepCommand]) -> RepositoryResult<usize> {
    let mut affected = 0;
    for command in commands.iter().filter(|c| !c.assignments.is_empty()) {
        let (sql, values) = render_command(command);
        affected += conn.execute(&sql, params_from_iter(values.iter()))?;
    }
    Ok(affected)
}

// ==========================================
// SqlitePassUnit - 排产工作单元
// ==========================================
// 持有连接锁与 BEGIN IMMEDIATE 事务直到 commit / drop
struct SqlitePassUnit<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl<'a> SqlitePassUnit<'a> {
    fn begin(conn: MutexGuard<'a, Connection>) -> RepositoryResult<Self> {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        debug!("排产工作单元已开启");
        Ok(Self {
            conn,
            finished: false,
        })
    }
}

impl StepUnitOfWork for SqlitePassUnit<'_> {
    fn read_all(&mut self) -> RepositoryResult<Vec<OrderStep>> {
        query_all(&self.conn)
    }

    fn constraint_resources(&mut self) -> RepositoryResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT resource_group FROM scheduled_resource \
             WHERE is_constraint = 1 ORDER BY resource_group",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<SqliteResult<Vec<String>>>()?;
        Ok(names)
    }

    fn bulk_update(&mut self, commands: &[StepCommand]) -> RepositoryResult<usize> {
        let affected = apply_commands(&self.conn, commands)?;
        debug!(commands = commands.len(), affected, "工作单元内批量更新完成");
        Ok(affected)
    }

    fn commit(mut self: Box<Self>) -> RepositoryResult<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        debug!("排产工作单元已提交");
        Ok(())
    }
}

impl Drop for SqlitePassUnit<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        match self.conn.execute_batch("ROLLBACK") {
            Ok(()) => debug!("排产工作单元已回滚"),
            Err(e) => warn!(error = %e, "排产工作单元回滚失败"),
        }
    }
}

impl OrderStepRepository for OrderStepRepositoryImpl {
    fn read_all(&self) -> RepositoryResult<Vec<OrderStep>> {
        let conn = self.get_conn()?;
        query_all(&conn)
    }

    fn begin_pass(&self) -> RepositoryResult<Box<dyn StepUnitOfWork + '_>> {
        let conn = self.get_conn()?;
        Ok(Box::new(SqlitePassUnit::begin(conn)?))
    }

    fn bulk_update(&self, commands: &[StepCommand]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let affected = apply_commands(&tx, commands)?;

        tx.commit()?;
        debug!(commands = commands.len(), affected, "工序批量更新完成");
        Ok(affected)
    }

    fn replace_all_from_backup(&self) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute("DELETE FROM order_step", [])?;
        let restored = tx.execute(
            &format!(
                "INSERT INTO order_step ({cols}) SELECT {cols} FROM order_step_bak",
                cols = SELECT_COLUMNS
            ),
            [],
        )?;
        tx.execute("UPDATE order_step SET is_excluded = 0", [])?;

        tx.commit()?;
        Ok(restored)
    }

    fn snapshot_to_backup(&self) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute("DELETE FROM order_step_bak", [])?;
        let copied = tx.execute(
            &format!(
                "INSERT INTO order_step_bak ({cols}) SELECT {cols} FROM order_step",
                cols = SELECT_COLUMNS
            ),
            [],
        )?;

        tx.commit()?;
        Ok(copied)
    }

    fn upsert_steps(&self, steps: &[OrderStep]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut count = 0;
        for step in steps {
            if step.production_order_nr.trim().is_empty() || step.work_step_nr.trim().is_empty() {
                return Err(RepositoryError::ValidationError(
                    "production_order_nr / work_step_nr 不能为空".to_string(),
                ));
            }

            count += tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO order_step ({}) VALUES \
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                    SELECT_COLUMNS
                ),
                params![
                    step.production_order_nr,
                    step.work_step_nr,
                    step.resource,
                    step.priority,
                    step.worksteps_to_go,
                    step.production_time,
                    step.target_buffer_size,
                    step.remaining_target_buffer_size,
                    step.target_rbc,
                    step.prio.map(|p| p.as_str()),
                    step.running_sum_production_time,
                    step.expected_start_time_min,
                    datetime_value(&step.start_date_assumption),
                    datetime_value(&step.end_date_assumption),
                    datetime_value(&step.target_date),
                    step.target_type,
                    step.is_excluded,
                    step.customized_target_date,
                ],
            )?;
        }

        tx.commit()?;
        Ok(count)
    }
}
