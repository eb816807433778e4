// ==========================================
// 全量排产端到端测试
// ==========================================
// 测试范围:
// 1. 两工序订单: 鼓排程 → 绳下推 → 二次缓冲 → 分档
// 2. 多瓶颈冲突订单整单排除
// 3. 备份恢复
// 4. 失败 / 取消不提交任何改写，运行日志记录失败阶段
// 5. 并发排产串行化（同连接 / 跨连接）
// 6. 配置覆盖（缓冲系数 / 目标类型前缀）
// 7. 人工目标日期
// 8. 多个瓶颈资源各自排队
// 9. schema 版本检查
// ==========================================


mod helpers;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use dbr_scheduler::api::{ApiError, SchedulingApi};
use dbr_scheduler::calendar::{CalendarOracle, CalendarResult, TableCalendar};
use dbr_scheduler::config::{config_keys, CalendarSettings, SchedulingConfig};
use dbr_scheduler::db::CURRENT_SCHEMA_VERSION;
use dbr_scheduler::domain::types::{PrioTag, RunStatus};
use dbr_scheduler::domain::TargetDateOverride;
use dbr_scheduler::repository::{
    FieldAssignment, OrderStepRepository, OrderStepRepositoryImpl, RepositoryResult, StepCommand,
    StepFilter,
};
use helpers::test_data_builder::{find_step, two_step_order, OrderStepBuilder};
use test_helpers::{
    base_now, create_test_db, insert_resource, insert_test_config, insert_uniform_calendar,
    minutes_after_now, open_shared_connection, open_test_connection,
};

struct Scenario {
    _temp_file: tempfile::NamedTempFile,
    db_path: String,
    api: SchedulingApi,
    repo: OrderStepRepositoryImpl,
    conn: Arc<std::sync::Mutex<rusqlite::Connection>>,
}

/// blau / rot 为瓶颈，gruen 非瓶颈；blau / gruen 有 60 天日历
fn setup() -> Scenario {
    dbr_scheduler::logging::init_test();
    let (temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_shared_connection(&db_path).expect("Failed to open db");

    insert_resource(&conn, "blau", true).unwrap();
    insert_resource(&conn, "rot", true).unwrap();
    insert_resource(&conn, "gruen", false).unwrap();
    insert_uniform_calendar(&conn, "blau", 60, 8).unwrap();
    insert_uniform_calendar(&conn, "rot", 60, 8).unwrap();
    insert_uniform_calendar(&conn, "gruen", 60, 8).unwrap();

    let api = SchedulingApi::from_connection(conn.clone()).expect("Failed to create api");
    let repo = OrderStepRepositoryImpl::from_connection(conn.clone());

    Scenario {
        _temp_file: temp_file,
        db_path,
        api,
        repo,
        conn,
    }
}

// ==========================================
// 两工序订单
// ==========================================

#[test]
fn test_two_step_order_end_to_end() {
    let s = setup();
    s.repo.upsert_steps(&two_step_order("PO1")).unwrap();

    let report = s.api.run_full_pass_at(base_now()).expect("pass should succeed");
    assert_eq!(report.rows_read, 2);
    assert_eq!(report.rows_committed, 2);
    assert!(report.conflicts.excluded_orders.is_empty());

    let steps = s.repo.read_all().unwrap();
    let drum = find_step(&steps, "PO1", "10");
    let downstream = find_step(&steps, "PO1", "20");

    // 鼓: 首个开工 = now + 0 分钟，完工 = now + 100 个工作分钟
    assert_eq!(drum.expected_start_time_min, Some(0.0));
    assert_eq!(drum.running_sum_production_time, Some(100.0));
    assert_eq!(drum.start_date_assumption, Some(base_now()));
    assert_eq!(drum.end_date_assumption, Some(minutes_after_now(100)));
    assert!(!drum.is_excluded);

    // 绳: 下游工序拿到瓶颈开工时刻
    assert_eq!(downstream.target_date, Some(base_now()));
    assert_eq!(downstream.target_type.as_deref(), Some("EP-blau"));

    // 二次缓冲: 2 道工序 × 2 = 4，剩余 0 个工作日 → 100% → expedite
    assert_eq!(downstream.target_buffer_size, Some(4.0));
    assert_eq!(downstream.remaining_target_buffer_size, Some(0.0));
    assert_eq!(downstream.target_rbc, Some(100.0));
    assert_eq!(downstream.prio, Some(PrioTag::Expedite));

    // 瓶颈工序本身没有目标日期 → 消耗比 / 分档为空
    assert_eq!(drum.target_rbc, None);
    assert_eq!(drum.prio, None);
}

#[test]
fn test_drum_sequence_spills_into_next_shift() {
    let s = setup();
    s.repo
        .upsert_steps(&[
            OrderStepBuilder::new("PO-A", "10", "blau")
                .priority(1)
                .production_time(300.0)
                .build(),
            OrderStepBuilder::new("PO-B", "10", "blau")
                .priority(2)
                .production_time(300.0)
                .build(),
        ])
        .unwrap();

    s.api.run_full_pass_at(base_now()).unwrap();

    let steps = s.repo.read_all().unwrap();
    let a = find_step(&steps, "PO-A", "10");
    let b = find_step(&steps, "PO-B", "10");

    assert_eq!(a.start_date_assumption, Some(base_now()));
    assert_eq!(b.expected_start_time_min, Some(300.0));
    assert_eq!(b.running_sum_production_time, Some(600.0));
    // 09:00 + 300 分钟 = 14:00
    assert_eq!(b.start_date_assumption, Some(minutes_after_now(300)));
    // 当天 08:00-16:00 剩 420 分钟，次日 08:00 + 180 分钟 = 11:00
    assert_eq!(
        b.end_date_assumption,
        Some(
            chrono::NaiveDate::from_ymd_opt(2025, 8, 5)
                .unwrap()
                .and_hms_opt(11, 0, 0)
                .unwrap()
        )
    );
}

// ==========================================
// 多瓶颈冲突
// ==========================================

#[test]
fn test_order_touching_two_constraints_is_excluded() {
    let s = setup();
    let mut steps = two_step_order("PO1");
    steps.push(
        OrderStepBuilder::new("PO2", "10", "blau")
            .worksteps_to_go(2)
            .production_time(50.0)
            .build(),
    );
    steps.push(
        OrderStepBuilder::new("PO2", "20", "rot")
            .worksteps_to_go(1)
            .production_time(50.0)
            .build(),
    );
    steps.push(OrderStepBuilder::new("PO2", "30", "gruen").build());
    s.repo.upsert_steps(&steps).unwrap();

    let conflicts = s.api.find_conflicting_orders().unwrap();
    assert_eq!(conflicts.summary(), "PO2 / ");

    let report = s.api.run_full_pass_at(base_now()).unwrap();
    assert_eq!(report.conflicts.excluded_orders, vec!["PO2".to_string()]);
    assert_eq!(report.conflicts.excluded_steps, 3);

    let rows = s.repo.read_all().unwrap();
    for row in rows.iter().filter(|r| r.production_order_nr == "PO2") {
        assert!(row.is_excluded);
        assert_eq!(row.start_date_assumption, None);
        assert_eq!(row.target_buffer_size, None);
        assert_eq!(row.prio, None);
    }

    // PO2 不占用 blau 的产能，PO1 仍从 now 开工
    assert_eq!(
        find_step(&rows, "PO1", "10").start_date_assumption,
        Some(base_now())
    );
}

// ==========================================
// 备份恢复
// ==========================================

#[test]
fn test_reset_restores_backup_and_clears_exclusion() {
    let s = setup();
    let mut original = two_step_order("PO1");
    original[1] = OrderStepBuilder::new("PO1", "20", "gruen")
        .target_date(minutes_after_now(60 * 24 * 5))
        .target_type("MANUAL")
        .excluded()
        .build();
    s.repo.upsert_steps(&original).unwrap();
    assert_eq!(s.api.snapshot_to_backup().unwrap(), 2);

    s.api.run_full_pass_at(base_now()).unwrap();
    assert_ne!(s.repo.read_all().unwrap()[1].target_type.as_deref(), Some("MANUAL"));

    let restored = s.api.reset_to_backup().unwrap();
    assert_eq!(restored, 2);

    let mut expected = original.clone();
    for step in expected.iter_mut() {
        step.is_excluded = false;
    }
    assert_eq!(s.repo.read_all().unwrap(), expected);

    let logs = s.api.list_run_logs(10).unwrap();
    assert_eq!(logs[0].run_kind, "RESET");
    assert_eq!(logs[0].status, RunStatus::Completed);
}

// ==========================================
// 失败 / 取消
// ==========================================

#[test]
fn test_calendar_failure_leaves_store_untouched() {
    let s = setup();
    // lila 为瓶颈但没有日历
    insert_resource(&s.conn, "lila", true).unwrap();
    let mut steps = two_step_order("PO1");
    steps.push(
        OrderStepBuilder::new("PO3", "10", "lila")
            .worksteps_to_go(1)
            .production_time(10.0)
            .build(),
    );
    steps.push(OrderStepBuilder::new("PO3", "20", "gruen").build());
    s.repo.upsert_steps(&steps).unwrap();
    let before = s.repo.read_all().unwrap();

    let err = s.api.run_full_pass_at(base_now()).unwrap_err();
    match &err {
        ApiError::PassFailed {
            stage,
            rows_processed,
            reason,
        } => {
            // blau 先于 lila 排程，失败发生在 lila
            assert_eq!(stage, "SCHEDULING[lila]");
            assert!(*rows_processed > 0);
            assert!(reason.contains("lila"));
        }
        other => panic!("Expected PassFailed, got {:?}", other),
    }

    // blau 已在内存中排完，但不得落库
    assert_eq!(s.repo.read_all().unwrap(), before);

    let logs = s.api.list_run_logs(5).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, RunStatus::Failed);
    assert_eq!(logs[0].failed_stage.as_deref(), Some("SCHEDULING[lila]"));
}

#[test]
fn test_cancelled_pass_is_logged_and_commits_nothing() {
    let s = setup();
    s.repo.upsert_steps(&two_step_order("PO1")).unwrap();
    let before = s.repo.read_all().unwrap();

    s.api.orchestrator().request_cancel();
    let err = s.api.run_full_pass_at(base_now()).unwrap_err();
    assert!(matches!(err, ApiError::PassCancelled { .. }));
    assert_eq!(s.repo.read_all().unwrap(), before);

    let logs = s.api.list_run_logs(5).unwrap();
    assert_eq!(logs[0].status, RunStatus::Cancelled);

    // 下一次不受影响
    assert!(s.api.run_full_pass_at(base_now()).is_ok());
}

// ==========================================
// 并发
// ==========================================

#[test]
fn test_concurrent_passes_are_serialised() {
    let s = setup();
    s.repo.upsert_steps(&two_step_order("PO1")).unwrap();
    s.repo.upsert_steps(&two_step_order("PO2")).unwrap();

    s.api.run_full_pass_at(base_now()).unwrap();
    let single_run = s.repo.read_all().unwrap();

    let api = Arc::new(s.api);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let api = Arc::clone(&api);
            thread::spawn(move || api.run_full_pass_at(base_now()).is_ok())
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }

    assert_eq!(s.repo.read_all().unwrap(), single_run);
    let logs = api.list_run_logs(10).unwrap();
    assert_eq!(logs.len(), 5);
    assert!(logs.iter().all(|l| l.status == RunStatus::Completed));
}

// ==========================================
// 配置覆盖
// ==========================================

#[test]
fn test_config_overrides_buffer_factor_and_prefix() {
    let s = setup();
    insert_test_config(&s.conn, config_keys::BUFFER_FACTOR, "3").unwrap();
    insert_test_config(&s.conn, config_keys::TARGET_TYPE_PREFIX, "DRUM:").unwrap();
    s.repo.upsert_steps(&two_step_order("PO1")).unwrap();

    s.api.run_full_pass_at(base_now()).unwrap();

    let steps = s.repo.read_all().unwrap();
    let downstream = find_step(&steps, "PO1", "20");
    assert_eq!(downstream.target_type.as_deref(), Some("DRUM:blau"));
    assert_eq!(downstream.target_buffer_size, Some(6.0));

    let logs = s.api.list_run_logs(1).unwrap();
    let snapshot = logs[0].config_snapshot_json.as_deref().unwrap();
    assert!(snapshot.contains("DRUM:"));
}

#[test]
fn test_api_instances_on_separate_connections_both_complete() {
    let s = setup();
    s.repo.upsert_steps(&two_step_order("PO1")).unwrap();
    s.api.run_full_pass_at(base_now()).unwrap();
    let single_run = s.repo.read_all().unwrap();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let path = s.db_path.clone();
            thread::spawn(move || {
                let api = SchedulingApi::open(&path).expect("Failed to open api");
                api.run_full_pass_at(base_now()).is_ok()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }

    assert_eq!(s.repo.read_all().unwrap(), single_run);
    let logs = s.api.list_run_logs(10).unwrap();
    assert_eq!(logs.len(), 3);
    assert!(logs.iter().all(|l| l.status == RunStatus::Completed));
}

// ==========================================
// 跨连接写入
// ==========================================

/// 在鼓排程阶段从另一个连接改写目标日期的日历
struct ConcurrentWriterCalendar {
    inner: TableCalendar,
    db_path: String,
    order_nr: String,
    target_date: NaiveDateTime,
    started: AtomicBool,
    writer: Mutex<Option<JoinHandle<RepositoryResult<usize>>>>,
}

impl ConcurrentWriterCalendar {
    fn new(db_path: &str, order_nr: &str, target_date: NaiveDateTime) -> Self {
        let from = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap();
        let inner = TableCalendar::new(CalendarSettings::default())
            .with_uniform_days("blau", from, 60, 8)
            .with_uniform_days("rot", from, 60, 8)
            .with_uniform_days("gruen", from, 60, 8);
        Self {
            inner,
            db_path: db_path.to_string(),
            order_nr: order_nr.to_string(),
            target_date,
            started: AtomicBool::new(false),
            writer: Mutex::new(None),
        }
    }

    fn join_writer(&self) -> Option<RepositoryResult<usize>> {
        let handle = self.writer.lock().unwrap().take()?;
        Some(handle.join().unwrap())
    }
}

impl CalendarOracle for ConcurrentWriterCalendar {
    fn add_working_minutes(
        &self,
        start: NaiveDateTime,
        minutes: f64,
        resource: &str,
    ) -> CalendarResult<NaiveDateTime> {
        if !self.started.swap(true, Ordering::SeqCst) {
            let path = self.db_path.clone();
            let order_nr = self.order_nr.clone();
            let target_date = self.target_date;
            let handle = thread::spawn(move || {
                let repo = OrderStepRepositoryImpl::new(&path)?;
                repo.bulk_update(&[StepCommand::new(
                    StepFilter::Order(order_nr),
                    vec![FieldAssignment::TargetDate(Some(target_date))],
                )])
            });
            *self.writer.lock().unwrap() = Some(handle);
            // 让另一个连接在排产提交前发出写请求
            thread::sleep(Duration::from_millis(100));
        }
        self.inner.add_working_minutes(start, minutes, resource)
    }

    fn working_days_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        resource: &str,
    ) -> CalendarResult<f64> {
        self.inner.working_days_between(start, end, resource)
    }
}

#[test]
fn test_write_from_other_connection_during_pass_is_kept() {
    let s = setup();
    let mut steps = two_step_order("PO1");
    steps.push(
        OrderStepBuilder::new("PO9", "10", "gruen")
            .target_date(minutes_after_now(60))
            .build(),
    );
    s.repo.upsert_steps(&steps).unwrap();

    let external = NaiveDate::from_ymd_opt(2025, 8, 11)
        .unwrap()
        .and_hms_opt(7, 39, 0)
        .unwrap();
    let calendar = ConcurrentWriterCalendar::new(&s.db_path, "PO9", external);

    let report = s
        .api
        .orchestrator()
        .run_full_pass(base_now(), &calendar, &SchedulingConfig::default())
        .expect("pass should succeed");
    assert_eq!(report.rows_committed, 3);

    // 另一个连接的写入排在排产提交之后，不被覆盖
    let written = calendar.join_writer().expect("writer should have started");
    assert_eq!(written.unwrap(), 1);

    let rows = s.repo.read_all().unwrap();
    assert_eq!(find_step(&rows, "PO9", "10").target_date, Some(external));
    assert_eq!(
        find_step(&rows, "PO1", "10").start_date_assumption,
        Some(base_now())
    );
    assert_eq!(find_step(&rows, "PO1", "20").target_date, Some(base_now()));
}

// ==========================================
// 人工目标日期
// ==========================================

#[test]
fn test_target_date_override_drives_next_pass() {
    let s = setup();
    s.repo
        .upsert_steps(&[
            OrderStepBuilder::new("PO5", "10", "gruen")
                .worksteps_to_go(1)
                .production_time(20.0)
                .build(),
            OrderStepBuilder::new("PO5", "20", "gruen").build(),
        ])
        .unwrap();

    // 周三 09:00，距 now 2 个工作日
    let manual = NaiveDate::from_ymd_opt(2025, 8, 6)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap();
    let affected = s
        .api
        .update_target_dates(&[TargetDateOverride::new("PO5", Some(manual))])
        .unwrap();
    assert_eq!(affected, 2);

    s.api.run_full_pass_at(base_now()).unwrap();

    let rows = s.repo.read_all().unwrap();
    for nr in ["10", "20"] {
        let step = find_step(&rows, "PO5", nr);
        assert_eq!(step.target_date, Some(manual));
        assert!(step.customized_target_date);
        assert_eq!(step.target_buffer_size, Some(4.0));
        assert_eq!(step.remaining_target_buffer_size, Some(2.0));
        assert_eq!(step.target_rbc, Some(50.0));
        assert_eq!(step.prio, Some(PrioTag::Yellow));
    }

    // 撤销后下一次排产不再有目标日期
    s.api
        .update_target_dates(&[TargetDateOverride::new("PO5", None)])
        .unwrap();
    s.api.run_full_pass_at(base_now()).unwrap();

    let rows = s.repo.read_all().unwrap();
    let step = find_step(&rows, "PO5", "10");
    assert_eq!(step.target_date, None);
    assert!(!step.customized_target_date);
    assert_eq!(step.target_rbc, None);
    assert_eq!(step.prio, None);
}

#[test]
fn test_target_date_override_rejects_blank_order() {
    let s = setup();
    assert_eq!(s.api.update_target_dates(&[]).unwrap(), 0);

    let err = s
        .api
        .update_target_dates(&[TargetDateOverride::new("  ", Some(base_now()))])
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));
}

// ==========================================
// 多个瓶颈资源
// ==========================================

#[test]
fn test_two_constraints_schedule_independently() {
    let s = setup();
    let mut steps = two_step_order("PO1");
    steps.extend([
        OrderStepBuilder::new("PO2", "10", "rot")
            .worksteps_to_go(1)
            .production_time(60.0)
            .build(),
        OrderStepBuilder::new("PO2", "20", "gruen").build(),
        OrderStepBuilder::new("PO3", "10", "rot")
            .priority(2)
            .worksteps_to_go(1)
            .production_time(30.0)
            .build(),
        OrderStepBuilder::new("PO3", "20", "gruen").build(),
    ]);
    s.repo.upsert_steps(&steps).unwrap();

    let report = s.api.run_full_pass_at(base_now()).unwrap();
    assert_eq!(report.constraints, vec!["blau".to_string(), "rot".to_string()]);
    assert_eq!(report.scheduled_per_resource.get("blau"), Some(&1));
    assert_eq!(report.scheduled_per_resource.get("rot"), Some(&2));
    assert!(report.conflicts.excluded_orders.is_empty());

    let rows = s.repo.read_all().unwrap();

    // blau 队列只有 PO1，rot 队列从 now 重新累计
    assert_eq!(find_step(&rows, "PO1", "10").start_date_assumption, Some(base_now()));
    let po2 = find_step(&rows, "PO2", "10");
    assert_eq!(po2.start_date_assumption, Some(base_now()));
    assert_eq!(po2.end_date_assumption, Some(minutes_after_now(60)));
    let po3 = find_step(&rows, "PO3", "10");
    assert_eq!(po3.expected_start_time_min, Some(60.0));
    assert_eq!(po3.start_date_assumption, Some(minutes_after_now(60)));

    // 下游工序标记各自的瓶颈
    let po1_down = find_step(&rows, "PO1", "20");
    assert_eq!(po1_down.target_type.as_deref(), Some("EP-blau"));
    assert_eq!(po1_down.target_date, Some(base_now()));
    let po2_down = find_step(&rows, "PO2", "20");
    assert_eq!(po2_down.target_type.as_deref(), Some("EP-rot"));
    assert_eq!(po2_down.target_date, Some(base_now()));
    let po3_down = find_step(&rows, "PO3", "20");
    assert_eq!(po3_down.target_type.as_deref(), Some("EP-rot"));
    assert_eq!(po3_down.target_date, Some(minutes_after_now(60)));
}

// ==========================================
// schema 版本
// ==========================================

#[test]
fn test_newer_schema_version_is_rejected() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let conn = open_test_connection(&db_path).unwrap();
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION + 1],
    )
    .unwrap();
    drop(conn);

    match SchedulingApi::open(&db_path) {
        Err(ApiError::SchemaVersionUnsupported { found, supported }) => {
            assert_eq!(found, CURRENT_SCHEMA_VERSION + 1);
            assert_eq!(supported, CURRENT_SCHEMA_VERSION);
        }
        Err(other) => panic!("Expected SchemaVersionUnsupported, got {:?}", other),
        Ok(_) => panic!("Expected SchemaVersionUnsupported, got Ok"),
    }

    // 当前版本的库可以正常打开
    let (_temp_file, db_path) = create_test_db().unwrap();
    assert!(SchedulingApi::open(&db_path).is_ok());
}
