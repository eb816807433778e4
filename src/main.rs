// ==========================================
// DBR 约束排产引擎 - 命令行入口
// ==========================================
// 用法: dbr-scheduler [db_path] <init|run|reset|backup|conflicts|runs [limit]>
// db_path 省略时使用 DBR_SCHEDULER_DB_PATH 或用户数据目录
// ==========================================

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use dbr_scheduler::{logging, SchedulingApi};

const COMMANDS: &[&str] = &["init", "run", "reset", "backup", "conflicts", "runs"];

/// 默认数据库路径
fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var("DBR_SCHEDULER_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./dbr_scheduler.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("dbr-scheduler");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("dbr_scheduler.db");
        }
    }
    path.to_string_lossy().to_string()
}

fn print_usage() {
    eprintln!("{} v{}", dbr_scheduler::SYSTEM_NAME, dbr_scheduler::VERSION);
    eprintln!();
    eprintln!("用法: dbr-scheduler [db_path] <command>");
    eprintln!("  init              建表（幂等）");
    eprintln!("  run               执行全量排产");
    eprintln!("  reset             从备份表恢复工序");
    eprintln!("  backup            将当前工序复制到备份表");
    eprintln!("  conflicts         列出经过多个瓶颈资源的订单");
    eprintln!("  runs [limit]      最近的运行日志（默认 20 条）");
}

fn execute(db_path: &str, command: &str, rest: &[String]) -> anyhow::Result<bool> {
    let api = SchedulingApi::open(db_path).with_context(|| format!("无法打开数据库: {}", db_path))?;

    match command {
        "init" => {
            println!("数据库已初始化: {}", db_path);
            Ok(true)
        }
        "run" => match api.run_full_pass() {
            Ok(report) => {
                println!("{}", serde_json::to_string_pretty(&report)?);
                Ok(true)
            }
            Err(e) => {
                eprintln!("{}", e);
                Ok(false)
            }
        },
        "reset" => {
            let restored = api.reset_to_backup()?;
            println!("已从备份恢复 {} 行", restored);
            Ok(true)
        }
        "backup" => {
            let copied = api.snapshot_to_backup()?;
            println!("已备份 {} 行", copied);
            Ok(true)
        }
        "conflicts" => {
            let report = api.find_conflicting_orders()?;
            if report.has_conflicts() {
                println!("{}", report.summary());
            } else {
                println!("无冲突订单");
            }
            Ok(true)
        }
        "runs" => {
            let limit = match rest.first() {
                Some(raw) => raw
                    .parse::<usize>()
                    .with_context(|| format!("limit 不是有效数字: {}", raw))?,
                None => 20,
            };
            for log in api.list_run_logs(limit)? {
                println!(
                    "{}  {:<9}  {:<9}  stage={}  rows={}",
                    log.started_at.format("%Y-%m-%d %H:%M:%S"),
                    log.run_kind,
                    log.status,
                    log.failed_stage.as_deref().unwrap_or("-"),
                    log.rows_processed
                );
            }
            Ok(true)
        }
        other => anyhow::bail!("未知命令: {}", other),
    }
}

fn main() -> ExitCode {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (db_path, command, rest) = match args.as_slice() {
        [command, rest @ ..] if COMMANDS.contains(&command.as_str()) => {
            (get_default_db_path(), command.clone(), rest.to_vec())
        }
        [db_path, command, rest @ ..] => (db_path.clone(), command.clone(), rest.to_vec()),
        _ => {
            print_usage();
            return ExitCode::from(2);
        }
    };

    tracing::info!("使用数据库: {}", db_path);

    match execute(&db_path, &command, &rest) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("错误: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
