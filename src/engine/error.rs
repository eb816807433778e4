// ==========================================
// DBR 约束排产引擎 - 排产流程错误
// ==========================================
// 任意阶段失败 → 整个流程失败，不提交任何改写
// ==========================================

use crate::calendar::CalendarError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 失败原因分类
#[derive(Error, Debug)]
pub enum PassErrorKind {
    #[error("仓储错误: {0}")]
    Repository(#[from] RepositoryError),

    #[error("日历推算错误: {0}")]
    Calendar(#[from] CalendarError),

    #[error("排产已取消")]
    Cancelled,

    #[error("运行锁获取失败: {0}")]
    Lock(String),
}

// ==========================================
// PassError - 排产流程错误
// ==========================================
#[derive(Error, Debug)]
#[error("排产失败 [阶段={stage}, 已处理行数={rows_processed}]: {kind}")]
pub struct PassError {
    pub stage: String,         // 失败阶段名（PassStage::name）
    pub rows_processed: usize, // 失败前各阶段已处理的行数
    #[source]
    pub kind: PassErrorKind,
}

impl PassError {
    pub fn new(stage: impl Into<String>, rows_processed: usize, kind: impl Into<PassErrorKind>) -> Self {
        Self {
            stage: stage.into(),
            rows_processed,
            kind: kind.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, PassErrorKind::Cancelled)
    }
}
