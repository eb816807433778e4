// ==========================================
// DBR 约束排产引擎 - API层错误类型
// ==========================================
// 职责: 将仓储 / 引擎错误转换为调用方可读的错误
// 约定: 排产失败必须带出失败阶段与已处理行数
// ==========================================

use crate::calendar::CalendarError;
use crate::engine::error::{PassError, PassErrorKind};
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 排产流程错误
    // ==========================================
    #[error("排产失败: stage={stage}, rows_processed={rows_processed}, reason={reason}")]
    PassFailed {
        stage: String,
        rows_processed: usize,
        reason: String,
    },

    #[error("排产已取消: stage={stage}, rows_processed={rows_processed}")]
    PassCancelled { stage: String, rows_processed: usize },

    #[error("工作日历错误: {0}")]
    CalendarError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    #[error("数据库 schema 版本过新: found={found}, supported={supported}")]
    SchemaVersionUnsupported { found: i64, supported: i64 },

    // ==========================================
    // 通用错误
    // ==========================================
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 失败阶段（仅排产流程错误有值）
    pub fn stage(&self) -> Option<&str> {
        match self {
            ApiError::PassFailed { stage, .. } | ApiError::PassCancelled { stage, .. } => {
                Some(stage)
            }
            _ => None,
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

impl From<CalendarError> for ApiError {
    fn from(err: CalendarError) -> Self {
        ApiError::CalendarError(err.to_string())
    }
}

// ==========================================
// 从 PassError 转换
// ==========================================
impl From<PassError> for ApiError {
    fn from(err: PassError) -> Self {
        match err.kind {
            PassErrorKind::Cancelled => ApiError::PassCancelled {
                stage: err.stage,
                rows_processed: err.rows_processed,
            },
            kind => ApiError::PassFailed {
                stage: err.stage,
                rows_processed: err.rows_processed,
                reason: kind.to_string(),
            },
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
