// ==========================================
// DBR 约束排产引擎 - 引擎层
// ==========================================
// 职责: 冲突检测 / 缓冲 / 鼓 / 绳 / 分档 / 流程编排
// 红线: Engine 不拼 SQL，只改写内存快照；持久化统一交给仓储
// ==========================================

pub mod buffer;
pub mod classifier;
pub mod conflict;
pub mod drum;
pub mod error;
pub mod orchestrator;
pub mod repositories;
pub mod rope;

// 重导出核心引擎
pub use buffer::{BufferRecalculator, BufferStats};
pub use classifier::PriorityClassifier;
pub use conflict::{ConflictDetector, ConflictReport};
pub use drum::DrumScheduler;
pub use error::{PassError, PassErrorKind};
pub use orchestrator::{PassReport, SchedulingOrchestrator};
pub use repositories::SchedulingRepositories;
pub use rope::RopePropagator;
