// ==========================================
// DBR 约束排产引擎 - 领域类型定义
// ==========================================
// 职责: 紧急度标签 / 排产流程阶段
// 红线: 紧急度是"分档制"，由缓冲消耗比唯一决定
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 紧急度标签 (Prio Tag)
// ==========================================
// 由 target_rbc 分档得到（见 engine::classifier）
// 序列化格式: 小写（与数据库一致）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrioTag {
    Gray,     // 缓冲异常（负消耗 / 数据异常）
    Green,    // 正常
    Yellow,   // 关注
    Red,      // 紧急
    Expedite, // 缓冲耗尽，立即加急
}

impl PrioTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrioTag::Gray => "gray",
            PrioTag::Green => "green",
            PrioTag::Yellow => "yellow",
            PrioTag::Red => "red",
            PrioTag::Expedite => "expedite",
        }
    }

    /// 从数据库文本解析；未知值返回 None
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "gray" => Some(PrioTag::Gray),
            "green" => Some(PrioTag::Green),
            "yellow" => Some(PrioTag::Yellow),
            "red" => Some(PrioTag::Red),
            "expedite" => Some(PrioTag::Expedite),
            _ => None,
        }
    }
}

impl fmt::Display for PrioTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 排产流程阶段 (Pass Stage)
// ==========================================
// 状态机: Idle → Resetting → DetectingConflicts → RecalculatingBuffers(1)
//        → Scheduling → RecalculatingBuffers(2) → Classifying → Committing → Done
// 任意阶段失败 → Failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PassStage {
    Idle,
    Resetting,
    DetectingConflicts,
    RecalculatingBuffers { round: u8 },
    Scheduling { resource: String },
    Classifying,
    Committing,
    Done,
    Failed,
}

impl PassStage {
    /// 阶段名（用于错误信息与运行日志）
    pub fn name(&self) -> String {
        match self {
            PassStage::Idle => "IDLE".to_string(),
            PassStage::Resetting => "RESETTING".to_string(),
            PassStage::DetectingConflicts => "DETECTING_CONFLICTS".to_string(),
            PassStage::RecalculatingBuffers { round } => format!("RECALCULATING_BUFFERS_{}", round),
            PassStage::Scheduling { resource } => format!("SCHEDULING[{}]", resource),
            PassStage::Classifying => "CLASSIFYING".to_string(),
            PassStage::Committing => "COMMITTING".to_string(),
            PassStage::Done => "DONE".to_string(),
            PassStage::Failed => "FAILED".to_string(),
        }
    }
}

impl fmt::Display for PassStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ==========================================
// 运行状态 (Run Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
            RunStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "COMPLETED" => RunStatus::Completed,
            "CANCELLED" => RunStatus::Cancelled,
            _ => RunStatus::Failed,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
