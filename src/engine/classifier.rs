// ==========================================
// DBR 约束排产引擎 - 紧急度分档
// ==========================================
// 红线: 紧急度是"分档制"，首个命中的阈值生效
//   rbc < gray_below   → gray
//   rbc < green_below  → green
//   rbc < yellow_below → yellow
//   rbc < red_below    → red
//   其余               → expedite
// rbc 为空 → prio 为空
// ==========================================

use crate::config::scheduling_config::PrioThresholds;
use crate::domain::order_step::OrderStep;
use crate::domain::types::PrioTag;
use std::collections::BTreeMap;
use tracing::{info, instrument};

// ==========================================
// PriorityClassifier - 紧急度分档器
// ==========================================
#[derive(Debug, Clone)]
pub struct PriorityClassifier {
    thresholds: PrioThresholds,
}

impl PriorityClassifier {
    pub fn new(thresholds: PrioThresholds) -> Self {
        Self { thresholds }
    }

    /// 单值分档
    pub fn classify_rbc(&self, rbc: Option<f64>) -> Option<PrioTag> {
        let rbc = rbc?;
        if rbc.is_nan() {
            return None;
        }
        let t = &self.thresholds;
        let tag = if rbc < t.gray_below {
            PrioTag::Gray
        } else if rbc < t.green_below {
            PrioTag::Green
        } else if rbc < t.yellow_below {
            PrioTag::Yellow
        } else if rbc < t.red_below {
            PrioTag::Red
        } else {
            PrioTag::Expedite
        };
        Some(tag)
    }

    /// 对全部未排除工序分档，返回各档行数（空档不计）
    #[instrument(skip_all, fields(rows = steps.len()))]
    pub fn classify(&self, steps: &mut [OrderStep]) -> BTreeMap<PrioTag, usize> {
        let mut histogram: BTreeMap<PrioTag, usize> = BTreeMap::new();
        for step in steps.iter_mut().filter(|s| !s.is_excluded) {
            step.prio = self.classify_rbc(step.target_rbc);
            if let Some(tag) = step.prio {
                *histogram.entry(tag).or_insert(0) += 1;
            }
        }

        info!(
            gray = histogram.get(&PrioTag::Gray).copied().unwrap_or(0),
            green = histogram.get(&PrioTag::Green).copied().unwrap_or(0),
            yellow = histogram.get(&PrioTag::Yellow).copied().unwrap_or(0),
            red = histogram.get(&PrioTag::Red).copied().unwrap_or(0),
            expedite = histogram.get(&PrioTag::Expedite).copied().unwrap_or(0),
            "紧急度分档完成"
        );

        histogram
    }
}

impl Default for PriorityClassifier {
    fn default() -> Self {
        Self::new(PrioThresholds::default())
    }
}
