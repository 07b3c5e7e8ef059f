//! Aggregated token usage over parsed phase records.

use std::collections::BTreeMap;

use serde::Serialize;

use super::record::{PhaseInfo, UsageInfo};
use crate::cost::UsageCostEstimator;
use crate::error::Result;

/// Token counts summed over a set of exchanges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    pub exchanges: usize,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl UsageTotals {
    pub fn record(&mut self, usage: &UsageInfo) {
        self.exchanges += 1;
        self.prompt_tokens = self.prompt_tokens.saturating_add(usage.prompt_tokens);
        self.completion_tokens = self
            .completion_tokens
            .saturating_add(usage.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(usage.total_tokens);
    }

    /// Average total tokens per exchange.
    pub fn avg_tokens_per_exchange(&self) -> f64 {
        if self.exchanges == 0 {
            0.0
        } else {
            self.total_tokens as f64 / self.exchanges as f64
        }
    }
}

/// Send-to-receive latency over the exchanges that carry timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LatencyStats {
    pub measured: usize,
    pub total_ms: i64,
    pub max_ms: i64,
}

impl LatencyStats {
    pub fn mean_ms(&self) -> i64 {
        if self.measured == 0 {
            0
        } else {
            self.total_ms / self.measured as i64
        }
    }
}

/// Priced totals for one model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryCost {
    pub model_id: String,
    pub total: f64,
    /// Cost per phase, same keys as `UsageSummary::by_phase`
    pub by_phase: BTreeMap<String, f64>,
}

/// Usage of a whole run, overall and broken down per phase and per role.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageSummary {
    pub totals: UsageTotals,
    pub by_phase: BTreeMap<String, UsageTotals>,
    pub by_role: BTreeMap<String, UsageTotals>,
    pub latency: Option<LatencyStats>,
    pub cost: Option<SummaryCost>,
}

impl UsageSummary {
    pub fn from_phases(phases: &[PhaseInfo]) -> Self {
        let mut summary = Self::default();
        let mut latency = LatencyStats::default();

        for phase in phases {
            let usage = &phase.usage_info;
            summary.totals.record(usage);
            summary
                .by_phase
                .entry(phase.phase_name.clone())
                .or_default()
                .record(usage);
            summary
                .by_role
                .entry(phase.role.clone())
                .or_default()
                .record(usage);

            if let Some(elapsed) = usage.latency() {
                let ms = elapsed.num_milliseconds();
                latency.measured += 1;
                latency.total_ms = latency.total_ms.saturating_add(ms);
                latency.max_ms = latency.max_ms.max(ms);
            }
        }

        if latency.measured > 0 {
            summary.latency = Some(latency);
        }
        summary
    }

    /// Price the totals and every phase at `model_id`'s rates.
    pub fn with_cost(mut self, estimator: &UsageCostEstimator, model_id: &str) -> Result<Self> {
        let total = estimator.cost(
            model_id,
            self.totals.prompt_tokens,
            self.totals.completion_tokens,
        )?;

        let mut by_phase = BTreeMap::new();
        for (name, totals) in &self.by_phase {
            let cost = estimator.cost(model_id, totals.prompt_tokens, totals.completion_tokens)?;
            by_phase.insert(name.clone(), cost);
        }

        self.cost = Some(SummaryCost {
            model_id: model_id.to_string(),
            total,
            by_phase,
        });
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.totals.exchanges == 0
    }
}
