//! Cost accounting and budget enforcement
//!
//! Every provider call reports token usage; the [`CostTracker`] turns
//! usage into integer cents via a static per-model [`PricingTable`] and
//! aggregates three ledgers that must always agree: the swarm total,
//! per-agent totals, and per-node totals. Two optional budgets hang off
//! the tracker: a swarm-wide cap that aborts the run when crossed and a
//! per-agent cap that only raises a `budget_exceeded` event.
//!
//! Costs are always integer cents. Per-leg costs round up, so a call
//! that consumes any tokens at a non-zero price costs at least one cent
//! per priced leg.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fraction of the swarm budget at which a `budget_warning` fires
const WARN_FRACTION: f64 = 0.8;

/// Integer counters for one accounting bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSummary {
    /// Prompt tokens consumed
    pub input_tokens: u64,
    /// Completion tokens produced
    pub output_tokens: u64,
    /// Sum of input and output tokens
    pub total_tokens: u64,
    /// Accumulated cost in integer cents
    pub cost_cents: u64,
    /// Number of provider calls
    pub calls: u64,
}

impl CostSummary {
    fn add(&mut self, input_tokens: u64, output_tokens: u64, cost_cents: u64) {
        self.input_tokens += input_tokens;
        self.output_tokens += output_tokens;
        self.total_tokens += input_tokens + output_tokens;
        self.cost_cents += cost_cents;
        self.calls += 1;
    }
}

/// Price of one model in cents per million tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelPrice {
    /// Cents per million input tokens
    pub input_cents_per_mtok: u64,
    /// Cents per million output tokens
    pub output_cents_per_mtok: u64,
}

/// Static per-model pricing with prefix fallback
///
/// Lookup tries the exact model id first, then the longest table key
/// that is a prefix of the requested id, then the default entry. Keys
/// are therefore model-family prefixes ("claude-3-5-sonnet" matches
/// every dated snapshot of that family).
#[derive(Debug, Clone)]
pub struct PricingTable {
    entries: Vec<(String, ModelPrice)>,
    default: ModelPrice,
}

impl PricingTable {
    /// Build a table from explicit entries and a default
    pub fn new(entries: Vec<(String, ModelPrice)>, default: ModelPrice) -> Self {
        Self { entries, default }
    }

    /// Price for a model id, using prefix fallback
    pub fn price(&self, model: &str) -> ModelPrice {
        if let Some((_, price)) = self.entries.iter().find(|(key, _)| key == model) {
            return *price;
        }

        self.entries
            .iter()
            .filter(|(key, _)| model.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, price)| *price)
            .unwrap_or(self.default)
    }

    /// Cost of one call in integer cents, rounding each leg up
    pub fn cost_cents(&self, model: &str, input_tokens: u64, output_tokens: u64) -> u64 {
        let price = self.price(model);
        ceil_div(input_tokens * price.input_cents_per_mtok, 1_000_000)
            + ceil_div(output_tokens * price.output_cents_per_mtok, 1_000_000)
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        let entry = |key: &str, input: u64, output: u64| {
            (
                key.to_string(),
                ModelPrice {
                    input_cents_per_mtok: input,
                    output_cents_per_mtok: output,
                },
            )
        };

        Self {
            entries: vec![
                entry("claude-3-opus", 1_500, 7_500),
                entry("claude-3-5-sonnet", 300, 1_500),
                entry("claude-3-5-haiku", 80, 400),
                entry("gpt-4o-mini", 15, 60),
                entry("gpt-4o", 250, 1_000),
                entry("o1", 1_500, 6_000),
                // Local model families run free.
                entry("llama", 0, 0),
                entry("mixtral", 0, 0),
            ],
            default: ModelPrice {
                input_cents_per_mtok: 100,
                output_cents_per_mtok: 300,
            },
        }
    }
}

fn ceil_div(numerator: u64, denominator: u64) -> u64 {
    numerator.div_ceil(denominator)
}

/// Result of a swarm budget check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetStatus {
    /// False when the budget is exhausted
    pub ok: bool,
    /// Cents spent so far
    pub used: u64,
    /// Cents left, `None` when the budget is unbounded
    pub remaining: Option<u64>,
}

/// Payload for a one-shot budget warning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetWarning {
    /// Cents spent so far
    pub used: u64,
    /// Configured swarm budget in cents
    pub limit: u64,
    /// Percentage of the budget consumed
    pub percent_used: f64,
}

#[derive(Default)]
struct Ledgers {
    swarm: CostSummary,
    per_agent: HashMap<String, CostSummary>,
    per_node: HashMap<String, CostSummary>,
    warned: bool,
}

/// Thread-safe usage accounting for one run
///
/// Shared between the executor and parallel node tasks; all updates go
/// through one mutex so callers always observe consistent aggregates.
pub struct CostTracker {
    pricing: PricingTable,
    swarm_budget_cents: Option<u64>,
    agent_budget_cents: Option<u64>,
    ledgers: Mutex<Ledgers>,
}

impl CostTracker {
    /// Create a tracker with optional swarm and per-agent budgets
    pub fn new(
        pricing: PricingTable,
        swarm_budget_cents: Option<u64>,
        agent_budget_cents: Option<u64>,
    ) -> Self {
        Self {
            pricing,
            swarm_budget_cents,
            agent_budget_cents,
            ledgers: Mutex::new(Ledgers::default()),
        }
    }

    /// Record one call's usage; returns the cost charged in cents
    pub fn record(
        &self,
        agent_id: &str,
        node_id: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> u64 {
        let cost = self.pricing.cost_cents(model, input_tokens, output_tokens);

        let mut ledgers = self.ledgers.lock();
        ledgers.swarm.add(input_tokens, output_tokens, cost);
        ledgers
            .per_agent
            .entry(agent_id.to_string())
            .or_default()
            .add(input_tokens, output_tokens, cost);
        ledgers
            .per_node
            .entry(node_id.to_string())
            .or_default()
            .add(input_tokens, output_tokens, cost);

        cost
    }

    /// Swarm-wide totals
    pub fn totals(&self) -> CostSummary {
        self.ledgers.lock().swarm
    }

    /// Totals for one agent
    pub fn agent_total(&self, agent_id: &str) -> CostSummary {
        self.ledgers
            .lock()
            .per_agent
            .get(agent_id)
            .copied()
            .unwrap_or_default()
    }

    /// Totals for one node
    pub fn node_total(&self, node_id: &str) -> CostSummary {
        self.ledgers
            .lock()
            .per_node
            .get(node_id)
            .copied()
            .unwrap_or_default()
    }

    /// Check the swarm budget
    pub fn check_budget(&self) -> BudgetStatus {
        let used = self.ledgers.lock().swarm.cost_cents;
        match self.swarm_budget_cents {
            Some(limit) => BudgetStatus {
                ok: used <= limit,
                used,
                remaining: Some(limit.saturating_sub(used)),
            },
            None => BudgetStatus {
                ok: true,
                used,
                remaining: None,
            },
        }
    }

    /// The configured swarm budget, if any
    pub fn swarm_budget(&self) -> Option<u64> {
        self.swarm_budget_cents
    }

    /// Per-agent budget breach for `agent_id`, as `(used, limit)`
    pub fn agent_over_budget(&self, agent_id: &str) -> Option<(u64, u64)> {
        let limit = self.agent_budget_cents?;
        let used = self.agent_total(agent_id).cost_cents;
        (used > limit).then_some((used, limit))
    }

    /// One-shot warning when usage first crosses the warn threshold
    ///
    /// Returns `Some` exactly once per run; an unbounded budget never
    /// warns.
    pub fn take_warning(&self) -> Option<BudgetWarning> {
        let limit = self.swarm_budget_cents?;
        let mut ledgers = self.ledgers.lock();
        if ledgers.warned || limit == 0 {
            return None;
        }
        let used = ledgers.swarm.cost_cents;
        let percent_used = used as f64 / limit as f64 * 100.0;
        if percent_used >= WARN_FRACTION * 100.0 {
            ledgers.warned = true;
            Some(BudgetWarning {
                used,
                limit,
                percent_used,
            })
        } else {
            None
        }
    }
}

impl std::fmt::Debug for CostTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostTracker")
            .field("swarm_budget_cents", &self.swarm_budget_cents)
            .field("agent_budget_cents", &self.agent_budget_cents)
            .field("totals", &self.totals())
            .finish()
    }
}
