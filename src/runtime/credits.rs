//! Per-agent credit accounting with rollup to ancestors.

use std::sync::{Arc, Mutex};

use crate::contracts::CostSink;

#[derive(Debug, Default)]
struct Totals {
    total: f64,
    direct: f64,
}

/// Accumulates an agent's credit spend. Direct costs count toward both
/// `direct` and `total`; child costs only toward `total`. Every recorded
/// amount is forwarded to the parent sink, so the root ledger's total is the
/// whole tree's spend.
#[derive(Clone)]
pub(crate) struct CreditLedger {
    totals: Arc<Mutex<Totals>>,
    parent: Option<CostSink>,
}

impl CreditLedger {
    pub(crate) fn new(parent: Option<CostSink>) -> Self {
        Self {
            totals: Arc::new(Mutex::new(Totals::default())),
            parent,
        }
    }

    pub(crate) fn record_direct(&self, credits: f64) {
        {
            let mut totals = self.totals.lock().expect("credit ledger poisoned");
            totals.total += credits;
            totals.direct += credits;
        }
        if let Some(parent) = &self.parent {
            parent(credits);
        }
    }

    pub(crate) fn record_child(&self, credits: f64) {
        {
            let mut totals = self.totals.lock().expect("credit ledger poisoned");
            totals.total += credits;
        }
        if let Some(parent) = &self.parent {
            parent(credits);
        }
    }

    pub(crate) fn total(&self) -> f64 {
        self.totals.lock().expect("credit ledger poisoned").total
    }

    pub(crate) fn direct(&self) -> f64 {
        self.totals.lock().expect("credit ledger poisoned").direct
    }

    /// Sink for this agent's own LLM/tool costs.
    pub(crate) fn direct_sink(&self) -> CostSink {
        let ledger = self.clone();
        Arc::new(move |credits| ledger.record_direct(credits))
    }

    /// Sink handed to a spawned child; its spend rolls up without counting
    /// as this agent's direct spend.
    pub(crate) fn child_sink(&self) -> CostSink {
        let ledger = self.clone();
        Arc::new(move |credits| ledger.record_child(credits))
    }
}
