//! Search configuration, cancellation and per-budget result aggregation.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use dexalign_common::{BudgetResult, Modifier, RunStatus, ScaleIndex};

use crate::kappa::WeightedKappa;

/// Host callback fired once per completed budget. Returning `false`
/// requests cancellation.
pub type ResultCallback<'a> = &'a (dyn Fn(&BudgetResult) -> bool + Sync);

/// Cheap host callback polled during the search. Returning `true`
/// requests cancellation.
pub type InterruptCallback<'a> = &'a (dyn Fn() -> bool + Sync);

/// Which modifier set survives a kappa tie in the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// Whichever worker pushed first, as the historical behaviour has it.
    #[default]
    FirstWins,
    /// The lexicographically smallest modifier set, for run-to-run
    /// determinism across thread interleavings.
    SmallestModifierSet,
}

/// Knobs of one adjustment or prediction run.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Prune utility-table rows unreachable from the observations.
    pub reduce: bool,
    /// Cap on the modifier budget; zero or negative means the whitelist
    /// bound.
    pub limit: i64,
    /// Worker count; zero means the machine's available parallelism.
    pub threads: usize,
    /// Optional wall-clock budget for the whole run.
    pub time_limit: Option<Duration>,
    pub tie_break: TieBreak,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            reduce: true,
            limit: 0,
            threads: 1,
            time_limit: None,
            tie_break: TieBreak::default(),
        }
    }
}

impl SearchConfig {
    pub(crate) fn worker_count(&self) -> usize {
        if self.threads == 0 {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            self.threads
        }
    }

    pub(crate) fn budget_cap(&self, tuple_limit: usize) -> usize {
        if self.limit > 0 {
            (self.limit as usize).min(tuple_limit)
        } else {
            tuple_limit
        }
    }
}

const REASON_NONE: u8 = 0;
const REASON_HOST: u8 = 1;
const REASON_TIME: u8 = 2;

/// One shared stop flag plus the reason it was raised. Workers poll the
/// flag once per inner iteration.
#[derive(Debug, Default)]
pub(crate) struct CancelState {
    flag: AtomicBool,
    reason: AtomicU8,
}

impl CancelState {
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn cancel_host(&self) {
        self.reason
            .compare_exchange(REASON_NONE, REASON_HOST, Ordering::Relaxed, Ordering::Relaxed)
            .ok();
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn cancel_time(&self) {
        self.reason
            .compare_exchange(REASON_NONE, REASON_TIME, Ordering::Relaxed, Ordering::Relaxed)
            .ok();
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn status(&self) -> RunStatus {
        match self.reason.load(Ordering::Relaxed) {
            REASON_HOST => RunStatus::Cancelled,
            REASON_TIME => RunStatus::BudgetExceeded,
            _ => RunStatus::Completed,
        }
    }
}

/// What one worker found for one budget.
#[derive(Debug, Clone)]
pub(crate) struct WorkerReport {
    pub budget: usize,
    pub kappa: f64,
    pub updaters: Vec<Modifier>,
    pub kappa_computed: u64,
    pub function_computed: u64,
    pub seconds: f64,
    /// Prediction only: (alternative, cross-validated root value) pairs.
    pub predictions: Vec<(usize, ScaleIndex)>,
}

struct Slot {
    kappa: f64,
    updaters: Vec<Modifier>,
    kappa_computed: u64,
    function_computed: u64,
    seconds: f64,
    predictions: Vec<(usize, ScaleIndex)>,
    pending: usize,
}

impl Slot {
    fn new(pending: usize) -> Self {
        Self {
            kappa: f64::NEG_INFINITY,
            updaters: Vec::new(),
            kappa_computed: 0,
            function_computed: 0,
            seconds: 0.0,
            predictions: Vec::new(),
            pending,
        }
    }
}

enum Mode {
    /// Budget kappa is the best candidate kappa itself.
    Adjustment,
    /// Budget kappa is recomputed over the assembled cross-validated
    /// predictions against these observations.
    Prediction { observed: Vec<ScaleIndex> },
}

/// Collects worker reports per budget behind one mutex, seals a budget
/// when its last worker reports and forwards the sealed result to the
/// host callback.
pub(crate) struct Aggregator<'a> {
    inner: Mutex<Inner>,
    cancel: &'a CancelState,
    on_result: Option<ResultCallback<'a>>,
    tie_break: TieBreak,
    start: Instant,
}

struct Inner {
    slots: Vec<Slot>,
    sealed: Vec<BudgetResult>,
    kappa: WeightedKappa,
    mode: Mode,
}

impl<'a> Aggregator<'a> {
    pub fn adjustment(
        budgets: usize,
        workers: usize,
        nc: usize,
        cancel: &'a CancelState,
        on_result: Option<ResultCallback<'a>>,
        tie_break: TieBreak,
    ) -> Self {
        Self::new(budgets, workers, nc, cancel, on_result, tie_break, Mode::Adjustment)
    }

    pub fn prediction(
        budgets: usize,
        workers: usize,
        nc: usize,
        observed: Vec<ScaleIndex>,
        cancel: &'a CancelState,
        on_result: Option<ResultCallback<'a>>,
        tie_break: TieBreak,
    ) -> Self {
        Self::new(
            budgets,
            workers,
            nc,
            cancel,
            on_result,
            tie_break,
            Mode::Prediction { observed },
        )
    }

    fn new(
        budgets: usize,
        workers: usize,
        nc: usize,
        cancel: &'a CancelState,
        on_result: Option<ResultCallback<'a>>,
        tie_break: TieBreak,
        mode: Mode,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: (0..budgets).map(|_| Slot::new(workers)).collect(),
                sealed: Vec::with_capacity(budgets),
                kappa: WeightedKappa::new(nc),
                mode,
            }),
            cancel,
            on_result,
            tie_break,
            start: Instant::now(),
        }
    }

    /// Merge one worker's report. The last report of a budget seals it.
    pub fn push(&self, report: WorkerReport) {
        debug_assert!(report.budget >= 1);

        let sealed = {
            let mut inner = self.inner.lock();
            let slot = &mut inner.slots[report.budget - 1];

            slot.kappa_computed += report.kappa_computed;
            slot.function_computed += report.function_computed;
            slot.seconds = slot.seconds.max(report.seconds);
            slot.predictions.extend_from_slice(&report.predictions);

            let replace = report.kappa > slot.kappa
                || (self.tie_break == TieBreak::SmallestModifierSet
                    && report.kappa == slot.kappa
                    && report.updaters < slot.updaters);
            if replace {
                slot.kappa = report.kappa;
                slot.updaters = report.updaters;
            }

            tracing::info!(
                budget = report.budget,
                kappa = slot.kappa,
                loops = slot.kappa_computed,
                elapsed = self.start.elapsed().as_secs_f64(),
                updaters = ?slot.updaters,
                "search"
            );

            slot.pending -= 1;
            if slot.pending == 0 { Some(inner.seal(report.budget)) } else { None }
        };

        if let Some(result) = sealed
            && let Some(callback) = self.on_result
            && !callback(&result)
        {
            self.cancel.cancel_host();
        }
    }

    /// Per-budget results that were sealed, in budget order.
    pub fn into_results(self) -> Vec<BudgetResult> {
        let mut inner = self.inner.into_inner();
        inner.sealed.sort_by_key(|result| result.budget);
        inner.sealed
    }
}

impl Inner {
    fn seal(&mut self, budget: usize) -> BudgetResult {
        let slot = &mut self.slots[budget - 1];
        let mut kappa = slot.kappa;
        let mut kappa_computed = slot.kappa_computed;
        let seconds = slot.seconds;
        let function_computed = slot.function_computed;
        let predictions = std::mem::take(&mut slot.predictions);
        let modifiers = std::mem::take(&mut slot.updaters);

        if let Mode::Prediction { ref observed } = self.mode {
            let mut simulated: Vec<ScaleIndex> = vec![0; observed.len()];
            for &(index, value) in &predictions {
                simulated[index] = value;
            }
            kappa = self.kappa.squared(observed, &simulated);
            kappa_computed += 1;
        }

        let result = BudgetResult {
            budget: budget as u32,
            kappa,
            seconds,
            kappa_computed,
            function_computed,
            modifiers,
        };
        self.sealed.push(result.clone());
        result
    }
}
