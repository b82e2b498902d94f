//! Train-and-test-on-the-same-set calibration: for each modifier budget,
//! find the table perturbation that maximises squared weighted kappa over
//! the whole observation set.

use std::time::Instant;

use dexalign_common::{
    BudgetResult, Error, ErrorKind, Modifier, Options, RunOutcome, RunStatus, ScaleIndex,
};
use dexalign_model::Model;

use crate::explorer::ModelExplorer;
use crate::kappa::WeightedKappa;
use crate::results::{
    Aggregator, CancelState, InterruptCallback, ResultCallback, SearchConfig, WorkerReport,
};

pub(crate) fn build_pool(workers: usize) -> Result<rayon::ThreadPool, Error> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|source| {
            Error::new(ErrorKind::FileAccess)
                .with_message(format!("cannot build the worker pool: {source}"))
        })
}

/// Evaluate the unmodified model over every alternative: the budget-0
/// result shared by both drivers.
pub(crate) fn baseline_result(
    explorer: &mut ModelExplorer,
    options: &Options,
    kappa: &mut WeightedKappa,
) -> BudgetResult {
    let begin = Instant::now();
    let mut simulated: Vec<ScaleIndex> = Vec::with_capacity(options.rows());
    for index in 0..options.rows() {
        simulated.push(explorer.solve(options.row(index)));
    }
    BudgetResult {
        budget: 0,
        kappa: kappa.squared(&options.observed, &simulated),
        seconds: begin.elapsed().as_secs_f64(),
        kappa_computed: 1,
        function_computed: options.rows() as u64,
        modifiers: Vec::new(),
    }
}

/// Run the adjustment search.
pub fn adjustment(
    model: &Model,
    options: &Options,
    config: &SearchConfig,
    on_result: Option<ResultCallback>,
    on_interrupt: Option<InterruptCallback>,
) -> Result<RunOutcome, Error> {
    let mut master = ModelExplorer::new(model)?;
    master.check_options(options)?;
    if config.reduce {
        master.reduce(options);
    }

    let nc = master.solver().root_scale_size();
    let workers = config.worker_count();
    let max_step = config.budget_cap(master.attribute_line_tuple_limit());
    let cancel = CancelState::default();
    let deadline = config.time_limit.map(|limit| Instant::now() + limit);

    tracing::info!(workers, max_step, reduce = config.reduce, "adjustment");

    let baseline = {
        let mut kappa = WeightedKappa::new(nc);
        baseline_result(&mut master, options, &mut kappa)
    };
    if let Some(callback) = on_result
        && !callback(&baseline)
    {
        return Ok(RunOutcome {
            results: vec![baseline],
            status: RunStatus::Cancelled,
        });
    }

    let aggregator = Aggregator::adjustment(
        max_step,
        workers,
        nc,
        &cancel,
        on_result,
        config.tie_break,
    );

    let pool = build_pool(workers)?;
    pool.scope(|scope| {
        for thread_id in 0..workers {
            let master = &master;
            let aggregator = &aggregator;
            let cancel = &cancel;
            scope.spawn(move |_| {
                adjustment_worker(
                    master,
                    options,
                    thread_id,
                    workers,
                    max_step,
                    nc,
                    deadline,
                    on_interrupt,
                    cancel,
                    aggregator,
                );
            });
        }
    });

    let mut results = vec![baseline];
    results.extend(aggregator.into_results());
    Ok(RunOutcome {
        results,
        status: cancel.status(),
    })
}

#[allow(clippy::too_many_arguments)]
fn adjustment_worker(
    master: &ModelExplorer,
    options: &Options,
    thread_id: usize,
    thread_count: usize,
    max_step: usize,
    nc: usize,
    deadline: Option<Instant>,
    on_interrupt: Option<InterruptCallback>,
    cancel: &CancelState,
    aggregator: &Aggregator,
) {
    let mut explorer = master.clone();
    let mut kappa_c = WeightedKappa::new(nc);
    let baseline = explorer.functions();
    let rows = options.rows();
    let mut simulated: Vec<ScaleIndex> = vec![0; rows];

    for step in 1..=max_step {
        if cancel.is_set() {
            return;
        }

        let begin = Instant::now();
        let mut best_kappa = f64::NEG_INFINITY;
        let mut best_updaters: Vec<Modifier> = Vec::new();
        let mut loops = 0u64;
        let mut evaluations = 0u64;

        explorer.set_functions(&baseline);
        let mut live = explorer.init_walkers(step);

        // Offset this worker into its stride of the line sequence.
        for _ in 0..thread_id {
            if !live {
                break;
            }
            live = explorer.next_line();
        }

        while live {
            explorer.init_next_value();
            loop {
                if cancel.is_set() {
                    return;
                }
                if let Some(deadline) = deadline
                    && Instant::now() >= deadline
                {
                    cancel.cancel_time();
                    return;
                }
                if let Some(interrupt) = on_interrupt
                    && thread_id == 0
                    && loops % 1024 == 0
                    && interrupt()
                {
                    cancel.cancel_host();
                    return;
                }

                for (index, value) in simulated.iter_mut().enumerate() {
                    *value = explorer.solve(options.row(index));
                }
                evaluations += rows as u64;
                let kappa = kappa_c.squared(&options.observed, &simulated);
                loops += 1;

                if kappa > best_kappa {
                    best_kappa = kappa;
                    best_updaters = explorer.updaters();
                }

                if !explorer.next_value() {
                    break;
                }
            }

            for _ in 0..thread_count {
                if !explorer.next_line() {
                    live = false;
                    break;
                }
            }
        }

        aggregator.push(WorkerReport {
            budget: step,
            kappa: best_kappa,
            updaters: best_updaters,
            kappa_computed: loops,
            function_computed: evaluations,
            seconds: begin.elapsed().as_secs_f64(),
            predictions: Vec::new(),
        });
    }
}
