//! Leave-related-rows-out calibration: each alternative is scored by the
//! table perturbation that best reproduces its learning set (the related
//! alternatives), then predicted under that perturbation. The budget's
//! headline kappa compares observations against the assembled
//! cross-validated predictions.

use std::time::Instant;

use rustc_hash::FxHashMap;

use dexalign_common::{
    Error, ErrorKind, Modifier, Options, RunOutcome, RunStatus, ScaleIndex,
};
use dexalign_model::Model;

use crate::adjustment::{baseline_result, build_pool};
use crate::explorer::ModelExplorer;
use crate::kappa::WeightedKappa;
use crate::results::{
    Aggregator, CancelState, InterruptCallback, ResultCallback, SearchConfig, WorkerReport,
};

/// The best table snapshot found for one learning set; alternatives with
/// the same reduction key reuse it without searching again.
#[derive(Clone)]
struct CachedSearch {
    kappa: f64,
    functions: Vec<Vec<ScaleIndex>>,
    updaters: Vec<Modifier>,
}

/// Run the prediction search.
pub fn prediction(
    model: &Model,
    options: &Options,
    config: &SearchConfig,
    on_result: Option<ResultCallback>,
    on_interrupt: Option<InterruptCallback>,
) -> Result<RunOutcome, Error> {
    let mut master = ModelExplorer::new(model)?;
    master.check_options(options)?;
    if !options.have_subdataset() {
        return Err(Error::new(ErrorKind::OptionsInconsistent)
            .with_message("an alternative has an empty learning set"));
    }
    if config.reduce {
        master.reduce(options);
    }

    let nc = master.solver().root_scale_size();
    let workers = config.worker_count();
    let max_step = config.budget_cap(master.attribute_line_tuple_limit());
    let cancel = CancelState::default();
    let deadline = config.time_limit.map(|limit| Instant::now() + limit);

    tracing::info!(workers, max_step, reduce = config.reduce, "prediction");

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

    let aggregator = Aggregator::prediction(
        max_step,
        workers,
        nc,
        options.observed.clone(),
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
                prediction_worker(
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
fn prediction_worker(
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

    // Learning-set scratch, sized once to the largest subdataset.
    let capacity = (0..rows)
        .map(|index| options.subdataset(index).len())
        .max()
        .unwrap_or(0);
    let mut sub_observed: Vec<ScaleIndex> = Vec::with_capacity(capacity);
    let mut sub_simulated: Vec<ScaleIndex> = Vec::with_capacity(capacity);

    for step in 1..=max_step {
        if cancel.is_set() {
            return;
        }

        let begin = Instant::now();
        let mut cache: FxHashMap<usize, CachedSearch> = FxHashMap::default();
        let mut predictions: Vec<(usize, ScaleIndex)> = Vec::new();
        let mut best_kappa = f64::NEG_INFINITY;
        let mut best_updaters: Vec<Modifier> = Vec::new();
        let mut loops = 0u64;
        let mut evaluations = 0u64;

        let mut alternative = thread_id;
        while alternative < rows {
            if cancel.is_set() {
                return;
            }

            let key = options.reduction_key(alternative);
            let hit = cache.get(&key).cloned();
            let search = match hit {
                Some(found) => found,
                None => {
                    let Some(found) = search_alternative(
                        &mut explorer,
                        options,
                        alternative,
                        step,
                        &baseline,
                        &mut kappa_c,
                        &mut sub_observed,
                        &mut sub_simulated,
                        &mut loops,
                        &mut evaluations,
                        deadline,
                        on_interrupt,
                        thread_id,
                        cancel,
                    ) else {
                        return;
                    };
                    cache.insert(key, found.clone());
                    found
                }
            };

            explorer.set_functions(&search.functions);
            let predicted = explorer.solve(options.row(alternative));
            evaluations += 1;
            predictions.push((alternative, predicted));

            if search.kappa > best_kappa {
                best_kappa = search.kappa;
                best_updaters = search.updaters;
            }

            alternative += thread_count;
        }

        aggregator.push(WorkerReport {
            budget: step,
            kappa: best_kappa,
            updaters: best_updaters,
            kappa_computed: loops,
            function_computed: evaluations,
            seconds: begin.elapsed().as_secs_f64(),
            predictions,
        });
    }
}

/// Full walk for one alternative over its learning set. `None` means the
/// cancellation flag fired mid-walk.
#[allow(clippy::too_many_arguments)]
fn search_alternative(
    explorer: &mut ModelExplorer,
    options: &Options,
    alternative: usize,
    step: usize,
    baseline: &[Vec<ScaleIndex>],
    kappa_c: &mut WeightedKappa,
    sub_observed: &mut Vec<ScaleIndex>,
    sub_simulated: &mut Vec<ScaleIndex>,
    loops: &mut u64,
    evaluations: &mut u64,
    deadline: Option<Instant>,
    on_interrupt: Option<InterruptCallback>,
    thread_id: usize,
    cancel: &CancelState,
) -> Option<CachedSearch> {
    let members = options.subdataset(alternative);
    sub_observed.clear();
    sub_observed.extend(members.iter().map(|&member| options.observed[member]));

    let mut best = CachedSearch {
        kappa: f64::NEG_INFINITY,
        functions: baseline.to_vec(),
        updaters: Vec::new(),
    };

    explorer.set_functions(baseline);
    if !explorer.init_walkers(step) {
        return Some(best);
    }

    loop {
        explorer.init_next_value();
        loop {
            if cancel.is_set() {
                return None;
            }
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                cancel.cancel_time();
                return None;
            }
            if let Some(interrupt) = on_interrupt
                && thread_id == 0
                && *loops % 1024 == 0
                && interrupt()
            {
                cancel.cancel_host();
                return None;
            }

            sub_simulated.clear();
            sub_simulated.extend(
                members
                    .iter()
                    .map(|&member| explorer.solve(options.row(member))),
            );
            *evaluations += members.len() as u64;
            let kappa = kappa_c.squared(sub_observed, sub_simulated);
            *loops += 1;

            if kappa > best.kappa {
                best.kappa = kappa;
                best.functions = explorer.functions();
                best.updaters = explorer.updaters();
            }

            if !explorer.next_value() {
                break;
            }
        }
        if !explorer.next_line() {
            break;
        }
    }

    Some(best)
}
