//! Enumeration of utility-table modifications.
//!
//! For a budget of `k` simultaneous modifications, `k` walkers hold
//! (aggregate, whitelist-row) positions kept strictly increasing in
//! lexicographic order, so no two walkers ever edit the same cell and no
//! combination is produced twice. The inner sweep steps the touched cells
//! through their scale values; the outer sweep advances the walker
//! positions.

use std::collections::BTreeSet;

use dexalign_common::{Error, Modifier, Options, ScaleIndex};
use dexalign_model::Model;

use crate::solver::SolverStack;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LineUpdater {
    attribute: usize,
    /// Index into the attribute's whitelist, not a table row.
    line: usize,
}

/// A [`SolverStack`] together with per-aggregate row whitelists and the
/// walker state of the current budget.
#[derive(Debug, Clone)]
pub struct ModelExplorer {
    solver: SolverStack,
    updaters: Vec<LineUpdater>,
    whitelist: Vec<Vec<u32>>,
}

impl ModelExplorer {
    /// Compile the model and enable every table row (the `full` mode);
    /// call [`Self::reduce`] to prune.
    pub fn new(model: &Model) -> Result<Self, Error> {
        let solver = SolverStack::new(model)?;
        let mut explorer = Self {
            solver,
            updaters: Vec::new(),
            whitelist: Vec::new(),
        };
        explorer.full();
        Ok(explorer)
    }

    /// Enable every row of every aggregate.
    pub fn full(&mut self) {
        self.whitelist = (0..self.solver.attribute_count())
            .map(|att| (0..self.solver.function_size(att) as u32).collect())
            .collect();
    }

    /// Keep only the rows some observed alternative can reach.
    pub fn reduce(&mut self, options: &Options) {
        let mut sets: Vec<BTreeSet<u32>> = vec![BTreeSet::new(); self.solver.attribute_count()];
        for index in 0..options.rows() {
            self.solver.reduce(options.row(index), &mut sets);
        }

        self.whitelist = sets
            .into_iter()
            .map(|set| set.into_iter().collect())
            .collect();

        for (att, rows) in self.whitelist.iter().enumerate() {
            tracing::debug!(
                attribute = att,
                kept = rows.len(),
                total = self.solver.function_size(att),
                "whitelist"
            );
        }
    }

    pub fn solver(&self) -> &SolverStack {
        &self.solver
    }

    pub fn solve(&mut self, row: &[ScaleIndex]) -> ScaleIndex {
        self.solver.solve(row)
    }

    pub fn check_options(&self, options: &Options) -> Result<(), Error> {
        self.solver.check_options(options)
    }

    pub fn set_functions(&mut self, functions: &[Vec<ScaleIndex>]) {
        self.solver.set_functions(functions);
    }

    pub fn functions(&self) -> Vec<Vec<ScaleIndex>> {
        self.solver.functions()
    }

    /// Total number of whitelisted cells: the upper bound on the budget.
    pub fn attribute_line_tuple_limit(&self) -> usize {
        self.whitelist.iter().map(Vec::len).sum()
    }

    /// Move to the next whitelisted position at or after the given one.
    fn seek(&self, attribute: &mut usize, line: &mut usize) -> bool {
        while *attribute < self.whitelist.len() {
            if *line < self.whitelist[*attribute].len() {
                return true;
            }
            *attribute += 1;
            *line = 0;
        }
        false
    }

    /// Step one position forward in ((attribute, line)) order.
    fn advance(&self, attribute: &mut usize, line: &mut usize) -> bool {
        *line += 1;
        self.seek(attribute, line)
    }

    /// Place `count` walkers on the first `count` whitelisted positions.
    /// False when fewer positions exist.
    pub fn init_walkers(&mut self, count: usize) -> bool {
        debug_assert!(count > 0);
        self.updaters.clear();
        self.updaters.resize(count, LineUpdater::default());

        let mut attribute = 0;
        let mut line = 0;
        if !self.seek(&mut attribute, &mut line) {
            return false;
        }
        self.updaters[0] = LineUpdater { attribute, line };

        for index in 1..count {
            if !self.advance(&mut attribute, &mut line) {
                return false;
            }
            self.updaters[index] = LineUpdater { attribute, line };
        }
        true
    }

    /// Restore the baseline tables and clear every walker cell, starting a
    /// fresh inner sweep for the current positions.
    pub fn init_next_value(&mut self) {
        self.solver.reinit();
        for index in 0..self.updaters.len() {
            let (attribute, row) = self.cell(index);
            self.solver.value_clear(attribute, row);
        }
    }

    /// Advance the inner sweep: step the last walker's cell, carrying to
    /// earlier walkers on overflow. False once every combination of the
    /// current positions has been produced.
    pub fn next_value(&mut self) -> bool {
        debug_assert!(!self.updaters.is_empty());
        let mut index = self.updaters.len() - 1;

        loop {
            let (attribute, row) = self.cell(index);
            if (self.solver.value(attribute, row) as usize) + 1 < self.solver.scale_size(attribute)
            {
                self.solver.value_increase(attribute, row);
                return true;
            }
            if index == 0 {
                return false;
            }
            self.solver.value_clear(attribute, row);
            index -= 1;
        }
    }

    /// Advance the outer sweep: move the last walker one position,
    /// repositioning every follower just after it; when a walker cannot
    /// advance the carry moves to the one before it. A follower running
    /// past the last position exhausts the sweep.
    pub fn next_line(&mut self) -> bool {
        debug_assert!(!self.updaters.is_empty());
        let mut index = self.updaters.len() - 1;

        loop {
            let mut attribute = self.updaters[index].attribute;
            let mut line = self.updaters[index].line;
            if self.advance(&mut attribute, &mut line) {
                self.updaters[index] = LineUpdater { attribute, line };
                for follower in index + 1..self.updaters.len() {
                    if !self.advance(&mut attribute, &mut line) {
                        return false;
                    }
                    self.updaters[follower] = LineUpdater { attribute, line };
                }
                return true;
            }
            if index == 0 {
                return false;
            }
            index -= 1;
        }
    }

    /// Snapshot of the touched cells with their current values.
    pub fn updaters(&self) -> Vec<Modifier> {
        self.updaters
            .iter()
            .enumerate()
            .map(|(index, updater)| {
                let (attribute, row) = self.cell(index);
                Modifier {
                    attribute: updater.attribute as u32,
                    row: row as u32,
                    value: self.solver.value(attribute, row),
                }
            })
            .collect()
    }

    fn cell(&self, index: usize) -> (usize, usize) {
        let updater = self.updaters[index];
        (
            updater.attribute,
            self.whitelist[updater.attribute][updater.line] as usize,
        )
    }
}
