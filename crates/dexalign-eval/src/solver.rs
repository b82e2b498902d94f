//! The stack evaluator.
//!
//! The model compiles into a reverse-Polish program over blocks: an input
//! block pushes one column of the current observation row, an aggregate
//! block pops its children, forms the utility-table row index from
//! precomputed mixed-radix coefficients and pushes the table cell. One
//! value remains after the last block: the root value.
//!
//! Table integrity (digit range, row counts, scale sizes) is checked once
//! at construction; the evaluation loop itself never allocates and never
//! fails.

use std::collections::BTreeSet;

use smallvec::SmallVec;

use dexalign_common::{Error, ErrorKind, Options, ScaleIndex, is_valid_scale_size};
use dexalign_model::Model;

use crate::kappa::WeightedKappa;

/// Marker used by the symbolic whitelist pass for a value produced by a
/// nested aggregate rather than read from the observation row.
const UNKNOWN: i16 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    /// Push this column of the observation row.
    Input(usize),
    /// Pop the children of this aggregate and push its table cell.
    Aggregate(usize),
}

/// One aggregate attribute, compiled: mixed-radix coefficients over its
/// children (last child is least significant) and the utility table as
/// mutable digits next to their pristine baseline.
#[derive(Debug, Clone)]
pub struct AggregateFunction {
    /// Index of this aggregate in [`Model::attributes`].
    pub attribute: usize,
    coeffs: Vec<u32>,
    child_sizes: Vec<u8>,
    functions: Vec<ScaleIndex>,
    saved: Vec<ScaleIndex>,
    scale: u8,
}

impl AggregateFunction {
    fn new(model: &Model, attribute: usize) -> Result<Self, Error> {
        let node = &model.attributes[attribute];
        let invariant = |message: String| {
            Error::new(ErrorKind::EvaluatorInvariant)
                .with_message(format!("attribute `{}': {message}", node.name))
        };

        if !is_valid_scale_size(node.scale_size()) {
            return Err(invariant("bad scale size".to_string()).with_size(node.scale_size()));
        }

        let mut child_sizes = Vec::with_capacity(node.children.len());
        for &child in &node.children {
            let size = model.attributes[child].scale_size();
            if !is_valid_scale_size(size) {
                return Err(invariant("bad child scale size".to_string()).with_size(size));
            }
            child_sizes.push(size as u8);
        }

        let mut rows = 1usize;
        for &size in &child_sizes {
            rows = rows
                .checked_mul(size as usize)
                .ok_or_else(|| invariant("utility table too large".to_string()))?;
        }

        let mut functions = Vec::with_capacity(rows);
        for digit in node.function.low.bytes() {
            if !digit.is_ascii_digit() || (digit - b'0') as usize >= node.scale_size() {
                return Err(invariant(format!(
                    "utility digit `{}' outside the scale",
                    digit as char
                )));
            }
            functions.push(digit - b'0');
        }
        if functions.len() != rows {
            return Err(invariant(format!(
                "utility table holds {} cells, expected {rows}",
                functions.len()
            )));
        }

        let mut coeffs = vec![0u32; child_sizes.len()];
        if let Some(last) = coeffs.last_mut() {
            *last = 1;
        }
        for i in (0..child_sizes.len().saturating_sub(1)).rev() {
            coeffs[i] = child_sizes[i + 1] as u32 * coeffs[i + 1];
        }

        Ok(Self {
            attribute,
            coeffs,
            child_sizes,
            saved: functions.clone(),
            functions,
            scale: node.scale_size() as u8,
        })
    }

    pub fn arity(&self) -> usize {
        self.coeffs.len()
    }

    pub fn rows(&self) -> usize {
        self.functions.len()
    }

    pub fn scale_size(&self) -> usize {
        self.scale as usize
    }

    fn restore(&mut self) {
        self.functions.copy_from_slice(&self.saved);
    }
}

/// The compiled model: the block program plus per-aggregate state.
#[derive(Debug, Clone)]
pub struct SolverStack {
    atts: Vec<AggregateFunction>,
    program: Vec<Block>,
    input_sizes: Vec<u8>,
    stack: SmallVec<[i16; 32]>,
}

impl SolverStack {
    pub fn new(model: &Model) -> Result<Self, Error> {
        if model.is_empty() {
            return Err(Error::new(ErrorKind::EvaluatorInvariant).with_message("empty model"));
        }

        let mut solver = Self {
            atts: Vec::new(),
            program: Vec::new(),
            input_sizes: Vec::new(),
            stack: SmallVec::new(),
        };
        solver.compile(model, 0)?;
        Ok(solver)
    }

    fn compile(&mut self, model: &Model, attribute: usize) -> Result<(), Error> {
        let node = &model.attributes[attribute];
        if node.is_basic() {
            if !is_valid_scale_size(node.scale_size()) {
                return Err(Error::new(ErrorKind::EvaluatorInvariant)
                    .with_message(format!("attribute `{}': bad scale size", node.name))
                    .with_size(node.scale_size()));
            }
            self.program.push(Block::Input(self.input_sizes.len()));
            self.input_sizes.push(node.scale_size() as u8);
        } else {
            for &child in &node.children {
                self.compile(model, child)?;
            }
            self.atts.push(AggregateFunction::new(model, attribute)?);
            self.program.push(Block::Aggregate(self.atts.len() - 1));
        }
        Ok(())
    }

    pub fn attribute_count(&self) -> usize {
        self.atts.len()
    }

    pub fn input_count(&self) -> usize {
        self.input_sizes.len()
    }

    pub fn aggregate(&self, id: usize) -> &AggregateFunction {
        &self.atts[id]
    }

    /// Scale size of the root attribute: the confusion-matrix dimension.
    pub fn root_scale_size(&self) -> usize {
        self.atts.last().map_or_else(
            || self.input_sizes.first().map_or(0, |s| *s as usize),
            |att| att.scale_size(),
        )
    }

    pub fn function_size(&self, attribute: usize) -> usize {
        self.atts[attribute].rows()
    }

    pub fn scale_size(&self, attribute: usize) -> usize {
        self.atts[attribute].scale_size()
    }

    pub fn value(&self, attribute: usize, row: usize) -> ScaleIndex {
        self.atts[attribute].functions[row]
    }

    pub fn default_value(&self, attribute: usize, row: usize) -> ScaleIndex {
        self.atts[attribute].saved[row]
    }

    pub fn value_restore(&mut self, attribute: usize, row: usize) {
        self.atts[attribute].functions[row] = self.atts[attribute].saved[row];
    }

    pub fn value_set(&mut self, attribute: usize, row: usize, value: ScaleIndex) {
        debug_assert!((value as usize) < self.atts[attribute].scale_size());
        self.atts[attribute].functions[row] = value;
    }

    pub fn value_increase(&mut self, attribute: usize, row: usize) {
        self.atts[attribute].functions[row] += 1;
        debug_assert!(
            (self.atts[attribute].functions[row] as usize) < self.atts[attribute].scale_size()
        );
    }

    pub fn value_clear(&mut self, attribute: usize, row: usize) {
        self.atts[attribute].functions[row] = 0;
    }

    /// Restore every utility table to its baseline.
    pub fn reinit(&mut self) {
        for att in &mut self.atts {
            att.restore();
        }
    }

    /// Replace both the working tables and the baseline snapshot.
    pub fn set_functions(&mut self, functions: &[Vec<ScaleIndex>]) {
        debug_assert_eq!(functions.len(), self.atts.len());
        for (att, table) in self.atts.iter_mut().zip(functions) {
            debug_assert_eq!(att.functions.len(), table.len());
            att.functions.copy_from_slice(table);
            att.saved.copy_from_slice(table);
        }
    }

    /// Snapshot the working tables.
    pub fn functions(&self) -> Vec<Vec<ScaleIndex>> {
        self.atts.iter().map(|att| att.functions.clone()).collect()
    }

    /// Evaluate one observation row to the root value.
    pub fn solve(&mut self, row: &[ScaleIndex]) -> ScaleIndex {
        debug_assert_eq!(row.len(), self.input_sizes.len());
        self.stack.clear();

        for block in &self.program {
            match *block {
                Block::Input(column) => self.stack.push(row[column] as i16),
                Block::Aggregate(index) => {
                    let att = &self.atts[index];
                    let base = self.stack.len() - att.coeffs.len();
                    let mut id = 0usize;
                    for (i, &coeff) in att.coeffs.iter().enumerate() {
                        let value = self.stack[base + i];
                        debug_assert!((0..att.child_sizes[i] as i16).contains(&value));
                        id += coeff as usize * value as usize;
                    }
                    self.stack.truncate(base);
                    self.stack.push(att.functions[id] as i16);
                }
            }
        }

        debug_assert_eq!(self.stack.len(), 1);
        self.stack[0] as ScaleIndex
    }

    /// Evaluate one row while recording every aggregate's value, in the
    /// children-first aggregate order. Used when embedding evaluated
    /// alternatives back into a model file.
    pub fn solve_trace(&mut self, row: &[ScaleIndex], trace: &mut Vec<ScaleIndex>) -> ScaleIndex {
        trace.clear();
        self.stack.clear();

        for block in &self.program {
            match *block {
                Block::Input(column) => self.stack.push(row[column] as i16),
                Block::Aggregate(index) => {
                    let att = &self.atts[index];
                    let base = self.stack.len() - att.coeffs.len();
                    let mut id = 0usize;
                    for (i, &coeff) in att.coeffs.iter().enumerate() {
                        id += coeff as usize * self.stack[base + i] as usize;
                    }
                    self.stack.truncate(base);
                    let value = att.functions[id];
                    trace.push(value);
                    self.stack.push(value as i16);
                }
            }
        }

        debug_assert_eq!(self.stack.len(), 1);
        self.stack[0] as ScaleIndex
    }

    /// Symbolic pass of the whitelist reducer: aggregate children
    /// contribute an unknown marker, and every concrete expansion of the
    /// markers records its table row as reachable.
    pub fn reduce(&mut self, row: &[ScaleIndex], whitelist: &mut [BTreeSet<u32>]) {
        debug_assert_eq!(whitelist.len(), self.atts.len());
        self.stack.clear();

        for block_index in 0..self.program.len() {
            match self.program[block_index] {
                Block::Input(column) => self.stack.push(row[column] as i16),
                Block::Aggregate(index) => {
                    let att = &self.atts[index];
                    let base = self.stack.len() - att.coeffs.len();

                    let mut values: SmallVec<[i16; 16]> =
                        SmallVec::from_slice(&self.stack[base..]);
                    let mut markers: SmallVec<[usize; 16]> = SmallVec::new();
                    for (i, value) in values.iter_mut().enumerate() {
                        if *value == UNKNOWN {
                            markers.push(i);
                            *value = 0;
                        }
                    }

                    let target = &mut whitelist[index];
                    'expansion: loop {
                        let mut id = 0u32;
                        for (i, &coeff) in att.coeffs.iter().enumerate() {
                            id += coeff * values[i] as u32;
                        }
                        target.insert(id);

                        let mut position = markers.len();
                        loop {
                            if position == 0 {
                                break 'expansion;
                            }
                            position -= 1;
                            let column = markers[position];
                            values[column] += 1;
                            if values[column] < att.child_sizes[column] as i16 {
                                break;
                            }
                            values[column] = 0;
                        }
                    }

                    self.stack.truncate(base);
                    self.stack.push(UNKNOWN);
                }
            }
        }

        debug_assert_eq!(self.stack.len(), 1);
    }

    /// Verify that an observation set fits this model: column count, value
    /// ranges and observed root values.
    pub fn check_options(&self, options: &Options) -> Result<(), Error> {
        if options.is_empty() {
            return Err(Error::new(ErrorKind::OptionsInconsistent)
                .with_message("the observation set is empty"));
        }
        if options.columns() != self.input_sizes.len() {
            return Err(Error::new(ErrorKind::OptionsInconsistent)
                .with_message("observation width differs from the basic attribute count")
                .with_size(options.columns()));
        }
        let root = self.root_scale_size();
        for index in 0..options.rows() {
            for (column, &value) in options.row(index).iter().enumerate() {
                if value as usize >= self.input_sizes[column] as usize {
                    return Err(Error::new(ErrorKind::OptionsInconsistent)
                        .with_message("observation value outside the attribute scale")
                        .with_location(index as u64 + 1, column as u64 + 1));
                }
            }
            if options.observed[index] as usize >= root {
                return Err(Error::new(ErrorKind::OptionsInconsistent)
                    .with_message("observed value outside the root scale")
                    .with_location(index as u64 + 1, 0));
            }
        }
        Ok(())
    }
}

/// Per-row evaluation of an observation set, with both kappa variants and
/// the confusion matrix over the root scale.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub simulated: Vec<ScaleIndex>,
    pub observed: Vec<ScaleIndex>,
    /// `confusion[observed][simulated]`, counts.
    pub confusion: Vec<Vec<u32>>,
    pub linear_kappa: f64,
    pub squared_kappa: f64,
}

/// Evaluate every alternative against the unmodified model.
pub fn evaluate(model: &Model, options: &Options) -> Result<Evaluation, Error> {
    let mut solver = SolverStack::new(model)?;
    solver.check_options(options)?;

    let nc = solver.root_scale_size();
    let rows = options.rows();
    let mut simulated = Vec::with_capacity(rows);
    let mut confusion = vec![vec![0u32; nc]; nc];

    for index in 0..rows {
        let value = solver.solve(options.row(index));
        confusion[options.observed[index] as usize][value as usize] += 1;
        simulated.push(value);
    }

    let mut kappa = WeightedKappa::new(nc);
    Ok(Evaluation {
        squared_kappa: kappa.squared(&options.observed, &simulated),
        linear_kappa: kappa.linear(&options.observed, &simulated),
        simulated,
        observed: options.observed.clone(),
        confusion,
    })
}
