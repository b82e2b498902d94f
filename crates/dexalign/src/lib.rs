//! DEX hierarchical multi-attribute evaluation with inverse calibration:
//! search small perturbations of a model's utility tables for the one
//! that best reproduces an observed data set, scored by weighted Cohen's
//! kappa.
//!
//! The crate is a facade over the workspace: [`dexalign_model`] parses
//! and writes DEXi documents, [`dexalign_io`] handles observation CSV
//! files, [`dexalign_eval`] evaluates and searches. [`api`] wires them
//! into the path-based operations most callers want.

pub mod api;

pub use api::{
    ModelInfo, adjustment, evaluate, extract_options, information, merge_options, prediction,
};

pub use dexalign_common::{
    BudgetResult, Error, ErrorKind, Modifier, Options, RelationRule, RunOutcome, RunStatus,
    ScaleIndex,
};
pub use dexalign_eval::{
    Evaluation, InterruptCallback, ModelExplorer, ResultCallback, SearchConfig, SolverStack,
    TieBreak, WeightedKappa,
};
pub use dexalign_io::{
    OptionsError, embedded_options, read_options, read_options_file, write_options,
    write_options_file,
};
pub use dexalign_model::{Model, ModelError, parse_model, read_model_file, write_model_file};
