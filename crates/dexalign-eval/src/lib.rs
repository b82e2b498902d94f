pub mod adjustment;
pub mod explorer;
pub mod kappa;
pub mod prediction;
pub mod results;
pub mod solver;

#[cfg(test)]
mod tests;

pub use adjustment::adjustment;
pub use explorer::ModelExplorer;
pub use kappa::WeightedKappa;
pub use prediction::prediction;
pub use results::{InterruptCallback, ResultCallback, SearchConfig, TieBreak};
pub use solver::{Evaluation, SolverStack, evaluate};
