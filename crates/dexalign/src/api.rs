//! Path-based operations: the surface a host application or binding
//! calls. Every function loads its inputs, converts parser errors into
//! the library-wide [`Error`] and returns owned results.

use std::path::Path;

use dexalign_common::{Error, Options, RunOutcome};
use dexalign_eval::{Evaluation, InterruptCallback, ResultCallback, SearchConfig};
use dexalign_model::Model;

/// Shape of a model: what the caller must supply per observation row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub attribute_count: usize,
    pub basic_attribute_names: Vec<String>,
    pub basic_attribute_scale_sizes: Vec<usize>,
}

fn load_model(path: &Path) -> Result<Model, Error> {
    Ok(dexalign_model::read_model_file(path)?)
}

/// Describe the basic attributes of a model file.
pub fn information<P: AsRef<Path>>(model_path: P) -> Result<ModelInfo, Error> {
    let model = load_model(model_path.as_ref())?;
    let basics = model.basic_attributes();
    Ok(ModelInfo {
        name: model.name.clone(),
        attribute_count: model.attributes.len(),
        basic_attribute_names: basics
            .iter()
            .map(|&att| model.attributes[att].name.clone())
            .collect(),
        basic_attribute_scale_sizes: basics
            .iter()
            .map(|&att| model.attributes[att].scale_size())
            .collect(),
    })
}

/// Load an observation set: from a CSV when a path is given, otherwise
/// from the alternatives embedded in the model file itself.
pub fn extract_options<P: AsRef<Path>>(
    model_path: P,
    options_path: Option<P>,
    relation: dexalign_common::RelationRule,
) -> Result<Options, Error> {
    let model = load_model(model_path.as_ref())?;
    match options_path {
        Some(path) => Ok(dexalign_io::read_options_file(
            path.as_ref(),
            &model,
            relation,
        )?),
        None => dexalign_io::embedded_options(&model),
    }
}

/// Evaluate every alternative against the unmodified model.
pub fn evaluate<P: AsRef<Path>>(model_path: P, options: &Options) -> Result<Evaluation, Error> {
    let model = load_model(model_path.as_ref())?;
    dexalign_eval::evaluate(&model, options)
}

/// Run the adjustment search; when `output_dir` is given, write one
/// perturbed model per budget into it, named by the budget number.
pub fn adjustment<P: AsRef<Path>>(
    model_path: P,
    options: &Options,
    config: &SearchConfig,
    on_result: Option<ResultCallback>,
    on_interrupt: Option<InterruptCallback>,
    output_dir: Option<&Path>,
) -> Result<RunOutcome, Error> {
    let model = load_model(model_path.as_ref())?;
    let outcome = dexalign_eval::adjustment(&model, options, config, on_result, on_interrupt)?;
    if let Some(directory) = output_dir {
        write_back(&model, &outcome, directory)?;
    }
    Ok(outcome)
}

/// Run the prediction search; `output_dir` behaves as in [`adjustment`].
pub fn prediction<P: AsRef<Path>>(
    model_path: P,
    options: &Options,
    config: &SearchConfig,
    on_result: Option<ResultCallback>,
    on_interrupt: Option<InterruptCallback>,
    output_dir: Option<&Path>,
) -> Result<RunOutcome, Error> {
    let model = load_model(model_path.as_ref())?;
    let outcome = dexalign_eval::prediction(&model, options, config, on_result, on_interrupt)?;
    if let Some(directory) = output_dir {
        write_back(&model, &outcome, directory)?;
    }
    Ok(outcome)
}

/// Write a copy of the model whose embedded alternatives are replaced by
/// the given observation set.
pub fn merge_options<P: AsRef<Path>>(
    model_path: P,
    output_path: P,
    options: &Options,
) -> Result<(), Error> {
    let model = load_model(model_path.as_ref())?;
    let merged = dexalign_io::merge_options(&model, options)?;
    Ok(dexalign_model::write_model_file(
        &merged,
        output_path.as_ref(),
    )?)
}

fn write_back(model: &Model, outcome: &RunOutcome, directory: &Path) -> Result<(), Error> {
    for result in &outcome.results {
        let mut perturbed = model.clone();
        perturbed.apply_modifiers(&result.modifiers)?;
        let path = directory.join(format!("{}.dxi", result.budget));
        dexalign_model::write_model_file(&perturbed, &path)?;
    }
    Ok(())
}
