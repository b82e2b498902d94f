use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};

use dexalign::{BudgetResult, RelationRule, RunStatus, SearchConfig};

#[derive(Parser, Debug)]
#[command(
    name = "dexalign",
    version,
    about = "DEX evaluation and utility-table calibration",
    after_help = "Positional files are dispatched by extension: the first \
                  .dxi is the input model, a second .dxi is the merge \
                  output, a .csv holds the observed alternatives."
)]
struct Cli {
    /// Cap the modifier budget (0 keeps the whitelist bound)
    #[arg(long, short = 'l', global = true, default_value_t = 0)]
    limit: i64,

    /// Worker threads (0 uses all cores)
    #[arg(long, short = 'j', global = true, default_value_t = 1)]
    jobs: usize,

    /// Search the full utility tables instead of the reachable rows
    #[arg(long, global = true)]
    without_reduce: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a model's embedded alternatives to a CSV file
    Extract { files: Vec<PathBuf> },
    /// Embed a CSV of alternatives into a new model file
    Merge { files: Vec<PathBuf> },
    /// Evaluate alternatives and report both weighted kappas
    Evaluate { files: Vec<PathBuf> },
    /// Calibrate against the whole observation set
    Adjustment { files: Vec<PathBuf> },
    /// Calibrate with leave-related-rows-out cross validation
    Prediction { files: Vec<PathBuf> },
}

impl Command {
    fn files(&self) -> &[PathBuf] {
        match self {
            Command::Extract { files }
            | Command::Merge { files }
            | Command::Evaluate { files }
            | Command::Adjustment { files }
            | Command::Prediction { files } => files,
        }
    }
}

/// Positional paths split by extension, in order of appearance.
struct FileSet {
    models: Vec<PathBuf>,
    options: Vec<PathBuf>,
}

fn split_files(files: &[PathBuf]) -> anyhow::Result<FileSet> {
    let mut set = FileSet {
        models: Vec::new(),
        options: Vec::new(),
    };
    for file in files {
        match file.extension().and_then(|ext| ext.to_str()) {
            Some("dxi") => set.models.push(file.clone()),
            Some("csv") => set.options.push(file.clone()),
            _ => bail!("cannot tell what `{}' is; use .dxi or .csv", file.display()),
        }
    }
    Ok(set)
}

impl FileSet {
    fn model(&self) -> anyhow::Result<&PathBuf> {
        self.models.first().context("no model (.dxi) file given")
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("dexalign: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let set = split_files(cli.command.files())?;
    let config = SearchConfig {
        reduce: !cli.without_reduce,
        limit: cli.limit,
        threads: cli.jobs,
        ..SearchConfig::default()
    };

    match &cli.command {
        Command::Extract { .. } => {
            let model_path = set.model()?;
            let output = set.options.first().context("no output (.csv) file given")?;
            let model = dexalign::read_model_file(model_path)?;
            let options = dexalign::embedded_options(&model)?;
            dexalign::write_options_file(output, &model, &options)?;
        }
        Command::Merge { .. } => {
            let model_path = set.model()?;
            let output = set
                .models
                .get(1)
                .context("no output model (.dxi) file given")?;
            let csv = set.options.first().context("no options (.csv) file given")?;
            let model = dexalign::read_model_file(model_path)?;
            let options = dexalign::read_options_file(csv, &model, RelationRule::Auto)?;
            dexalign::merge_options(model_path, output, &options)?;
        }
        Command::Evaluate { .. } => {
            let model_path = set.model()?;
            let options = load_options(&set)?;
            let evaluation = dexalign::evaluate(model_path, &options)?;

            println!("| simulation | observed | simulated |");
            for (index, name) in options.simulations.iter().enumerate() {
                println!(
                    "| {name} | {} | {} |",
                    evaluation.observed[index], evaluation.simulated[index]
                );
            }
            println!("linear weighted kappa: {:.10}", evaluation.linear_kappa);
            println!("squared weighted kappa: {:.10}", evaluation.squared_kappa);
        }
        Command::Adjustment { .. } => {
            let model_path = set.model()?;
            let options = load_options(&set)?;
            print_result_header();
            let on_result = |result: &BudgetResult| {
                print_result(result);
                true
            };
            let outcome = dexalign::adjustment(
                model_path,
                &options,
                &config,
                Some(&on_result),
                None,
                None,
            )?;
            report_status(outcome.status)?;
        }
        Command::Prediction { .. } => {
            let model_path = set.model()?;
            let options = load_options(&set)?;
            print_result_header();
            let on_result = |result: &BudgetResult| {
                print_result(result);
                true
            };
            let outcome = dexalign::prediction(
                model_path,
                &options,
                &config,
                Some(&on_result),
                None,
                None,
            )?;
            report_status(outcome.status)?;
        }
    }

    Ok(())
}

fn load_options(set: &FileSet) -> anyhow::Result<dexalign::Options> {
    let model_path = set.model()?;
    Ok(dexalign::extract_options(
        model_path,
        set.options.first(),
        RelationRule::Auto,
    )?)
}

fn print_result_header() {
    println!("| budget | kappa | kappa computed | time (s) | modifiers |");
}

fn print_result(result: &BudgetResult) {
    let modifiers: Vec<String> = result
        .modifiers
        .iter()
        .map(|m| format!("[{} {} {}]", m.attribute, m.row, m.value))
        .collect();
    println!(
        "| {} | {:13.10} | {} | {:.3} | {} |",
        result.budget,
        result.kappa,
        result.kappa_computed,
        result.seconds,
        modifiers.join(" ")
    );
}

fn report_status(status: RunStatus) -> anyhow::Result<()> {
    match status {
        RunStatus::Completed => Ok(()),
        RunStatus::Cancelled => bail!("cancelled"),
        RunStatus::BudgetExceeded => bail!("time budget exceeded"),
    }
}
