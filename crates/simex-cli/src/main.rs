//! Command-line interface for simex.

use clap::{Parser, Subcommand};
use miette::{Diagnostic, NamedSource, SourceSpan};
use simex_abi::{ContractMeta, MethodKind, ValueDomain};
use simex_mc::{
    get_mapping, simulation_examples, transitions, Backend, CounterExample, ExampleKind, ExampleSet,
    ExploreConfig, InvocationGenerator, LimiterFactory, SimError, State, DEFAULT_PAYMENTS,
};
use simex_vm::{ContractDef, VmBackend};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CLI error with source context for pretty printing.
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("failed to read file: {message}")]
    IoError { message: String },

    #[error("parse error: {message}")]
    #[diagnostic(code(simex::parse_error))]
    ParseError {
        message: String,
        #[source_code]
        src: NamedSource<Arc<String>>,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("invalid contract: {message}")]
    #[diagnostic(code(simex::invalid_contract))]
    InvalidContract { message: String },

    #[error("mapping error: {message}")]
    #[diagnostic(
        code(simex::mapping_error),
        help("source and target must agree on the constructor and on every shared method name")
    )]
    MappingError { message: String },

    #[error("unsupported type: {message}")]
    #[diagnostic(code(simex::unsupported_type))]
    UnsupportedType { message: String },

    #[error("execution error: {message}")]
    #[diagnostic(code(simex::execution_error))]
    ExecutionError { message: String },

    #[error("simulation counterexample: {message}")]
    #[diagnostic(code(simex::counterexample))]
    CounterExample { message: String },

    #[error("{message}")]
    Other { message: String },
}

impl CliError {
    fn from_json_error(e: serde_json::Error, source: Arc<String>, filename: &str) -> Self {
        let offset = line_column_offset(&source, e.line(), e.column());
        let len = usize::from(offset < source.len());
        CliError::ParseError {
            message: e.to_string(),
            src: NamedSource::new(filename, source),
            span: (offset, len).into(),
        }
    }
}

impl From<SimError> for CliError {
    fn from(e: SimError) -> Self {
        let message = e.to_string();
        match e {
            SimError::Abi(_) => CliError::UnsupportedType { message },
            SimError::Backend(_) => CliError::ExecutionError { message },
            SimError::Mapping(_) => CliError::MappingError { message },
            SimError::CounterExample(cex) => CliError::CounterExample {
                message: cex.to_string(),
            },
        }
    }
}

fn line_column_offset(source: &str, line: usize, column: usize) -> usize {
    let start: usize = source
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    (start + column.saturating_sub(1)).min(source.len())
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "simex", version)]
#[command(about = "Simulation example generator for contract pairs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone)]
struct BudgetArgs {
    /// Number of (state, invocation) pairs explored per contract (0 = unlimited)
    #[arg(long = "states", default_value = "10")]
    max_states: usize,

    /// Maximum number of calls after the constructor (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_depth: usize,

    /// Payment amounts tried for payable methods
    #[arg(long = "payment", value_name = "WEI")]
    payments: Vec<u128>,

    /// Disable parallel replay
    #[arg(long)]
    no_parallel: bool,
}

impl BudgetArgs {
    fn config(&self) -> ExploreConfig {
        ExploreConfig {
            max_states: self.max_states,
            max_depth: self.max_depth,
            parallel: !self.no_parallel,
            payments: if self.payments.is_empty() {
                DEFAULT_PAYMENTS.to_vec()
            } else {
                self.payments.clone()
            },
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Load a contract definition and show its method table
    Metadata {
        /// Contract definition (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Show how target methods map onto source methods
    Mapping {
        /// Source (implementation) contract
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        /// Target (specification) contract
        #[arg(value_name = "TARGET")]
        target: PathBuf,
    },

    /// Explore one contract and print every transition
    Explore {
        /// Contract definition (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        budget: BudgetArgs,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Generate positive and negative simulation examples
    Examples {
        /// Source (implementation) contract
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        /// Target (specification) contract
        #[arg(value_name = "TARGET")]
        target: PathBuf,

        #[command(flatten)]
        budget: BudgetArgs,

        /// Directory to write examples.json into
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    let cli = Cli::parse();

    let filter = if matches!(
        &cli.command,
        Commands::Explore { verbose: true, .. } | Commands::Examples { verbose: true, .. }
    ) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Metadata { file } => cmd_metadata(&file),
        Commands::Mapping { source, target } => cmd_mapping(&source, &target),
        Commands::Explore { file, budget, .. } => cmd_explore(&file, &budget.config()),
        Commands::Examples {
            source,
            target,
            budget,
            output,
            ..
        } => cmd_examples(&source, &target, &budget.config(), output.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("{:?}", miette::Report::new(e));
        std::process::exit(1);
    }
}

fn load_contract(file: &Path) -> CliResult<VmBackend> {
    let filename = file.display().to_string();
    let source = Arc::new(fs::read_to_string(file).map_err(|e| CliError::IoError {
        message: format!("{}: {}", filename, e),
    })?);
    let def: ContractDef = serde_json::from_str(&source)
        .map_err(|e| CliError::from_json_error(e, source.clone(), &filename))?;
    VmBackend::new(def).map_err(|e| CliError::InvalidContract {
        message: e.to_string(),
    })
}

fn cmd_metadata(file: &Path) -> CliResult<()> {
    let backend = load_contract(file)?;
    print_metadata(&backend.metadata());
    Ok(())
}

fn print_metadata(meta: &ContractMeta) {
    println!("contract {}", meta.name);
    for var in &meta.state_vars {
        println!("  storage {}: {}", var.name, var.ty);
    }
    for method in meta.all_methods() {
        let kind = match method.kind() {
            MethodKind::Constructor => "constructor",
            MethodKind::Mutator => "mutator",
            MethodKind::Observer => "observer",
        };
        let implicit = if method.is_constructor() && !meta.has_constructor() {
            " (implicit)"
        } else {
            ""
        };
        println!(
            "  {:<11} {:<8} {:<10} {}{}",
            kind,
            method.visibility.to_string(),
            method.mutability.to_string(),
            method,
            implicit
        );
    }
}

fn cmd_mapping(source: &Path, target: &Path) -> CliResult<()> {
    let (s, t) = (load_contract(source)?.metadata(), load_contract(target)?.metadata());
    let mapping = get_mapping(&s, &t).map_err(|e| CliError::MappingError {
        message: e.to_string(),
    })?;
    println!("mapping {} -> {} ({} entries)", s.name, t.name, mapping.len());
    for entry in mapping.entries() {
        println!("  {} <- {}", entry.target, entry.source);
    }
    for method in &t.methods {
        if !mapping.maps_target(method) {
            println!("  {} (unmapped)", method);
        }
    }
    Ok(())
}

fn cmd_explore(file: &Path, config: &ExploreConfig) -> CliResult<()> {
    let backend = load_contract(file)?;
    let meta = backend.metadata();
    let generator = InvocationGenerator::new(meta.all_methods(), ValueDomain::new(backend.accounts().to_vec()))
        .with_payments(config.payments.clone());

    info!("exploring {}...", meta.name);
    let start = Instant::now();
    let mut run = transitions(&meta, &generator, &backend, config.limiter(), config.parallel)?;
    let mut index = 0;
    for transition in run.by_ref() {
        let transition = transition?;
        match &transition.operation {
            None => println!("  {}: init {}", index, transition.post.trace),
            Some(op) => println!("  {}: {} -> {}", index, op, transition.post.observation),
        }
        index += 1;
    }
    let stats = run.stats();
    let elapsed = start.elapsed();

    println!();
    println!("Result: OK");
    println!("  States: {}", stats.states);
    println!("  Transitions: {}", stats.transitions);
    println!("  Discarded: {}", stats.discarded);
    println!("  Max depth: {}", stats.max_depth);
    println!("  Time: {:.2}s", elapsed.as_secs_f64());
    Ok(())
}

fn cmd_examples(source: &Path, target: &Path, config: &ExploreConfig, output: Option<&Path>) -> CliResult<()> {
    let (sb, tb) = (load_contract(source)?, load_contract(target)?);
    let (sm, tm) = (sb.metadata(), tb.metadata());

    info!("generating examples for {} against {}...", sm.name, tm.name);
    let start = Instant::now();
    let mut stream = simulation_examples(&sm, &tm, &sb, &tb, config)?;
    let set = match ExampleSet::collect(stream.by_ref()) {
        Ok(set) => set,
        Err(SimError::CounterExample(cex)) => {
            print_counter_example(&cex);
            return Err(SimError::CounterExample(cex).into());
        }
        Err(e) => return Err(e.into()),
    };
    let stats = stream.stats();
    let elapsed = start.elapsed();

    println!();
    println!("Result: OK");
    println!("  Source states: {}", stats.source_states);
    println!("  Target states: {}", stats.target_states);
    println!("  Positive examples: {}", set.positive.len());
    println!(
        "  Negative examples: {} ({} propagated)",
        set.negative.len(),
        stats.propagated
    );
    println!("  Time: {:.2}s", elapsed.as_secs_f64());

    if let Some(dir) = output {
        let path = write_examples(dir, &set)?;
        println!("  Written: {}", path.display());
    } else {
        for example in set.positive.iter().chain(&set.negative) {
            let marker = match example.kind {
                ExampleKind::Positive => '+',
                ExampleKind::Negative => '-',
            };
            println!("  {} {}: {} | {}", marker, example.name(), example.source.trace, example.target.trace);
        }
    }
    Ok(())
}

fn print_counter_example(cex: &CounterExample) {
    println!();
    println!("Result: COUNTEREXAMPLE");
    println!("  Trace ({} calls):", cex.source.trace.len());
    for (i, op) in cex.source.trace.operations().iter().enumerate() {
        println!("    {}: {}", i, op);
    }
    print_state("Source", &cex.source);
    print_state("Target", &cex.target);
}

fn print_state(label: &str, state: &State) {
    println!("  {} {}:", label, state.contract);
    for op in state.observation.operations() {
        println!("    {}", op);
    }
}

fn write_examples(dir: &Path, set: &ExampleSet) -> CliResult<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| CliError::IoError {
        message: format!("{}: {}", dir.display(), e),
    })?;
    let path = dir.join("examples.json");
    let json = serde_json::to_string_pretty(set).map_err(|e| CliError::Other {
        message: e.to_string(),
    })?;
    fs::write(&path, json).map_err(|e| CliError::IoError {
        message: format!("{}: {}", path.display(), e),
    })?;
    Ok(path)
}
