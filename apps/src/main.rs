use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use fms::cli::{
    AlgorithmType, CliArgs, DdExplorationType, ModularAlgorithmType, MultiAlgorithmBehaviour,
    OutputFormat, SelectionOperatorType, ShopType,
};

/// Scheduler for re-entrant flow-shops with sequence-dependent setup times.
#[derive(Debug, Parser)]
#[command(name = "scheduler", version, disable_help_subcommand = true)]
struct Opt {
    /// Instance file (XML); a shop or a modular production line.
    input: Option<String>,

    /// Output file prefix; the result is written as `<output>.fms.json` or
    /// `<output>.fms.cbor`.
    output: Option<String>,

    /// Maintenance policy file.
    #[arg(long = "maintenance")]
    maintenance: Option<String>,

    /// Increase the log level (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Weight of the productivity objective in the insertion ranking.
    #[arg(long, default_value_t = 0.70)]
    productivity: f64,

    /// Weight of the flexibility objective in the insertion ranking.
    #[arg(long, default_value_t = 0.25)]
    flexibility: f64,

    /// Weight of the tie-breaking objective in the insertion ranking.
    #[arg(long, default_value_t = 0.05)]
    tie: f64,

    /// Solver time-out in milliseconds.
    #[arg(long = "time-out", default_value_t = 5000)]
    time_out: u64,

    /// Iteration cap of the iterative solvers.
    #[arg(long = "max-iterations", default_value_t = u64::MAX)]
    max_iterations: u64,

    /// Size cap of the Pareto frontier.
    #[arg(long = "max-partial", default_value_t = 5)]
    max_partial: u32,

    /// Reducer applied between Pareto generations.
    #[arg(long = "selection-operator", default_value = "environmental")]
    selection_operator: SelectionOperatorType,

    /// Algorithm to run; repeat the flag to hand several to a modular run.
    #[arg(long = "algorithm", default_value = "bhcs")]
    algorithm: Vec<AlgorithmType>,

    /// Propagation algorithm for modular instances.
    #[arg(long = "modular-algorithm", default_value = "broadcast")]
    modular_algorithm: ModularAlgorithmType,

    /// Record the bounds of every propagation round in the output.
    #[arg(long = "modular-store-bounds")]
    modular_store_bounds: bool,

    /// Record the sequences of every propagation round in the output.
    #[arg(long = "modular-store-sequence")]
    modular_store_sequence: bool,

    /// Do not re-apply a module's own derived bounds to itself.
    #[arg(long = "modular-no-self-bounds")]
    modular_no_self_bounds: bool,

    /// Iteration cap of the modular propagation.
    #[arg(long = "modular-max-iterations", default_value_t = u64::MAX)]
    modular_max_iterations: u64,

    /// Time-out of the modular propagation in milliseconds.
    #[arg(long = "modular-time-out", default_value_t = 5000)]
    modular_time_out: u64,

    /// How modules pick among several `--algorithm` flags.
    #[arg(long = "modular-multi-algorithm-behaviour", default_value = "divide")]
    modular_multi_algorithm_behaviour: MultiAlgorithmBehaviour,

    /// Kind of shop to schedule.
    #[arg(long = "shop-type", default_value = "fixedorder")]
    shop_type: ShopType,

    /// Queue discipline of the decision-diagram solver.
    #[arg(long = "exploration-type", default_value = "static")]
    exploration_type: DdExplorationType,

    /// Format of the result file.
    #[arg(long = "output-format", default_value = "json")]
    output_format: OutputFormat,

    /// Seed file for the `sequence` and `ddseed` algorithms.
    #[arg(long = "sequence-file")]
    sequence_file: Option<String>,

    /// List the available algorithms and exit.
    #[arg(long = "list-algorithms")]
    list_algorithms: bool,

    /// List the available modular algorithms and exit.
    #[arg(long = "list-modular-algorithms")]
    list_modular_algorithms: bool,

    /// List the multi-algorithm behaviours and exit.
    #[arg(long = "list-modular-multi-algorithm-behaviour")]
    list_multi_algorithm_behaviour: bool,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::ERROR,
        1 => tracing::Level::WARN,
        2 => tracing::Level::INFO,
        3 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let opt = match Opt::try_parse() {
        Ok(opt) => opt,
        Err(e) => {
            // help and version are not usage errors
            if e.use_stderr() {
                eprintln!("{e}");
                return ExitCode::from(1);
            }
            print!("{e}");
            return ExitCode::SUCCESS;
        }
    };

    if opt.list_algorithms {
        for algorithm in AlgorithmType::ALL {
            println!("{:24}{}", algorithm.short_name(), algorithm.description());
        }
        return ExitCode::SUCCESS;
    }
    if opt.list_modular_algorithms {
        for algorithm in ModularAlgorithmType::ALL {
            println!("{}", algorithm.short_name());
        }
        return ExitCode::SUCCESS;
    }
    if opt.list_multi_algorithm_behaviour {
        for behaviour in MultiAlgorithmBehaviour::ALL {
            println!("{}", behaviour.short_name());
        }
        return ExitCode::SUCCESS;
    }

    init_logging(opt.verbose);

    let (Some(input), Some(output)) = (opt.input.clone(), opt.output.clone()) else {
        eprintln!("error: an input file and an output file are required");
        return ExitCode::from(1);
    };

    let args = CliArgs {
        input_file: input,
        output_file: output,
        sequence_file: opt.sequence_file.clone().unwrap_or_default(),
        maint_policy_file: opt.maintenance.clone().unwrap_or_default(),
        verbose: opt.verbose,
        productivity_weight: opt.productivity,
        flexibility_weight: opt.flexibility,
        tie_weight: opt.tie,
        time_out: Duration::from_millis(opt.time_out),
        max_iterations: opt.max_iterations,
        max_partial_solutions: opt.max_partial,
        selection_operator: opt.selection_operator,
        algorithm: opt.algorithm.first().copied().unwrap_or_default(),
        algorithms: opt.algorithm.clone(),
        modular_algorithm: opt.modular_algorithm,
        output_format: opt.output_format,
        shop_type: opt.shop_type,
        exploration_type: opt.exploration_type,
        multi_algorithm_behaviour: opt.modular_multi_algorithm_behaviour,
        modular_options: fms::cli::ModularOptions {
            store_bounds: opt.modular_store_bounds,
            store_sequence: opt.modular_store_sequence,
            no_self_bounds: opt.modular_no_self_bounds,
            max_iterations: opt.modular_max_iterations,
            time_out: Duration::from_millis(opt.modular_time_out),
        },
    };

    match fms::scheduler::compute(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}
