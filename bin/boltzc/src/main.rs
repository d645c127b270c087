use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

use boltzgen::prelude::*;
use boltzgen_core::SystemClass;

/// Compile a weighted combinatorial system specification into a
/// self-contained Boltzmann rejection sampler module.
#[derive(Parser)]
#[command(name = "boltzc", disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    /// Specification file.
    spec: Option<PathBuf>,

    /// Singularity bisection precision.
    #[arg(short, long, default_value_t = 1e-6)]
    precision: f64,

    /// Fixed-point evaluation precision.
    #[arg(short, long, default_value_t = 1e-6)]
    eps: f64,

    /// User-supplied singularity; skips the bisection entirely.
    #[arg(short, long)]
    sing: Option<f64>,

    /// Identifier of the emitted module.
    #[arg(short, long, default_value = "Main")]
    module: String,

    /// Write the emitted module here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the parametrised system to stderr before emitting.
    #[arg(long)]
    verbose: bool,

    /// Print version information.
    #[arg(short = 'v', long)]
    version: bool,

    /// Print help (also available as -?).
    #[arg(short = 'h', long = "help", short_alias = '?', action = clap::ArgAction::Help)]
    help: Option<bool>,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::filter::LevelFilter::WARN),
        )
        .init();

    let cli = Cli::parse();
    if cli.version {
        println!("boltzc {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), BoltzgenError> {
    let Some(path) = &cli.spec else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no specification file given",
        )
        .into());
    };
    let source = std::fs::read_to_string(path)?;
    let system = parse_system(&source)?;
    info!("parsed {} type definitions", system.len());

    let class = classify(&system);
    info!("system classifies as {class}");
    if let SystemClass::Unsupported(reason) = &class {
        return Err(BoltzgenError::Unsupported(reason.clone()));
    }

    let tuner_command = system.annotation("tuner").map(str::to_string);
    let parametrised = match tuner_command {
        Some(command) => TunerConfig::for_class(command, &class).run(system, &class)?,
        None => {
            if system.has_frequencies() {
                return Err(BoltzgenError::FrequencyWithoutTuner);
            }
            let oracle = Oracle {
                eps_rho: cli.precision,
                eps_y: cli.eps,
            };
            oracle.parametrise(system, cli.sing)?
        }
    };
    if cli.verbose {
        eprintln!("{}", boltzgen::oracle::summary(&parametrised));
    }

    let flags = EmitterFlags::from_system(cli.module.clone(), parametrised.system())?;
    let plan = plan(&parametrised);
    let module = emit(&parametrised, &plan, &flags);

    // Nothing is written until the whole pipeline has succeeded.
    match &cli.output {
        Some(path) => std::fs::write(path, module)?,
        None => print!("{module}"),
    }
    Ok(())
}
