use std::io::{Read, Write};
use std::process::{Command, Stdio};

use indexmap::IndexMap;
use itertools::Itertools;
use tracing::{debug, trace};

use boltzgen_core::{Arg, ParametrisedSystem, System, SystemClass};

use crate::BoltzgenError;
use crate::oracle::branching_probabilities;

/// Configuration of the external convex-program tuner. The solver command
/// comes from the system's `tuner` annotation; the remaining knobs default
/// per system class.
#[derive(Debug, Clone)]
pub struct TunerConfig {
    /// Executable to spawn.
    pub command: String,
    /// Solver backend passed through to the executable.
    pub solver: String,
    /// Requested solution precision.
    pub precision: f64,
    /// Iteration budget of the solver.
    pub iterations: u64,
}

impl TunerConfig {
    /// The per-class defaults: interior-point with a generous iteration
    /// budget for rational systems, the conic solver for algebraic ones.
    pub fn for_class(command: impl Into<String>, class: &SystemClass) -> Self {
        let (solver, iterations) = if class.is_rational() {
            ("interior-point", 2500)
        } else {
            ("conic", 20)
        };
        Self {
            command: command.into(),
            solver: solver.to_string(),
            precision: 1e-20,
            iterations,
        }
    }

    /// Runs the tuner: writes the convex-program specification to the
    /// child's stdin, closes the write side, reads its stdout to the end,
    /// reaps the child and converts the reported `(ρ, u, y)` into a
    /// parametrised system.
    pub fn run(
        &self,
        system: System,
        class: &SystemClass,
    ) -> Result<ParametrisedSystem, BoltzgenError> {
        let problem = write_problem(&system);
        trace!("tuner problem:\n{problem}");

        let kind = if class.is_rational() {
            "rational"
        } else {
            "algebraic"
        };
        let mut child = Command::new(&self.command)
            .arg("--solver")
            .arg(&self.solver)
            .arg("--precision")
            .arg(format!("{:e}", self.precision))
            .arg("--max-iters")
            .arg(self.iterations.to_string())
            .arg("--system-type")
            .arg(kind)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| BoltzgenError::TunerSpawnFailed {
                command: self.command.clone(),
                source,
            })?;

        // The whole specification goes out before anything is read; the
        // write side is dropped so the child sees end of input.
        if let Some(mut stdin) = child.stdin.take() {
            // A solver that exits early closes its end of the pipe; the
            // failure then surfaces through its exit status instead.
            if let Err(source) = stdin.write_all(problem.as_bytes()) {
                if source.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(BoltzgenError::TunerSpawnFailed {
                        command: self.command.clone(),
                        source,
                    });
                }
            }
        }
        let mut output = String::new();
        if let Some(mut stdout) = child.stdout.take() {
            stdout
                .read_to_string(&mut output)
                .map_err(|source| BoltzgenError::TunerSpawnFailed {
                    command: self.command.clone(),
                    source,
                })?;
        }
        let status = child.wait().map_err(|source| BoltzgenError::TunerSpawnFailed {
            command: self.command.clone(),
            source,
        })?;
        if !status.success() {
            return Err(BoltzgenError::TunerParseError(format!(
                "tuner exited with {status}"
            )));
        }

        let (rho, multipliers, values) = parse_outcome(&system, &output)?;
        debug!("tuner reported ρ = {rho}");

        let marks: IndexMap<String, f64> = system
            .frequencies()
            .iter()
            .zip(&multipliers)
            .map(|((name, _), multiplier)| (name.to_string(), *multiplier))
            .collect();
        let branching = branching_probabilities(&system, rho, &values, &marks)
            .map_err(|err| match err {
                BoltzgenError::OracleNonFinite(diagnostic) => {
                    BoltzgenError::TunerRejected(diagnostic)
                }
                other => other,
            })?;
        Ok(ParametrisedSystem::new(system, rho, values, branching))
    }
}

/// Serialises the system as the tuner's wire format: a header with the
/// vertex and frequency counts, the frequency vector, one block per type
/// listing its constructor rows `[w, f₁…f_D, t₁…t_T, s₁…s_Σ]`, and one
/// two-row block per sequence type encoding `SEQ(x) = 1 + x·SEQ(x)`.
pub fn write_problem(system: &System) -> String {
    let types = system.types().collect_vec();
    let seqs = system.seq_types();
    let frequencies = system.frequencies();
    let frequency_index: IndexMap<&str, usize> = frequencies
        .iter()
        .enumerate()
        .map(|(index, (name, _))| (*name, index))
        .collect();

    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        types.len() + seqs.len(),
        frequencies.len()
    ));
    if !frequencies.is_empty() {
        lines.push(frequencies.iter().map(|(_, value)| value).join(" "));
    }

    let row = |weight: u64, marked: Option<usize>, args: &[Arg]| -> String {
        let mut frequency_slots = vec![0u64; frequencies.len()];
        if let Some(index) = marked {
            frequency_slots[index] = weight;
        }
        let mut type_slots = vec![0u64; types.len()];
        let mut seq_slots = vec![0u64; seqs.len()];
        for arg in args {
            let target = arg.referenced();
            match arg {
                Arg::Type(_) => {
                    type_slots[system.type_index(target).expect("validated reference")] += 1;
                }
                Arg::List(_) => {
                    seq_slots[seqs.get_index_of(target).expect("known sequence type")] += 1;
                }
            }
        }
        std::iter::once(weight)
            .chain(frequency_slots)
            .chain(type_slots)
            .chain(seq_slots)
            .join(" ")
    };

    for (_, constructors) in system.defs() {
        lines.push(constructors.len().to_string());
        for constructor in constructors {
            lines.push(row(
                constructor.weight,
                frequency_index.get(constructor.name.as_str()).copied(),
                &constructor.args,
            ));
        }
    }
    for seq in &seqs {
        lines.push("2".to_string());
        lines.push(row(0, None, &[]));
        lines.push(row(
            0,
            None,
            &[
                Arg::Type((*seq).to_string()),
                Arg::List((*seq).to_string()),
            ],
        ));
    }
    lines.push(String::new());
    lines.join("\n")
}

/// Parses the solver's answer: one `ρ`, then the marking multipliers (one
/// per frequency) and the type values, all whitespace-separated floats.
fn parse_outcome(
    system: &System,
    output: &str,
) -> Result<(f64, Vec<f64>, Vec<f64>), BoltzgenError> {
    let expected = 1 + system.frequencies().len() + system.len();
    let mut numbers = Vec::with_capacity(expected);
    for token in output.split_whitespace() {
        let number: f64 = token.parse().map_err(|_| {
            BoltzgenError::TunerParseError(format!("token {token:?} is not a number"))
        })?;
        numbers.push(number);
    }
    if numbers.len() != expected {
        return Err(BoltzgenError::TunerParseError(format!(
            "expected {expected} values, found {}",
            numbers.len()
        )));
    }
    if numbers.iter().any(|number| !number.is_finite()) {
        return Err(BoltzgenError::TunerRejected(
            "solver reported a non-finite value".to_string(),
        ));
    }
    let rho = numbers[0];
    let num_frequencies = system.frequencies().len();
    let multipliers = numbers[1..1 + num_frequencies].to_vec();
    let values = numbers[1 + num_frequencies..].to_vec();
    if rho <= 0.0 {
        return Err(BoltzgenError::TunerRejected(format!(
            "solver reported a non-positive singularity {rho}"
        )));
    }
    Ok((rho, multipliers, values))
}
