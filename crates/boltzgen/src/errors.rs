use thiserror::Error;

/// Everything that can go wrong while compiling a specification. All
/// variants are terminal for the run; the command line maps any of them to
/// exit code 1.
#[derive(Debug, Error)]
pub enum BoltzgenError {
    /// The input does not conform to the specification grammar.
    #[error(transparent)]
    Parse(#[from] combspec::SpecError),
    /// The parsed system failed validation (unknown references, duplicate
    /// constructors, missing atoms, bad frequencies).
    #[error(transparent)]
    System(#[from] boltzgen_core::SystemError),
    /// The system is neither rational nor algebraic.
    #[error("system is not supported: {0}")]
    Unsupported(String),
    /// The bisection could not bracket a singularity, or evaluation at a
    /// user-supplied singularity diverged.
    #[error("oracle found no convergent singularity: {0}")]
    OracleDivergent(String),
    /// Overflow or NaN during fixed-point evaluation.
    #[error("oracle hit a non-finite value: {0}")]
    OracleNonFinite(String),
    /// Frequency marks are present but the internal oracle was selected.
    #[error(
        "frequency marks require an external tuner; annotate the system with @tuner"
    )]
    FrequencyWithoutTuner,
    /// The external solver could not be launched or written to.
    #[error("could not launch tuner {command}: {source}")]
    TunerSpawnFailed {
        command: String,
        source: std::io::Error,
    },
    /// The external solver's output could not be parsed.
    #[error("could not parse tuner output: {0}")]
    TunerParseError(String),
    /// The external solver produced non-finite values.
    #[error("tuner did not yield finite values: {0}")]
    TunerRejected(String),
    /// An annotation did not coerce to the expected type.
    #[error("annotation {key} has unusable value {value}")]
    BadAnnotation { key: String, value: String },
    /// Reading the specification or writing the emitted module failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
