use bigdecimal::BigDecimal;
use indexmap::IndexMap;
use itertools::Itertools;
use num_traits::{FromPrimitive, One, ToPrimitive, Zero};
use tabled::{Table, Tabled};
use tracing::{debug, trace, warn};

use boltzgen_core::{Arg, ParametrisedSystem, System};

use crate::BoltzgenError;

/// Components this large (or non-finite ones) flag the evaluation as
/// divergent.
const DIVERGENCE_CUTOFF: f64 = 1e10;
/// Hard cap on fixed-point iterations; near the singularity convergence is
/// only linear, so the cap doubles as a divergence detector.
const MAX_FIXPOINT_ITERATIONS: usize = 500_000;
/// Iteration count past which a slow-convergence warning is logged.
const SLOW_FIXPOINT_ITERATIONS: usize = 100_000;
/// First candidate for the doubling search bracketing the singularity.
const BRACKET_SEED: f64 = 1e-6;
/// Give up bracketing past this point; the generating function is entire.
const BRACKET_LIMIT: f64 = 1e9;
/// Interval width below which bisection switches from double precision to
/// decimal arithmetic, so it cannot stall on representability.
const DEEP_BISECTION_WIDTH: f64 = 1e-12;
/// Significant digits kept by the decimal evaluation path.
const WORKING_PRECISION: u64 = 60;

/// The scalar the fixed-point evaluator is generic over. Implemented for
/// `f64` (the fast path) and [`BigDecimal`] (the deep-bisection path, which
/// keeps at least [`WORKING_PRECISION`] significant digits).
pub trait Scalar:
    Clone
    + PartialOrd
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + std::ops::Mul<Output = Self>
    + std::ops::Div<Output = Self>
{
    fn zero() -> Self;
    fn one() -> Self;
    fn from_f64(value: f64) -> Self;
    fn to_f64(&self) -> f64;
    fn is_finite(&self) -> bool;
    fn abs(&self) -> Self;
    /// Rounds to the working precision; the identity for `f64`.
    fn normalize(self) -> Self;
}

impl Scalar for f64 {
    fn zero() -> Self {
        0.0
    }
    fn one() -> Self {
        1.0
    }
    fn from_f64(value: f64) -> Self {
        value
    }
    fn to_f64(&self) -> f64 {
        *self
    }
    fn is_finite(&self) -> bool {
        f64::is_finite(*self)
    }
    fn abs(&self) -> Self {
        f64::abs(*self)
    }
    fn normalize(self) -> Self {
        self
    }
}

impl Scalar for BigDecimal {
    fn zero() -> Self {
        <BigDecimal as Zero>::zero()
    }
    fn one() -> Self {
        <BigDecimal as One>::one()
    }
    fn from_f64(value: f64) -> Self {
        <BigDecimal as FromPrimitive>::from_f64(value)
            .expect("finite double converts to a decimal")
    }
    fn to_f64(&self) -> f64 {
        ToPrimitive::to_f64(self).unwrap_or(f64::INFINITY)
    }
    fn is_finite(&self) -> bool {
        true
    }
    fn abs(&self) -> Self {
        BigDecimal::abs(self)
    }
    fn normalize(self) -> Self {
        self.with_prec(WORKING_PRECISION)
    }
}

/// Outcome of iterating the generating-function operator at a fixed `z`.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation<T> {
    /// The iteration settled; one generating-function value per type.
    Converged(Vec<T>),
    /// A component blew past the cutoff, went non-finite, a sequence base
    /// reached 1, or the iteration cap was exhausted.
    Diverged,
}

impl<T> Evaluation<T> {
    /// Returns `true` iff the evaluation converged.
    pub fn converged(&self) -> bool {
        matches!(self, Self::Converged(_))
    }
}

/// One multiplicative factor of a constructor value: a type value or the
/// closed sequence form `1/(1 - y)` over a type value.
enum Factor {
    Type(usize),
    Seq(usize),
}

struct CompiledConstructor {
    weight: u64,
    factors: Vec<Factor>,
}

/// The system with every name reference resolved to a type index, so the
/// inner iteration never touches the name maps.
struct Compiled {
    types: Vec<Vec<CompiledConstructor>>,
}

fn compile(system: &System) -> Compiled {
    let types = system
        .defs()
        .map(|(_, constructors)| {
            constructors
                .iter()
                .map(|constructor| CompiledConstructor {
                    weight: constructor.weight,
                    factors: constructor
                        .args
                        .iter()
                        .map(|arg| {
                            let index = system
                                .type_index(arg.referenced())
                                .expect("validated systems only reference defined types");
                            match arg {
                                Arg::Type(_) => Factor::Type(index),
                                Arg::List(_) => Factor::Seq(index),
                            }
                        })
                        .collect(),
                })
                .collect()
        })
        .collect();
    Compiled { types }
}

fn power<T: Scalar>(base: &T, exponent: u64) -> T {
    let mut acc = T::one();
    for _ in 0..exponent {
        acc = acc * base.clone();
    }
    acc
}

/// The internal numerical oracle: locates the dominant singularity of a
/// system by bisection over fixed-point convergence, or evaluates the
/// system at a user-supplied singularity, and derives the per-constructor
/// branching probabilities.
#[derive(Debug, Clone, Copy)]
pub struct Oracle {
    /// Precision of the singularity bisection.
    pub eps_rho: f64,
    /// Precision of the fixed-point evaluation.
    pub eps_y: f64,
}

impl Default for Oracle {
    fn default() -> Self {
        Self {
            eps_rho: 1e-6,
            eps_y: 1e-6,
        }
    }
}

impl Oracle {
    /// Iterates `y ← Φ(z, y)` from zero until the largest component change
    /// drops below `eps_y`, or a divergence guard fires. Convergence at `z`
    /// implies `z` is at most the singularity; divergence implies it is
    /// beyond it.
    pub fn evaluate<T: Scalar>(&self, system: &System, z: &T) -> Evaluation<T> {
        self.evaluate_compiled(&compile(system), z)
    }

    fn evaluate_compiled<T: Scalar>(&self, compiled: &Compiled, z: &T) -> Evaluation<T> {
        let eps = T::from_f64(self.eps_y);
        let cutoff = T::from_f64(DIVERGENCE_CUTOFF);
        let mut y: Vec<T> = vec![T::zero(); compiled.types.len()];
        let mut next: Vec<T> = vec![T::zero(); compiled.types.len()];
        for iteration in 0..MAX_FIXPOINT_ITERATIONS {
            if iteration == SLOW_FIXPOINT_ITERATIONS {
                warn!("fixed point is converging slowly, z is close to the singularity");
            }
            for (slot, constructors) in next.iter_mut().zip(&compiled.types) {
                let mut acc = T::zero();
                for constructor in constructors {
                    let mut value = power(z, constructor.weight);
                    for factor in &constructor.factors {
                        match factor {
                            Factor::Type(index) => value = value * y[*index].clone(),
                            Factor::Seq(index) => {
                                let base = y[*index].clone();
                                if base >= T::one() {
                                    return Evaluation::Diverged;
                                }
                                value = value * (T::one() / (T::one() - base));
                            }
                        }
                    }
                    acc = acc + value;
                }
                let acc = acc.normalize();
                if !acc.is_finite() || acc >= cutoff {
                    return Evaluation::Diverged;
                }
                *slot = acc;
            }
            let mut delta = T::zero();
            for (new, old) in next.iter().zip(&y) {
                let difference = (new.clone() - old.clone()).abs();
                if difference > delta {
                    delta = difference;
                }
            }
            std::mem::swap(&mut y, &mut next);
            if delta < eps {
                trace!("fixed point converged after {} iterations", iteration + 1);
                return Evaluation::Converged(y);
            }
        }
        warn!("fixed point exhausted its iteration budget, treating z as divergent");
        Evaluation::Diverged
    }

    /// Brackets the singularity by doubling from a small seed, then bisects
    /// until the interval is narrower than `eps_rho`. The interval
    /// endpoints are decimals; evaluation runs in double precision until
    /// the interval outgrows what doubles can resolve.
    pub fn find_singularity(&self, system: &System) -> Result<(f64, Vec<f64>), BoltzgenError> {
        if system.all_atomic() {
            // No recursion anywhere: the generating function is entire and
            // any positive parameter works.
            return match self.evaluate(system, &1.0f64) {
                Evaluation::Converged(values) => Ok((1.0, values)),
                Evaluation::Diverged => Err(BoltzgenError::OracleNonFinite(
                    "an atomic system failed to evaluate".to_string(),
                )),
            };
        }

        let compiled = compile(system);
        let mut lo = 0.0f64;
        let mut lo_values = match self.evaluate_compiled::<f64>(&compiled, &0.0) {
            Evaluation::Converged(values) => values,
            Evaluation::Diverged => {
                return Err(BoltzgenError::OracleDivergent(
                    "the generating function already diverges at z = 0".to_string(),
                ));
            }
        };

        let mut hi = BRACKET_SEED;
        loop {
            match self.evaluate_compiled::<f64>(&compiled, &hi) {
                Evaluation::Converged(values) => {
                    lo = hi;
                    lo_values = values;
                    hi *= 2.0;
                    if hi > BRACKET_LIMIT {
                        return Err(BoltzgenError::OracleDivergent(format!(
                            "no divergence below {BRACKET_LIMIT:e}; the generating function appears entire, supply a singularity explicitly"
                        )));
                    }
                }
                Evaluation::Diverged => break,
            }
        }
        debug!("bracketed the singularity in [{lo}, {hi}]");

        let mut lo_dec = <BigDecimal as Scalar>::from_f64(lo);
        let mut hi_dec = <BigDecimal as Scalar>::from_f64(hi);
        let eps = <BigDecimal as Scalar>::from_f64(self.eps_rho);
        let deep = <BigDecimal as Scalar>::from_f64(DEEP_BISECTION_WIDTH);
        let two = BigDecimal::from(2u32);
        while hi_dec.clone() - lo_dec.clone() >= eps {
            let width = hi_dec.clone() - lo_dec.clone();
            let mid = ((lo_dec.clone() + hi_dec.clone()) / two.clone()).normalize();
            let converged = if width < deep {
                self.evaluate_compiled::<BigDecimal>(&compiled, &mid)
                    .converged()
            } else {
                match self.evaluate_compiled::<f64>(&compiled, &Scalar::to_f64(&mid)) {
                    Evaluation::Converged(values) => {
                        lo = Scalar::to_f64(&mid);
                        lo_values = values;
                        true
                    }
                    Evaluation::Diverged => false,
                }
            };
            if converged {
                lo_dec = mid;
            } else {
                hi_dec = mid;
            }
        }

        let rho = Scalar::to_f64(&lo_dec);
        match self.evaluate_compiled::<f64>(&compiled, &rho) {
            Evaluation::Converged(values) => Ok((rho, values)),
            // Rounding to double can land just past the singularity; fall
            // back to the last convergent point seen.
            Evaluation::Diverged => Ok((lo, lo_values)),
        }
    }

    /// Runs the oracle and derives the branching probabilities. With a
    /// user-supplied singularity a single evaluation happens and no
    /// bisection; otherwise the singularity is located first.
    pub fn parametrise(
        &self,
        system: System,
        user_rho: Option<f64>,
    ) -> Result<ParametrisedSystem, BoltzgenError> {
        let (rho, values) = match user_rho {
            Some(rho) => {
                if !rho.is_finite() || rho <= 0.0 {
                    return Err(BoltzgenError::OracleDivergent(format!(
                        "the supplied singularity {rho} is not a positive real"
                    )));
                }
                match self.evaluate(&system, &rho) {
                    Evaluation::Converged(values) => (rho, values),
                    Evaluation::Diverged => {
                        return Err(BoltzgenError::OracleDivergent(format!(
                            "the fixed point diverges at the supplied singularity {rho}"
                        )));
                    }
                }
            }
            None => {
                let (rho, values) = self.find_singularity(&system)?;
                // A sequence base this close to 1 means the dominant
                // singularity is the sequence pole itself; the geometric
                // tail of the emitted list generator would degenerate.
                let limit = 1.0 - 10.0 * self.eps_rho.max(self.eps_y);
                for name in system.seq_types() {
                    let index = system.type_index(name).expect("sequence over defined type");
                    if values[index] >= limit {
                        return Err(BoltzgenError::OracleDivergent(format!(
                            "sequence base {name} reaches its pole at the singularity (y = {})",
                            values[index]
                        )));
                    }
                }
                (rho, values)
            }
        };
        trace!("parametrising system at ρ = {rho}");
        let branching = branching_probabilities(&system, rho, &values, &IndexMap::new())?;
        Ok(ParametrisedSystem::new(system, rho, values, branching))
    }
}

/// Computes the branching probability of every constructor: its partial
/// value `u^w · ρ^w · Π g(arg)` divided by the value of its type, with `u`
/// the optional marking multiplier of the constructor and `g` mapping type
/// references to their values and sequence references to `1/(1 - y)`.
pub(crate) fn branching_probabilities(
    system: &System,
    rho: f64,
    values: &[f64],
    marks: &IndexMap<String, f64>,
) -> Result<Vec<Vec<f64>>, BoltzgenError> {
    let mut branching = Vec::with_capacity(system.len());
    for (index, (name, constructors)) in system.defs().enumerate() {
        let total = values[index];
        if !total.is_finite() || total <= 0.0 {
            return Err(BoltzgenError::OracleNonFinite(format!(
                "type {name} has value {total} at the singularity"
            )));
        }
        let mut probabilities = Vec::with_capacity(constructors.len());
        for constructor in constructors {
            let mut value = rho.powi(constructor.weight as i32);
            if let Some(multiplier) = marks.get(&constructor.name) {
                value *= multiplier.powi(constructor.weight as i32);
            }
            for arg in &constructor.args {
                let referenced = values[system
                    .type_index(arg.referenced())
                    .expect("validated systems only reference defined types")];
                match arg {
                    Arg::Type(_) => value *= referenced,
                    Arg::List(target) => {
                        if referenced >= 1.0 {
                            return Err(BoltzgenError::OracleNonFinite(format!(
                                "sequence base {target} has value {referenced} ≥ 1"
                            )));
                        }
                        value *= 1.0 / (1.0 - referenced);
                    }
                }
            }
            let probability = value / total;
            if !probability.is_finite() {
                return Err(BoltzgenError::OracleNonFinite(format!(
                    "constructor {} has branching probability {probability}",
                    constructor.name
                )));
            }
            probabilities.push(probability);
        }
        branching.push(probabilities);
    }
    Ok(branching)
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "type")]
    name: String,
    #[tabled(rename = "value")]
    value: String,
    #[tabled(rename = "branching")]
    branching: String,
}

/// Renders the parametrised system as a table, for verbose output.
pub fn summary(parametrised: &ParametrisedSystem) -> String {
    let rows = parametrised
        .system()
        .defs()
        .map(|(name, constructors)| SummaryRow {
            name: name.to_string(),
            value: format!("{:.6}", parametrised.value(name).unwrap_or(f64::NAN)),
            branching: constructors
                .iter()
                .zip(parametrised.branching(name).unwrap_or(&[]))
                .map(|(constructor, probability)| {
                    format!("{} {probability:.4}", constructor.name)
                })
                .join(", "),
        })
        .collect_vec();
    format!(
        "singularity ρ = {}\n{}",
        parametrised.rho(),
        Table::new(rows)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::parse_system;
    use test_log::test;

    const MOTZKIN: &str = "M = Leaf | Unary M | Binary M M.";
    const BINARY_WORDS: &str = "T = Zero T | One T | Eps (0).";

    fn sharp_oracle() -> Oracle {
        Oracle {
            eps_rho: 1e-7,
            eps_y: 1e-9,
        }
    }

    #[test]
    fn motzkin_singularity_is_one_third() {
        let system = parse_system(MOTZKIN).unwrap();
        let (rho, values) = sharp_oracle().find_singularity(&system).unwrap();
        assert!((rho - 1.0 / 3.0).abs() < 1e-5, "found ρ = {rho}");
        assert!((values[0] - 1.0).abs() < 0.05, "found y = {}", values[0]);
    }

    #[test]
    fn motzkin_branching_probabilities_are_balanced() {
        let system = parse_system(MOTZKIN).unwrap();
        let oracle = sharp_oracle();
        let parametrised = oracle.parametrise(system, None).unwrap();
        let probabilities = parametrised.branching("M").unwrap();
        let total: f64 = probabilities.iter().sum();
        // the residual of the truncated fixed point dominates eps_y here
        assert!((total - 1.0).abs() < 1e-4, "probabilities sum to {total}");
        for probability in probabilities {
            assert!((probability - 1.0 / 3.0).abs() < 0.01);
        }
    }

    #[test]
    fn binary_words_singularity_is_one_half() {
        let system = parse_system(BINARY_WORDS).unwrap();
        let (rho, _) = Oracle::default().find_singularity(&system).unwrap();
        assert!((rho - 0.5).abs() < 1e-3, "found ρ = {rho}");
    }

    #[test]
    fn binary_words_branching_matches_the_parameter() {
        // at ρ the Zero and One branches each weigh exactly z
        let system = parse_system(BINARY_WORDS).unwrap();
        let parametrised = Oracle::default().parametrise(system, Some(0.499)).unwrap();
        let probabilities = parametrised.branching("T").unwrap();
        assert!((probabilities[0] - 0.499).abs() < 1e-4);
        assert!((probabilities[1] - 0.499).abs() < 1e-4);
        let total: f64 = probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-3);
    }

    #[test]
    fn sequences_of_atoms_hit_their_pole() {
        let system = parse_system("A = Run [B] (0).\nB = Bee.").unwrap();
        assert!(matches!(
            Oracle::default().parametrise(system, None),
            Err(BoltzgenError::OracleDivergent(_))
        ));
    }

    #[test]
    fn sequences_of_atoms_accept_a_user_singularity() {
        let system = parse_system("A = Run [B] (0).\nB = Bee.").unwrap();
        let parametrised = Oracle::default().parametrise(system, Some(0.5)).unwrap();
        assert!((parametrised.value("B").unwrap() - 0.5).abs() < 1e-6);
        assert!((parametrised.value("A").unwrap() - 2.0).abs() < 1e-5);
    }

    #[test]
    fn user_singularity_skips_bisection() {
        let system = parse_system(MOTZKIN).unwrap();
        let oracle = Oracle {
            eps_rho: 1e-6,
            eps_y: 1e-10,
        };
        let parametrised = oracle.parametrise(system, Some(0.33333)).unwrap();
        assert_eq!(parametrised.rho(), 0.33333);
        let total: f64 = parametrised.branching("M").unwrap().iter().sum();
        assert!((total - 1.0).abs() < 1e-4);
    }

    #[test]
    fn user_singularity_past_the_radius_diverges() {
        let system = parse_system(MOTZKIN).unwrap();
        assert!(matches!(
            Oracle::default().parametrise(system, Some(0.4)),
            Err(BoltzgenError::OracleDivergent(_))
        ));
    }

    #[test]
    fn non_positive_user_singularities_are_rejected() {
        let system = parse_system(MOTZKIN).unwrap();
        assert!(matches!(
            Oracle::default().parametrise(system, Some(-0.25)),
            Err(BoltzgenError::OracleDivergent(_))
        ));
    }

    #[test]
    fn atomic_systems_take_any_singularity() {
        let system = parse_system("T = Heads | Tails.").unwrap();
        let parametrised = Oracle::default().parametrise(system, None).unwrap();
        assert_eq!(parametrised.rho(), 1.0);
        let probabilities = parametrised.branching("T").unwrap();
        assert!((probabilities[0] - 0.5).abs() < 1e-9);
        assert!((probabilities[1] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn bounded_systems_saturate_at_the_cutoff() {
        // The generating function of T = Cons A | Nil over an atomic A is a
        // polynomial; divergence only ever fires through the cutoff guard,
        // which caps the singularity instead of failing the run.
        let system = parse_system("T = Cons A | Nil.\nA = Atom.").unwrap();
        let parametrised = Oracle::default().parametrise(system, None).unwrap();
        assert!(parametrised.rho() > 1.0);
        let total: f64 = parametrised.branching("T").unwrap().iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn convergence_is_monotone_below_the_singularity() {
        let system = parse_system(MOTZKIN).unwrap();
        let oracle = Oracle::default();
        let mut last_converged = true;
        for step in 1..=50 {
            let z = step as f64 * 0.01;
            let converged = oracle.evaluate(&system, &z).converged();
            // once divergence starts it never stops
            assert!(converged || !last_converged || z > 1.0 / 3.0);
            if !last_converged {
                assert!(!converged);
            }
            last_converged = converged;
        }
        assert!(!last_converged);
    }

    #[test]
    fn the_decimal_path_matches_the_double_path() {
        let system = parse_system(MOTZKIN).unwrap();
        let oracle = Oracle::default();
        let z = <BigDecimal as Scalar>::from_f64(0.25);
        match oracle.evaluate(&system, &z) {
            Evaluation::Converged(values) => {
                let double = match oracle.evaluate(&system, &0.25f64) {
                    Evaluation::Converged(values) => values[0],
                    Evaluation::Diverged => panic!("double path diverged"),
                };
                assert!((Scalar::to_f64(&values[0]) - double).abs() < 1e-6);
            }
            Evaluation::Diverged => panic!("decimal path diverged"),
        }
        let past = <BigDecimal as Scalar>::from_f64(0.4);
        assert!(!oracle.evaluate(&system, &past).converged());
    }

    #[test]
    fn summary_lists_every_type() {
        let system = parse_system(BINARY_WORDS).unwrap();
        let parametrised = Oracle::default().parametrise(system, Some(0.49)).unwrap();
        let table = summary(&parametrised);
        assert!(table.contains("T"));
        assert!(table.contains("Zero"));
        assert!(table.contains("singularity"));
    }
}
