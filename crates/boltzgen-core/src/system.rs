use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

/// A single constructor argument. References are resolved by name, never by
/// embedded pointers, since the type definitions are mutually recursive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Arg {
    /// A reference to another type of the system.
    Type(String),
    /// A sequence over the referenced element type.
    List(String),
}

impl Arg {
    /// The name of the type this argument refers to, regardless of whether
    /// it is a plain reference or a sequence.
    pub fn referenced(&self) -> &str {
        match self {
            Self::Type(name) | Self::List(name) => name,
        }
    }

    /// Returns `true` iff this argument is a sequence reference.
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }
}

impl std::fmt::Display for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Type(name) => write!(f, "{name}"),
            Self::List(name) => write!(f, "[{name}]"),
        }
    }
}

/// A constructor of a combinatorial type. Its `weight` is the number of
/// atoms it contributes to the size of a generated object; a constructor
/// without arguments is *atomic* and always yields a terminal value.
#[derive(Debug, Clone, PartialEq)]
pub struct Constructor {
    /// Globally unique constructor name.
    pub name: String,
    /// Ordered argument list.
    pub args: Vec<Arg>,
    /// Number of atoms contributed per occurrence.
    pub weight: u64,
    /// Optional target relative frequency, enforced by an external tuner.
    pub frequency: Option<f64>,
}

impl Constructor {
    /// Creates an unmarked constructor.
    pub fn new<N, I>(name: N, args: I, weight: u64) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = Arg>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().collect(),
            weight,
            frequency: None,
        }
    }

    /// Attaches a frequency mark to `self`.
    pub fn with_frequency(mut self, frequency: f64) -> Self {
        self.frequency = Some(frequency);
        self
    }

    /// Returns `true` iff the constructor has no arguments.
    pub fn is_atomic(&self) -> bool {
        self.args.is_empty()
    }
}

/// Errors raised while validating a freshly constructed [`System`].
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("type {0} is defined more than once")]
    DuplicateType(String),
    #[error("type {0} has no constructors")]
    EmptyType(String),
    #[error("constructor {0} is defined more than once")]
    DuplicateConstructor(String),
    #[error("constructor {constructor} references unknown type {name}")]
    UnknownType { constructor: String, name: String },
    #[error("constructor {constructor} carries invalid frequency {value}")]
    InvalidFrequency { constructor: String, value: f64 },
    #[error("system has no atomic constructor of positive weight")]
    NoAtoms,
}

/// A system of mutually recursive weighted combinatorial types: an ordered
/// mapping from type name to its constructors, together with the free-form
/// annotations of the input preamble.
///
/// A system is constructed once via [`System::new`], which validates it, and
/// is treated as immutable afterwards.
#[derive(Debug, Clone)]
pub struct System {
    defs: IndexMap<String, Vec<Constructor>>,
    annotations: IndexMap<String, String>,
}

impl System {
    /// Validates and wraps the given definitions. Checks that every
    /// reference resolves, constructor names are globally unique,
    /// frequencies are positive and finite, and that the system has at
    /// least one atomic constructor and at least one positive weight
    /// (otherwise the generating function is degenerate and no sampler can
    /// terminate).
    pub fn new(
        defs: IndexMap<String, Vec<Constructor>>,
        annotations: IndexMap<String, String>,
    ) -> Result<Self, SystemError> {
        let mut seen = IndexSet::new();
        for (name, constructors) in &defs {
            if constructors.is_empty() {
                return Err(SystemError::EmptyType(name.clone()));
            }
            for constructor in constructors {
                if !seen.insert(constructor.name.as_str()) {
                    return Err(SystemError::DuplicateConstructor(constructor.name.clone()));
                }
                for arg in &constructor.args {
                    if !defs.contains_key(arg.referenced()) {
                        return Err(SystemError::UnknownType {
                            constructor: constructor.name.clone(),
                            name: arg.referenced().to_string(),
                        });
                    }
                }
                if let Some(frequency) = constructor.frequency {
                    if !frequency.is_finite() || frequency <= 0.0 {
                        return Err(SystemError::InvalidFrequency {
                            constructor: constructor.name.clone(),
                            value: frequency,
                        });
                    }
                }
            }
        }
        let system = Self { defs, annotations };
        if !system.has_atoms() || system.constructors().all(|(_, c)| c.weight == 0) {
            return Err(SystemError::NoAtoms);
        }
        Ok(system)
    }

    /// Number of types in the system.
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Returns `true` iff the system defines no types.
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Iterates over the type names in definition order.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.defs.keys().map(String::as_str)
    }

    /// Position of the named type in definition order.
    pub fn type_index(&self, name: &str) -> Option<usize> {
        self.defs.get_index_of(name)
    }

    /// Returns `true` iff the named type is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }

    /// The constructors of the named type, if it is defined.
    pub fn constructors_of(&self, name: &str) -> Option<&[Constructor]> {
        self.defs.get(name).map(Vec::as_slice)
    }

    /// Iterates over `(type name, constructors)` in definition order.
    pub fn defs(&self) -> impl Iterator<Item = (&str, &[Constructor])> {
        self.defs
            .iter()
            .map(|(name, constructors)| (name.as_str(), constructors.as_slice()))
    }

    /// Flattened traversal over all constructors, in system order. This is
    /// the canonical order for frequency indices and wire formats.
    pub fn constructors(&self) -> impl Iterator<Item = (&str, &Constructor)> {
        self.defs
            .iter()
            .flat_map(|(name, constructors)| constructors.iter().map(move |c| (name.as_str(), c)))
    }

    /// Looks up a preamble annotation.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    /// Iterates over all preamble annotations.
    pub fn annotations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.annotations
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns `true` iff every constructor of the named type is atomic.
    pub fn is_atomic(&self, name: &str) -> bool {
        self.defs
            .get(name)
            .is_some_and(|constructors| constructors.iter().all(Constructor::is_atomic))
    }

    /// The set of types all of whose constructors are atomic, in definition
    /// order.
    pub fn atomic_types(&self) -> IndexSet<&str> {
        self.types().filter(|name| self.is_atomic(name)).collect()
    }

    /// The set of types referenced through a sequence argument, ordered by
    /// first occurrence in the constructor traversal.
    pub fn seq_types(&self) -> IndexSet<&str> {
        self.constructors()
            .flat_map(|(_, c)| c.args.iter())
            .filter(|arg| arg.is_list())
            .map(Arg::referenced)
            .collect()
    }

    /// Returns `true` iff the system contains at least one atomic
    /// constructor.
    pub fn has_atoms(&self) -> bool {
        self.constructors().any(|(_, c)| c.is_atomic())
    }

    /// Returns `true` iff every type of the system is atomic, i.e. the
    /// system has no recursion at all. Such systems have an entire
    /// generating function and admit any positive Boltzmann parameter.
    pub fn all_atomic(&self) -> bool {
        self.types().all(|name| self.is_atomic(name))
    }

    /// The frequency-marked constructors in traversal order, which fixes
    /// the index of each marking variable.
    pub fn frequencies(&self) -> Vec<(&str, f64)> {
        self.constructors()
            .filter_map(|(_, c)| c.frequency.map(|f| (c.name.as_str(), f)))
            .collect()
    }

    /// Returns `true` iff any constructor carries a frequency mark.
    pub fn has_frequencies(&self) -> bool {
        self.constructors().any(|(_, c)| c.frequency.is_some())
    }
}

/// A system evaluated at a Boltzmann parameter: the singularity `rho`, the
/// generating-function value of every type at `rho` and the branching
/// probability of every constructor, all parallel to the definition order
/// of the retained integer-weight [`System`].
///
/// Produced once by an oracle, consumed once by the sampler planner.
#[derive(Debug, Clone)]
pub struct ParametrisedSystem {
    system: System,
    rho: f64,
    values: Vec<f64>,
    branching: Vec<Vec<f64>>,
}

impl ParametrisedSystem {
    /// Bundles an oracle result. `values` holds one generating-function
    /// value per type and `branching` one probability per constructor, both
    /// in definition order.
    pub fn new(system: System, rho: f64, values: Vec<f64>, branching: Vec<Vec<f64>>) -> Self {
        debug_assert_eq!(values.len(), system.len());
        debug_assert_eq!(branching.len(), system.len());
        debug_assert!(
            system
                .defs()
                .zip(&branching)
                .all(|((_, constructors), probabilities)| constructors.len()
                    == probabilities.len())
        );
        Self {
            system,
            rho,
            values,
            branching,
        }
    }

    /// The Boltzmann parameter the system was evaluated at.
    pub fn rho(&self) -> f64 {
        self.rho
    }

    /// The underlying integer-weight system.
    pub fn system(&self) -> &System {
        &self.system
    }

    /// The generating-function value of the named type at `rho`.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.system.type_index(name).map(|idx| self.values[idx])
    }

    /// Iterates over `(type name, value)` pairs in definition order.
    pub fn values(&self) -> impl Iterator<Item = (&str, f64)> {
        self.system.types().zip(self.values.iter().copied())
    }

    /// The branching probabilities of the named type, one per constructor.
    pub fn branching(&self, name: &str) -> Option<&[f64]> {
        self.system
            .type_index(name)
            .map(|idx| self.branching[idx].as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motzkin() -> IndexMap<String, Vec<Constructor>> {
        let constructors = vec![
            Constructor::new("Leaf", [], 1),
            Constructor::new("Unary", [Arg::Type("M".into())], 1),
            Constructor::new("Binary", [Arg::Type("M".into()), Arg::Type("M".into())], 1),
        ];
        IndexMap::from([("M".to_string(), constructors)])
    }

    #[test]
    fn validates_motzkin() {
        let system = System::new(motzkin(), IndexMap::new()).unwrap();
        assert_eq!(system.len(), 1);
        assert!(system.has_atoms());
        assert!(!system.all_atomic());
        assert!(system.atomic_types().is_empty());
        assert!(system.seq_types().is_empty());
    }

    #[test]
    fn rejects_unknown_type() {
        let defs = IndexMap::from([(
            "T".to_string(),
            vec![
                Constructor::new("Nil", [], 1),
                Constructor::new("Cons", [Arg::Type("Missing".into())], 1),
            ],
        )]);
        assert!(matches!(
            System::new(defs, IndexMap::new()),
            Err(SystemError::UnknownType { name, .. }) if name == "Missing"
        ));
    }

    #[test]
    fn rejects_duplicate_constructor() {
        let defs = IndexMap::from([
            ("A".to_string(), vec![Constructor::new("X", [], 1)]),
            ("B".to_string(), vec![Constructor::new("X", [], 1)]),
        ]);
        assert!(matches!(
            System::new(defs, IndexMap::new()),
            Err(SystemError::DuplicateConstructor(name)) if name == "X"
        ));
    }

    #[test]
    fn rejects_weightless_system() {
        let defs = IndexMap::from([("T".to_string(), vec![Constructor::new("Eps", [], 0)])]);
        assert!(matches!(
            System::new(defs, IndexMap::new()),
            Err(SystemError::NoAtoms)
        ));
    }

    #[test]
    fn rejects_atomless_system() {
        let defs = IndexMap::from([(
            "T".to_string(),
            vec![Constructor::new("Loop", [Arg::Type("T".into())], 1)],
        )]);
        assert!(matches!(
            System::new(defs, IndexMap::new()),
            Err(SystemError::NoAtoms)
        ));
    }

    #[test]
    fn rejects_non_positive_frequency() {
        let defs = IndexMap::from([(
            "T".to_string(),
            vec![
                Constructor::new("A", [], 1),
                Constructor::new("B", [], 1).with_frequency(-0.5),
            ],
        )]);
        assert!(matches!(
            System::new(defs, IndexMap::new()),
            Err(SystemError::InvalidFrequency { .. })
        ));
    }

    #[test]
    fn weight_zero_atomics_are_legal() {
        // binary words: T = Zero T | One T | Eps, weights 1, 1, 0
        let defs = IndexMap::from([(
            "T".to_string(),
            vec![
                Constructor::new("Zero", [Arg::Type("T".into())], 1),
                Constructor::new("One", [Arg::Type("T".into())], 1),
                Constructor::new("Eps", [], 0),
            ],
        )]);
        assert!(System::new(defs, IndexMap::new()).is_ok());
    }

    #[test]
    fn traversal_order_is_definition_order() {
        let defs = IndexMap::from([
            (
                "A".to_string(),
                vec![
                    Constructor::new("A1", [], 1),
                    Constructor::new("A2", [Arg::List("B".into())], 1),
                ],
            ),
            ("B".to_string(), vec![Constructor::new("B1", [], 1)]),
        ]);
        let system = System::new(defs, IndexMap::new()).unwrap();
        let names: Vec<_> = system.constructors().map(|(_, c)| c.name.clone()).collect();
        assert_eq!(names, ["A1", "A2", "B1"]);
        assert_eq!(system.seq_types().into_iter().collect::<Vec<_>>(), ["B"]);
        assert_eq!(system.type_index("B"), Some(1));
    }
}
