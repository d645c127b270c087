use tracing::debug;

use crate::graph::DependencyGraph;
use crate::system::{Constructor, System};

/// The classification of a system, which controls how a sampler is derived
/// for it: rational systems admit the linear-recurrence specialisation,
/// algebraic systems the general polynomial one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemClass {
    /// Linear, interruptible and strongly connected.
    Rational,
    /// Contains sequence arguments or multiple non-atomic references, but
    /// is otherwise well-formed.
    Algebraic,
    /// Neither of the above; the reason is recorded.
    Unsupported(String),
}

impl std::fmt::Display for SystemClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rational => write!(f, "rational"),
            Self::Algebraic => write!(f, "algebraic"),
            Self::Unsupported(reason) => write!(f, "unsupported ({reason})"),
        }
    }
}

impl SystemClass {
    /// Returns `true` iff the class is [`SystemClass::Rational`].
    pub fn is_rational(&self) -> bool {
        matches!(self, Self::Rational)
    }
}

/// A constructor is linear iff it has no sequence argument and at most one
/// argument referencing a non-atomic type.
pub fn linear(system: &System, constructor: &Constructor) -> bool {
    !constructor.args.iter().any(|arg| arg.is_list())
        && constructor
            .args
            .iter()
            .filter(|arg| !system.is_atomic(arg.referenced()))
            .count()
            <= 1
}

/// A constructor is interruptible iff at most one of its arguments
/// references an atomic type, so each recursive descent can re-check the
/// size budget after at most one unavoidable atom emission.
pub fn interruptible(system: &System, constructor: &Constructor) -> bool {
    constructor
        .args
        .iter()
        .filter(|arg| system.is_atomic(arg.referenced()))
        .count()
        <= 1
}

/// Classifies `system`. The classification is deterministic and depends
/// only on the structure of the system, never on its weights.
pub fn classify(system: &System) -> SystemClass {
    if system.constructors().any(|(_, c)| !linear(system, c)) {
        debug!("system contains a non-linear constructor, classifying as algebraic");
        return SystemClass::Algebraic;
    }
    let components = DependencyGraph::of(system).scc_count();
    if components != 1 {
        return SystemClass::Unsupported(format!("{components} strongly connected components"));
    }
    if let Some((_, constructor)) = system
        .constructors()
        .find(|(_, c)| !interruptible(system, c))
    {
        return SystemClass::Unsupported(format!(
            "constructor {} cannot re-check the size budget between atoms",
            constructor.name
        ));
    }
    // Frequencies are tuned jointly with the singularity by the external
    // convex solver, which only handles the algebraic encoding; reject the
    // rational case instead of silently ignoring the marks.
    if let Some((_, constructor)) = system.constructors().find(|(_, c)| c.frequency.is_some()) {
        return SystemClass::Unsupported(format!(
            "frequency mark on constructor {} of a rational system",
            constructor.name
        ));
    }
    SystemClass::Rational
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{Arg, Constructor};
    use indexmap::IndexMap;

    fn system(defs: IndexMap<String, Vec<Constructor>>) -> System {
        System::new(defs, IndexMap::new()).unwrap()
    }

    fn motzkin() -> System {
        system(IndexMap::from([(
            "M".to_string(),
            vec![
                Constructor::new("Leaf", [], 1),
                Constructor::new("Unary", [Arg::Type("M".into())], 1),
                Constructor::new("Binary", [Arg::Type("M".into()), Arg::Type("M".into())], 1),
            ],
        )]))
    }

    fn binary_words() -> System {
        system(IndexMap::from([(
            "T".to_string(),
            vec![
                Constructor::new("Zero", [Arg::Type("T".into())], 1),
                Constructor::new("One", [Arg::Type("T".into())], 1),
                Constructor::new("Eps", [], 0),
            ],
        )]))
    }

    #[test]
    fn motzkin_is_algebraic() {
        assert_eq!(classify(&motzkin()), SystemClass::Algebraic);
    }

    #[test]
    fn binary_words_are_rational() {
        assert_eq!(classify(&binary_words()), SystemClass::Rational);
    }

    #[test]
    fn sequence_arguments_force_algebraic() {
        let s = system(IndexMap::from([
            (
                "A".to_string(),
                vec![Constructor::new("Seq", [Arg::List("B".into())], 0)],
            ),
            ("B".to_string(), vec![Constructor::new("Bee", [], 1)]),
        ]));
        assert_eq!(classify(&s), SystemClass::Algebraic);
    }

    #[test]
    fn disconnected_rational_components_are_unsupported() {
        let s = system(IndexMap::from([
            (
                "A".to_string(),
                vec![
                    Constructor::new("A0", [Arg::Type("A".into())], 1),
                    Constructor::new("AEps", [], 0),
                ],
            ),
            (
                "B".to_string(),
                vec![
                    Constructor::new("B0", [Arg::Type("B".into())], 1),
                    Constructor::new("BEps", [], 0),
                ],
            ),
        ]));
        assert_eq!(
            classify(&s),
            SystemClass::Unsupported("2 strongly connected components".to_string())
        );
    }

    #[test]
    fn double_atom_emission_is_unsupported() {
        // Pair emits two atoms per descent, so the budget cannot be
        // re-checked between them.
        let s = system(IndexMap::from([
            (
                "T".to_string(),
                vec![
                    Constructor::new("Pair", [Arg::Type("A".into()), Arg::Type("A".into())], 1),
                    Constructor::new("Nil", [], 1),
                ],
            ),
            ("A".to_string(), vec![Constructor::new("Atom", [], 1)]),
        ]));
        assert!(matches!(classify(&s), SystemClass::Unsupported(reason) if reason.contains("Pair")));
    }

    #[test]
    fn frequencies_on_rational_systems_are_rejected() {
        let s = system(IndexMap::from([(
            "T".to_string(),
            vec![
                Constructor::new("Zero", [Arg::Type("T".into())], 1).with_frequency(0.3),
                Constructor::new("Eps", [], 0),
            ],
        )]));
        assert!(
            matches!(classify(&s), SystemClass::Unsupported(reason) if reason.contains("frequency"))
        );
    }

    #[test]
    fn a_single_atomic_constructor_is_rational() {
        let s = system(IndexMap::from([(
            "T".to_string(),
            vec![Constructor::new("Obj", [], 1)],
        )]));
        assert_eq!(classify(&s), SystemClass::Rational);
    }

    #[test]
    fn classification_is_idempotent() {
        let s = motzkin();
        assert_eq!(classify(&s), classify(&s));
        let s = binary_words();
        assert_eq!(classify(&s), classify(&s));
    }
}
