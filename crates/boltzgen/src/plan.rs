use itertools::Itertools;
use tracing::trace;

use boltzgen_core::{Arg, ParametrisedSystem};

/// A recursive call a branch performs for one constructor argument, in
/// argument order. The remaining size budget is threaded through the calls
/// by the emitted code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// Generate one value of the named type.
    Generate(String),
    /// Generate a sequence of values of the named type.
    GenerateList(String),
}

impl Call {
    /// The type the call produces values of.
    pub fn target(&self) -> &str {
        match self {
            Self::Generate(name) | Self::GenerateList(name) => name,
        }
    }
}

/// The plan for one constructor: its cumulative-probability cutoff, the
/// atoms it emits and the child calls it performs.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchPlan {
    /// Constructor name, used for the emitted variant.
    pub constructor: String,
    /// Cumulative branching probability this branch is selected below.
    /// `None` on the final branch, which is taken as the fallthrough.
    pub upper: Option<f64>,
    /// Atoms emitted by this branch.
    pub weight: u64,
    /// Whether the emitted code must re-check the budget before emitting
    /// the atoms. Set exactly when the branch carries weight, which covers
    /// the early abort interruptible rational systems rely on while keeping
    /// weightless constructors reachable on an exhausted budget.
    pub guard: bool,
    /// Child calls in argument order.
    pub calls: Vec<Call>,
}

/// The decision plan of one type: branches over the cumulative branching
/// probabilities, in system order.
#[derive(Debug, Clone, PartialEq)]
pub struct TypePlan {
    pub name: String,
    pub branches: Vec<BranchPlan>,
}

/// The plan of a synthesised sequence generator: draw one more element with
/// the continuation probability (the element type's value at the
/// singularity), otherwise terminate.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPlan {
    pub elem: String,
    pub continue_probability: f64,
}

/// The abstract sampler plan: one decision plan per type and one generator
/// plan per sequence type, ready to be rendered by the emitter.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerPlan {
    pub types: Vec<TypePlan>,
    pub lists: Vec<ListPlan>,
}

/// Builds the sampler plan of a parametrised system.
pub fn plan(parametrised: &ParametrisedSystem) -> SamplerPlan {
    let system = parametrised.system();
    let types = system
        .defs()
        .map(|(name, constructors)| {
            let probabilities = parametrised
                .branching(name)
                .expect("the parametrised system covers every type");
            let mut cumulative = 0.0;
            let branches = constructors
                .iter()
                .zip(probabilities)
                .enumerate()
                .map(|(index, (constructor, probability))| {
                    cumulative += probability;
                    let last = index + 1 == constructors.len();
                    BranchPlan {
                        constructor: constructor.name.clone(),
                        upper: (!last).then_some(cumulative),
                        weight: constructor.weight,
                        guard: constructor.weight > 0,
                        calls: constructor
                            .args
                            .iter()
                            .map(|arg| match arg {
                                Arg::Type(target) => Call::Generate(target.clone()),
                                Arg::List(target) => Call::GenerateList(target.clone()),
                            })
                            .collect(),
                    }
                })
                .collect_vec();
            trace!(
                "planned {} branches for type {name}",
                branches.len()
            );
            TypePlan {
                name: name.to_string(),
                branches,
            }
        })
        .collect_vec();

    let lists = system
        .seq_types()
        .into_iter()
        .map(|elem| ListPlan {
            elem: elem.to_string(),
            continue_probability: parametrised
                .value(elem)
                .expect("sequence elements are defined types"),
        })
        .collect_vec();

    SamplerPlan { types, lists }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::parse_system;
    use crate::oracle::Oracle;

    fn planned(source: &str) -> SamplerPlan {
        let system = parse_system(source).unwrap();
        let parametrised = Oracle::default().parametrise(system, None).unwrap();
        plan(&parametrised)
    }

    #[test]
    fn cumulative_probabilities_are_nondecreasing() {
        let plan = planned("M = Leaf | Unary M | Binary M M.");
        let branches = &plan.types[0].branches;
        assert_eq!(branches.len(), 3);
        let first = branches[0].upper.unwrap();
        let second = branches[1].upper.unwrap();
        assert!(0.0 < first && first <= second && second <= 1.0 + 1e-6);
        assert_eq!(branches[2].upper, None);
    }

    #[test]
    fn branches_carry_their_calls_in_argument_order() {
        let plan = planned("M = Leaf | Unary M | Binary M M.");
        let branches = &plan.types[0].branches;
        assert!(branches[0].calls.is_empty());
        assert_eq!(branches[1].calls, vec![Call::Generate("M".into())]);
        assert_eq!(
            branches[2].calls,
            vec![Call::Generate("M".into()), Call::Generate("M".into())]
        );
    }

    #[test]
    fn weightless_branches_are_unguarded() {
        let system = parse_system("T = Zero T | One T | Eps (0).").unwrap();
        let parametrised = Oracle::default().parametrise(system, Some(0.49)).unwrap();
        let plan = plan(&parametrised);
        let branches = &plan.types[0].branches;
        assert!(branches[0].guard);
        assert!(branches[1].guard);
        assert!(!branches[2].guard);
        assert_eq!(branches[2].weight, 0);
    }

    #[test]
    fn sequence_types_get_list_plans() {
        let system = parse_system("A = Run [B] (0).\nB = Bee.").unwrap();
        let parametrised = Oracle::default().parametrise(system, Some(0.5)).unwrap();
        let plan = plan(&parametrised);
        assert_eq!(plan.lists.len(), 1);
        let list = &plan.lists[0];
        assert_eq!(list.elem, "B");
        assert!((list.continue_probability - 0.5).abs() < 1e-9);
        assert_eq!(
            plan.types[0].branches[0].calls,
            vec![Call::GenerateList("B".into())]
        );
    }
}
