use indexmap::IndexMap;
use rand::Rng;

use crate::system::{Arg, Constructor, System};

/// Generates a random well-formed system with at most `max_types` types.
/// Every type gets an atomic constructor of weight 1 first, so the result
/// always passes validation; the remaining constructors draw their argument
/// lists uniformly over plain and sequence references.
///
/// This exists for property tests: classification must be deterministic and
/// the dependency graph invariants must hold on arbitrary valid input.
pub fn random_system<R: Rng + ?Sized>(rng: &mut R, max_types: usize) -> System {
    let num_types = rng.gen_range(1..=max_types.max(1));
    let names: Vec<String> = (0..num_types).map(|i| format!("T{i}")).collect();

    let mut defs = IndexMap::new();
    for (i, name) in names.iter().enumerate() {
        let mut constructors = vec![Constructor::new(format!("C{i}x0"), [], 1)];
        for j in 1..=rng.gen_range(0..3usize) {
            let num_args = rng.gen_range(0..3usize);
            let args: Vec<Arg> = (0..num_args)
                .map(|_| {
                    let target = names[rng.gen_range(0..num_types)].clone();
                    if rng.gen_bool(0.25) {
                        Arg::List(target)
                    } else {
                        Arg::Type(target)
                    }
                })
                .collect();
            constructors.push(Constructor::new(
                format!("C{i}x{j}"),
                args,
                rng.gen_range(0..3u64),
            ));
        }
        defs.insert(name.clone(), constructors);
    }

    System::new(defs, IndexMap::new()).expect("randomly generated system is well-formed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::graph::DependencyGraph;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn random_systems_validate() {
        let mut rng = StdRng::seed_from_u64(0xb017);
        for _ in 0..100 {
            let system = random_system(&mut rng, 4);
            assert!(!system.is_empty());
            assert!(system.has_atoms());
        }
    }

    #[test]
    fn classification_is_deterministic_on_random_systems() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..100 {
            let system = random_system(&mut rng, 4);
            assert_eq!(classify(&system), classify(&system));
        }
    }

    #[test]
    fn dependency_graphs_of_random_systems_are_sound() {
        let mut rng = StdRng::seed_from_u64(0xfeed);
        for _ in 0..100 {
            let system = random_system(&mut rng, 4);
            let graph = DependencyGraph::of(&system);
            assert_eq!(
                graph.vertex_count(),
                system.len() + system.seq_types().len()
            );
            assert!(graph.scc_count() >= 1);
            assert!(graph.sequences_reachable());
        }
    }
}
