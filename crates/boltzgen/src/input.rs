use indexmap::IndexMap;

use boltzgen_core::{Arg, Constructor, System, SystemError};
use combspec::{ArgDef, SpecFile};

use crate::BoltzgenError;

/// Converts a parsed specification into a validated [`System`].
pub fn system_from_spec(spec: SpecFile) -> Result<System, SystemError> {
    let mut defs = IndexMap::new();
    for def in spec.defs {
        let constructors = def
            .variants
            .into_iter()
            .map(|variant| Constructor {
                name: variant.name,
                weight: variant.weight.unwrap_or(1),
                frequency: variant.frequency,
                args: variant
                    .args
                    .into_iter()
                    .map(|arg| match arg {
                        ArgDef::Plain(name) => Arg::Type(name),
                        ArgDef::Sequence(name) => Arg::List(name),
                    })
                    .collect(),
            })
            .collect();
        if defs.insert(def.name.clone(), constructors).is_some() {
            return Err(SystemError::DuplicateType(def.name));
        }
    }
    System::new(defs, spec.annotations.into_iter().collect())
}

/// Parses a specification source all the way into a validated [`System`].
pub fn parse_system(source: &str) -> Result<System, BoltzgenError> {
    let spec = combspec::parse_spec(source)?;
    Ok(system_from_spec(spec)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_and_defaults_weights() {
        let system = parse_system("M = Leaf | Unary M | Binary M M (2).").unwrap();
        let constructors = system.constructors_of("M").unwrap();
        assert_eq!(constructors[0].weight, 1);
        assert_eq!(constructors[2].weight, 2);
        assert_eq!(constructors[1].args, vec![Arg::Type("M".into())]);
    }

    #[test]
    fn keeps_annotations() {
        let system = parse_system("@withShow false\nT = Le T | Eps (0).").unwrap();
        assert_eq!(system.annotation("withShow"), Some("false"));
    }

    #[test]
    fn converts_sequence_arguments() {
        let system = parse_system("A = Run [B] (0).\nB = Bee.").unwrap();
        let constructors = system.constructors_of("A").unwrap();
        assert_eq!(constructors[0].args, vec![Arg::List("B".into())]);
    }

    #[test]
    fn rejects_duplicate_type_blocks() {
        assert!(matches!(
            parse_system("T = A.\nT = B."),
            Err(BoltzgenError::System(SystemError::DuplicateType(name))) if name == "T"
        ));
    }

    #[test]
    fn rejects_unknown_references() {
        assert!(matches!(
            parse_system("T = Cons U | Nil."),
            Err(BoltzgenError::System(SystemError::UnknownType { .. }))
        ));
    }
}
