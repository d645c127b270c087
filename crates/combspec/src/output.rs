use std::fmt::Display;

use itertools::Itertools;

use crate::{ArgDef, SpecFile, TypeDef, VariantDef};

/// Renders a specification back to its textual form. Round-trips through
/// [`crate::parse_spec`] up to whitespace.
pub fn to_spec(spec: &SpecFile) -> String {
    spec.to_string()
}

fn is_bare_scalar(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        Some(c) if c.is_ascii_digit() => value.chars().all(|c| c.is_ascii_digit() || c == '.'),
        _ => false,
    }
}

impl Display for SpecFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (key, value) in &self.annotations {
            if is_bare_scalar(value) {
                writeln!(f, "@{key} {value}")?;
            } else {
                writeln!(f, "@{key} \"{value}\"")?;
            }
        }
        if !self.annotations.is_empty() {
            writeln!(f)?;
        }
        for def in &self.defs {
            writeln!(f, "{def}")?;
        }
        Ok(())
    }
}

impl Display for TypeDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {}.", self.name, self.variants.iter().join(" | "))
    }
}

impl Display for VariantDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        if let Some(weight) = self.weight {
            write!(f, " ({weight})")?;
        }
        if let Some(frequency) = self.frequency {
            write!(f, " [{frequency}]")?;
        }
        Ok(())
    }
}

impl Display for ArgDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(name) => write!(f, "{name}"),
            Self::Sequence(name) => write!(f, "[{name}]"),
        }
    }
}
