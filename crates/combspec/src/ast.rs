/// A parsed specification file: the annotation preamble and the type
/// definitions, both in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecFile {
    pub annotations: Vec<(String, String)>,
    pub defs: Vec<TypeDef>,
}

impl SpecFile {
    /// Looks up the first annotation with the given key.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// One `Name = Variant | … .` block.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub name: String,
    pub variants: Vec<VariantDef>,
}

/// A constructor as written in the source, before weights are defaulted.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantDef {
    pub name: String,
    pub args: Vec<ArgDef>,
    pub weight: Option<u64>,
    pub frequency: Option<f64>,
}

impl VariantDef {
    /// The atom weight of the constructor, defaulting to 1 when the source
    /// carries no `(w)` annotation.
    pub fn weight_or_default(&self) -> u64 {
        self.weight.unwrap_or(1)
    }
}

/// A constructor argument as written: a plain type reference or a `[T]`
/// sequence form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgDef {
    Plain(String),
    Sequence(String),
}

impl ArgDef {
    /// The referenced type name.
    pub fn referenced(&self) -> &str {
        match self {
            Self::Plain(name) | Self::Sequence(name) => name,
        }
    }
}
