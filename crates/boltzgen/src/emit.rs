use std::fmt::Write;

use itertools::Itertools;
use tracing::debug;

use boltzgen_core::{ParametrisedSystem, System};

use crate::BoltzgenError;
use crate::plan::{BranchPlan, Call, SamplerPlan};

/// Switches of the emitter, read from the command line (`module`) and the
/// system's annotation preamble (everything else).
#[derive(Debug, Clone)]
pub struct EmitterFlags {
    /// Identifier of the emitted module, used in its header.
    pub module: String,
    /// Emit the process-level entry points (`sample_*_io`, `main`).
    pub with_io: bool,
    /// Derive `Debug` on the emitted types and print the sampled value.
    pub with_show: bool,
    /// Size window lower bound used by the emitted `main`.
    pub lower_bound: u64,
    /// Size window upper bound used by the emitted `main`.
    pub upper_bound: u64,
}

fn bool_annotation(system: &System, key: &str, default: bool) -> Result<bool, BoltzgenError> {
    match system.annotation(key) {
        None => Ok(default),
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(BoltzgenError::BadAnnotation {
                key: key.to_string(),
                value: value.to_string(),
            }),
        },
    }
}

fn nat_annotation(system: &System, key: &str, default: u64) -> Result<u64, BoltzgenError> {
    match system.annotation(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| BoltzgenError::BadAnnotation {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

impl EmitterFlags {
    /// Reads the emitter switches from the system's annotations; `withIO`
    /// and `withShow` coerce `true`/`false` case-insensitively and default
    /// to true, `lowerBound`/`upperBound` fix the window of the emitted
    /// entry point.
    pub fn from_system(
        module: impl Into<String>,
        system: &System,
    ) -> Result<Self, BoltzgenError> {
        Ok(Self {
            module: module.into(),
            with_io: bool_annotation(system, "withIO", true)?,
            with_show: bool_annotation(system, "withShow", true)?,
            lower_bound: nat_annotation(system, "lowerBound", 10)?,
            upper_bound: nat_annotation(system, "upperBound", 200)?,
        })
    }
}

fn fn_suffix(name: &str) -> String {
    name.to_lowercase()
}

fn render_branch(out: &mut String, type_name: &str, branch: &BranchPlan, indent: &str) {
    if branch.guard {
        let _ = writeln!(out, "{indent}if budget < {} {{", branch.weight);
        let _ = writeln!(out, "{indent}    return None;");
        let _ = writeln!(out, "{indent}}}");
    }
    let variant = format!("{type_name}::{}", branch.constructor);
    if branch.calls.is_empty() {
        let _ = writeln!(out, "{indent}Some(({variant}, {}))", branch.weight);
        return;
    }
    let _ = writeln!(out, "{indent}let mut size: u64 = {};", branch.weight);
    let fields = branch
        .calls
        .iter()
        .enumerate()
        .map(|(index, call)| {
            let suffix = fn_suffix(call.target());
            match call {
                Call::Generate(_) => {
                    let _ = writeln!(
                        out,
                        "{indent}let (a{index}, s{index}) = gen_{suffix}(g, budget - size as i64)?;"
                    );
                    let _ = writeln!(out, "{indent}size += s{index};");
                    format!("Box::new(a{index})")
                }
                Call::GenerateList(_) => {
                    let _ = writeln!(
                        out,
                        "{indent}let (a{index}, s{index}) = gen_{suffix}_list(g, budget - size as i64)?;"
                    );
                    let _ = writeln!(out, "{indent}size += s{index};");
                    format!("a{index}")
                }
            }
        })
        .join(", ");
    let _ = writeln!(out, "{indent}Some(({variant}({fields}), size))");
}

/// Renders the sampler plan as a self-contained Rust module: one enum per
/// type, an embedded splitmix64 generator, a budgeted recursive generator
/// and a rejection sampler per type, one generator per sequence type, and
/// (under `with_io`) seeded entry points plus a `main`.
pub fn emit(parametrised: &ParametrisedSystem, plan: &SamplerPlan, flags: &EmitterFlags) -> String {
    debug!(
        "emitting module {} for {} types",
        flags.module,
        plan.types.len()
    );
    let mut out = String::new();
    let _ = writeln!(
        out,
        "//! Module {} - Boltzmann rejection samplers generated by boltzgen {}.",
        flags.module,
        env!("CARGO_PKG_VERSION")
    );
    let _ = writeln!(
        out,
        "//! Parametrised at singularity {:?}; do not edit by hand.",
        parametrised.rho()
    );
    let _ = writeln!(out, "#![allow(dead_code, unused_variables)]");
    let _ = writeln!(out);

    let derive = if flags.with_show {
        "#[derive(Debug, Clone)]"
    } else {
        "#[derive(Clone)]"
    };
    for type_plan in &plan.types {
        let _ = writeln!(out, "{derive}");
        let _ = writeln!(out, "pub enum {} {{", type_plan.name);
        for branch in &type_plan.branches {
            if branch.calls.is_empty() {
                let _ = writeln!(out, "    {},", branch.constructor);
            } else {
                let fields = branch
                    .calls
                    .iter()
                    .map(|call| match call {
                        Call::Generate(target) => format!("Box<{target}>"),
                        Call::GenerateList(target) => format!("Vec<{target}>"),
                    })
                    .join(", ");
                let _ = writeln!(out, "    {}({fields}),", branch.constructor);
            }
        }
        let _ = writeln!(out, "}}");
        let _ = writeln!(out);
    }

    out.push_str(
        "/// Deterministic splitmix64 stream; keeps the module dependency-free.\n\
         pub struct Gen {\n    state: u64,\n}\n\n\
         impl Gen {\n    pub fn new(seed: u64) -> Self {\n        Self { state: seed }\n    }\n\n    \
         fn next_u64(&mut self) -> u64 {\n        \
         self.state = self.state.wrapping_add(0x9e3779b97f4a7c15);\n        \
         let mut z = self.state;\n        \
         z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);\n        \
         z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);\n        \
         z ^ (z >> 31)\n    }\n\n    \
         fn next_f64(&mut self) -> f64 {\n        \
         (self.next_u64() >> 11) as f64 * (1.0 / 9007199254740992.0)\n    }\n}\n\n",
    );

    for type_plan in &plan.types {
        let suffix = fn_suffix(&type_plan.name);
        let _ = writeln!(
            out,
            "pub fn gen_{suffix}(g: &mut Gen, budget: i64) -> Option<({}, u64)> {{",
            type_plan.name
        );
        if let [only] = type_plan.branches.as_slice() {
            render_branch(&mut out, &type_plan.name, only, "    ");
        } else {
            let _ = writeln!(out, "    let choice = g.next_f64();");
            for (index, branch) in type_plan.branches.iter().enumerate() {
                match branch.upper {
                    Some(upper) if index == 0 => {
                        let _ = writeln!(out, "    if choice < {upper:?} {{");
                    }
                    Some(upper) => {
                        let _ = writeln!(out, "    }} else if choice < {upper:?} {{");
                    }
                    None => {
                        let _ = writeln!(out, "    }} else {{");
                    }
                }
                render_branch(&mut out, &type_plan.name, branch, "        ");
            }
            let _ = writeln!(out, "    }}");
        }
        let _ = writeln!(out, "}}");
        let _ = writeln!(out);
    }

    for list_plan in &plan.lists {
        let suffix = fn_suffix(&list_plan.elem);
        let _ = writeln!(
            out,
            "pub fn gen_{suffix}_list(g: &mut Gen, budget: i64) -> Option<(Vec<{}>, u64)> {{",
            list_plan.elem
        );
        let _ = writeln!(out, "    let mut items = Vec::new();");
        let _ = writeln!(out, "    let mut size: u64 = 0;");
        let _ = writeln!(
            out,
            "    while g.next_f64() < {:?} {{",
            list_plan.continue_probability
        );
        let _ = writeln!(
            out,
            "        let (item, s) = gen_{suffix}(g, budget - size as i64)?;"
        );
        let _ = writeln!(out, "        size += s;");
        let _ = writeln!(out, "        items.push(item);");
        let _ = writeln!(out, "    }}");
        let _ = writeln!(out, "    Some((items, size))");
        let _ = writeln!(out, "}}");
        let _ = writeln!(out);
    }

    for type_plan in &plan.types {
        let suffix = fn_suffix(&type_plan.name);
        let _ = writeln!(
            out,
            "pub fn sample_{suffix}(g: &mut Gen, lb: u64, ub: u64) -> {} {{",
            type_plan.name
        );
        let _ = writeln!(
            out,
            "    assert!(lb <= ub, \"empty size window: lb {{lb}} > ub {{ub}}\");"
        );
        let _ = writeln!(out, "    loop {{");
        let _ = writeln!(
            out,
            "        if let Some((value, size)) = gen_{suffix}(g, ub as i64) {{"
        );
        let _ = writeln!(out, "            if size >= lb {{");
        let _ = writeln!(out, "                return value;");
        let _ = writeln!(out, "            }}");
        let _ = writeln!(out, "        }}");
        let _ = writeln!(out, "    }}");
        let _ = writeln!(out, "}}");
        let _ = writeln!(out);
    }

    if flags.with_io {
        for type_plan in &plan.types {
            let suffix = fn_suffix(&type_plan.name);
            let _ = writeln!(
                out,
                "pub fn sample_{suffix}_io(lb: u64, ub: u64) -> {} {{",
                type_plan.name
            );
            let _ = writeln!(out, "    let seed = std::time::SystemTime::now()");
            let _ = writeln!(
                out,
                "        .duration_since(std::time::UNIX_EPOCH)"
            );
            let _ = writeln!(
                out,
                "        .map(|elapsed| elapsed.as_nanos() as u64)"
            );
            let _ = writeln!(out, "        .unwrap_or(0x9e3779b97f4a7c15);");
            let _ = writeln!(out, "    sample_{suffix}(&mut Gen::new(seed), lb, ub)");
            let _ = writeln!(out, "}}");
            let _ = writeln!(out);
        }

        let root = &plan.types[0];
        let suffix = fn_suffix(&root.name);
        let _ = writeln!(out, "fn main() {{");
        if flags.with_show {
            let _ = writeln!(
                out,
                "    let value = sample_{suffix}_io({}, {});",
                flags.lower_bound, flags.upper_bound
            );
            let _ = writeln!(out, "    println!(\"{{value:?}}\");");
        } else {
            let _ = writeln!(
                out,
                "    let _value = sample_{suffix}_io({}, {});",
                flags.lower_bound, flags.upper_bound
            );
            let _ = writeln!(
                out,
                "    println!(\"sampled one {} within [{}, {}]\");",
                root.name, flags.lower_bound, flags.upper_bound
            );
        }
        let _ = writeln!(out, "}}");
    }

    out
}
