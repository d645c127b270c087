//! Reading and writing of combinatorial system specifications.
//!
//! A specification file consists of a preamble of `@key value` annotations
//! followed by one block per type, for example
//!
//! ```text
//! -- Motzkin trees
//! @withIO true
//!
//! M = Leaf | Unary M | Binary M M (2) [0.3].
//! ```
//!
//! Constructor arguments are bare type references or `[T]` sequence forms;
//! a trailing `(w)` fixes the constructor's atom weight (default 1) and a
//! trailing `[f]` marks it with a target frequency. Parsing happens in two
//! stages, a character-level tokenizer and a token-level parser, both built
//! with chumsky; errors are rendered as ariadne reports over the source.

use chumsky::error::{Simple, SimpleReason};
use itertools::Itertools;

pub mod ast;
pub mod input;
pub mod lexer;
pub mod output;

pub use ast::{ArgDef, SpecFile, TypeDef, VariantDef};
pub use input::parse_spec;

/// Errors produced when reading a specification. The payloads are rendered
/// ariadne reports, ready to be printed to stderr.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("specification could not be tokenized\n{0}")]
    Lexer(String),
    #[error("specification could not be parsed\n{0}")]
    Parser(String),
}

/// Renders a batch of chumsky errors as a plain-text ariadne report.
pub fn build_error_report<I>(source: &str, errors: I) -> String
where
    I: IntoIterator<Item = Simple<String>>,
{
    use ariadne::{Config, Label, Report, ReportKind, Source};

    let mut buf: Vec<u8> = Vec::new();
    for error in errors {
        let message = match error.reason() {
            SimpleReason::Custom(message) => message.clone(),
            SimpleReason::Unclosed { delimiter, .. } => {
                format!("unclosed delimiter {delimiter}")
            }
            SimpleReason::Unexpected => match error.found() {
                Some(token) => format!("unexpected {token}"),
                None => "unexpected end of input".to_string(),
            },
        };
        let expected = error
            .expected()
            .filter_map(|expected| expected.as_ref())
            .map(|token| token.to_string())
            .collect_vec();
        let label = if expected.is_empty() {
            message.clone()
        } else {
            format!("expected one of: {}", expected.iter().join(", "))
        };
        let report = Report::build(ReportKind::Error, ("spec", error.span()))
            .with_config(Config::default().with_color(false))
            .with_message(&message)
            .with_label(Label::new(("spec", error.span())).with_message(label))
            .finish();
        let _ = report.write(ariadne::sources([("spec", source)]), &mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}
