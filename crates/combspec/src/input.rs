use chumsky::prelude::*;
use chumsky::{Parser, Stream, select};

use crate::lexer::{self, Token};
use crate::{ArgDef, SpecError, SpecFile, TypeDef, VariantDef, build_error_report};

/// Parses a specification source into a [`SpecFile`].
pub fn parse_spec(source: &str) -> Result<SpecFile, SpecError> {
    let start = std::time::Instant::now();
    let tokens = lexer::tokenizer()
        .parse(source)
        .map_err(|error_list| {
            build_error_report(
                source,
                error_list.into_iter().map(|err| err.map(|c| c.to_string())),
            )
        })
        .map_err(SpecError::Lexer)?;
    tracing::trace!("tokenization took {}µs", start.elapsed().as_micros());

    let length = source.chars().count();
    let start = std::time::Instant::now();
    let out = spec_parser()
        .parse(Stream::from_iter(length..length + 1, tokens.into_iter()))
        .map_err(|error_list| {
            build_error_report(
                source,
                error_list.into_iter().map(|err| err.map(|t| t.to_string())),
            )
        })
        .map_err(SpecError::Parser);
    tracing::trace!("parsing took {}µs", start.elapsed().as_micros());
    out
}

fn spec_parser() -> impl Parser<Token, SpecFile, Error = Simple<Token>> {
    let ident = select! { Token::Identifier(name) => name };

    let nat = select! { Token::Nat(n) => n }.try_map(|n: String, span| {
        n.parse::<u64>()
            .map_err(|err| Simple::custom(span, format!("invalid weight {n}: {err}")))
    });

    let number = select! {
        Token::Decimal(d) => d,
        Token::Nat(n) => n,
    }
    .try_map(|d: String, span| {
        d.parse::<f64>()
            .map_err(|err| Simple::custom(span, format!("invalid number {d}: {err}")))
    });

    let scalar = select! {
        Token::Identifier(value) => value,
        Token::Text(value) => value,
        Token::Nat(value) => value,
        Token::Decimal(value) => value,
    };

    let annotation = select! { Token::Annotation(key) => key }.then(scalar);

    let arg = ident.map(ArgDef::Plain).or(just(Token::Paren('['))
        .ignore_then(ident)
        .then_ignore(just(Token::Paren(']')))
        .map(ArgDef::Sequence));

    let weight = just(Token::Paren('('))
        .ignore_then(nat)
        .then_ignore(just(Token::Paren(')')));

    let frequency = just(Token::Paren('['))
        .ignore_then(number)
        .then_ignore(just(Token::Paren(']')));

    let variant = ident
        .then(arg.repeated())
        .then(weight.or_not())
        .then(frequency.or_not())
        .map(|(((name, args), weight), frequency)| VariantDef {
            name,
            args,
            weight,
            frequency,
        });

    let typedef = ident
        .then_ignore(just(Token::Op('=')))
        .then(
            variant
                .separated_by(just(Token::Op('|')))
                .at_least(1)
                .allow_leading(),
        )
        .then_ignore(just(Token::Op('.')))
        .map(|(name, variants)| TypeDef { name, variants });

    annotation
        .repeated()
        .then(typedef.repeated().at_least(1))
        .then_ignore(end())
        .map(|(annotations, defs)| SpecFile { annotations, defs })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_motzkin() {
        let spec = parse_spec("-- Motzkin trees\nM = Leaf | Unary M | Binary M M.").unwrap();
        assert!(spec.annotations.is_empty());
        assert_eq!(spec.defs.len(), 1);
        let def = &spec.defs[0];
        assert_eq!(def.name, "M");
        assert_eq!(def.variants.len(), 3);
        assert_eq!(def.variants[0].name, "Leaf");
        assert!(def.variants[0].args.is_empty());
        assert_eq!(def.variants[0].weight_or_default(), 1);
        assert_eq!(
            def.variants[2].args,
            vec![ArgDef::Plain("M".into()), ArgDef::Plain("M".into())]
        );
    }

    #[test]
    fn parses_weights_and_frequencies() {
        let spec = parse_spec("T = Zero T (1) [0.3] | One T | Eps (0).").unwrap();
        let def = &spec.defs[0];
        assert_eq!(def.variants[0].weight, Some(1));
        assert_eq!(def.variants[0].frequency, Some(0.3));
        assert_eq!(def.variants[1].weight, None);
        assert_eq!(def.variants[2].weight, Some(0));
        assert_eq!(def.variants[2].frequency, None);
    }

    #[test]
    fn parses_sequence_arguments() {
        let spec = parse_spec("A = Run [B] (0).\nB = Bee.").unwrap();
        assert_eq!(spec.defs.len(), 2);
        assert_eq!(
            spec.defs[0].variants[0].args,
            vec![ArgDef::Sequence("B".into())]
        );
        assert_eq!(spec.defs[0].variants[0].weight, Some(0));
    }

    #[test]
    fn parses_the_annotation_preamble() {
        let spec = parse_spec(
            "@withIO false\n@module words\n@tuner \"/opt/solver\"\nT = Le T | Eps (0).",
        )
        .unwrap();
        assert_eq!(spec.annotation("withIO"), Some("false"));
        assert_eq!(spec.annotation("module"), Some("words"));
        assert_eq!(spec.annotation("tuner"), Some("/opt/solver"));
        assert_eq!(spec.annotation("missing"), None);
    }

    #[test]
    fn multiline_blocks_with_leading_bars_parse() {
        let spec = parse_spec("M =\n    | Leaf\n    | Unary M\n    | Binary M M.\n").unwrap();
        assert_eq!(spec.defs[0].variants.len(), 3);
    }

    #[test]
    fn a_missing_terminator_is_a_parse_error() {
        assert!(matches!(
            parse_spec("M = Leaf | Unary M"),
            Err(SpecError::Parser(_))
        ));
    }

    #[test]
    fn stray_characters_are_lexer_errors() {
        assert!(matches!(
            parse_spec("M = Leaf & Unary M."),
            Err(SpecError::Lexer(_))
        ));
    }

    #[test]
    fn an_empty_file_has_no_definitions() {
        assert!(parse_spec("-- nothing here\n").is_err());
    }
}
