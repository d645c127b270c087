use chumsky::prelude::*;

pub type Span = std::ops::Range<usize>;

/// A token of the specification format.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Token {
    /// A natural number literal, kept as written.
    Nat(String),
    /// A decimal literal, kept as written.
    Decimal(String),
    /// A quoted string.
    Text(String),
    /// A type or constructor name.
    Identifier(String),
    /// An `@key` annotation head.
    Annotation(String),
    /// One of `=`, `|`, `.`.
    Op(char),
    /// One of `(`, `)`, `[`, `]`.
    Paren(char),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nat(n) => write!(f, "{}", n),
            Self::Decimal(d) => write!(f, "{}", d),
            Self::Text(txt) => write!(f, "\"{}\"", txt),
            Self::Identifier(id) => write!(f, "{}", id),
            Self::Annotation(key) => write!(f, "@{}", key),
            Self::Op(o) => write!(f, "{}", o),
            Self::Paren(c) => write!(f, "{}", c),
        }
    }
}

pub fn tokenizer() -> impl Parser<char, Vec<(Token, Span)>, Error = Simple<char>> {
    let decimal = text::int(10)
        .then_ignore(just('.'))
        .then(text::digits(10))
        .map(|(int, frac): (String, String)| Token::Decimal(format!("{int}.{frac}")));

    let nat = text::int(10).map(Token::Nat);

    let str_ = just('"')
        .ignore_then(filter(|c| *c != '"').repeated())
        .then_ignore(just('"'))
        .collect::<String>()
        .map(Token::Text);

    let op = one_of("=|.").map(Token::Op);

    let paren = one_of(r#"()[]"#).map(Token::Paren);

    let raw_ident = filter(|c: &char| c.is_ascii_alphabetic() || *c == '_')
        .chain(filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_').repeated())
        .collect::<String>();

    let ident = raw_ident.map(Token::Identifier);

    let annotation = just('@').ignore_then(raw_ident).map(Token::Annotation);

    let token = decimal
        .or(nat)
        .or(str_)
        .or(annotation)
        .or(ident)
        .or(op)
        .or(paren);

    let comment = just("--")
        .then(filter(|c: &char| *c != '\n').repeated())
        .padded();

    token
        .map_with_span(|tok, span| (tok, span))
        .padded_by(comment.repeated())
        .padded()
        .repeated()
        .then_ignore(end())
}
