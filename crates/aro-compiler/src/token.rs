//! Token vocabulary of the ARO surface grammar.

use std::fmt;

use aro_core::ast::Span;
use aro_core::value::RuntimeValue;

/// The pre-parsed content of an angle-bracket descriptor token.
///
/// The lexer resolves the `<` ambiguity (descriptor open vs. less-than) and
/// hands the parser a structured descriptor so the statement grammar stays
/// flat: first word is the base, an optional `:` introduces the qualifier,
/// any remaining words are specifiers. `<"text">` and `<42>` carry literals.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorToken {
    pub base: String,
    pub qualifier: Option<String>,
    pub specifiers: Vec<String>,
    pub literal: Option<RuntimeValue>,
}

/// One lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare word: verbs, prepositions, articles, keywords, activity words.
    /// Words may contain interior hyphens (`Application-Start`,
    /// `user-repository`), so subtraction requires surrounding spaces.
    Word(String),
    /// Double-quoted string literal with the standard escape set.
    Str(String),
    Int(i64),
    Float(f64),
    /// An angle-bracket descriptor.
    Descriptor(DescriptorToken),

    LParen,
    RParen,
    LBrace,
    RBrace,
    Colon,
    Comma,
    /// Statement terminator.
    Period,

    EqEq,
    NotEq,
    Le,
    Ge,
    Lt,
    Gt,
    Plus,
    Minus,
    Star,
    Slash,
}

impl TokenKind {
    /// Returns the word content, if this token is a word.
    pub fn word(&self) -> Option<&str> {
        match self {
            TokenKind::Word(w) => Some(w),
            _ => None,
        }
    }

    /// Whether this word token is a semantically transparent article.
    pub fn is_article(&self) -> bool {
        matches!(self.word(), Some("a" | "an" | "the"))
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Word(w) => write!(f, "'{w}'"),
            TokenKind::Str(_) => f.write_str("string literal"),
            TokenKind::Int(_) => f.write_str("integer literal"),
            TokenKind::Float(_) => f.write_str("number literal"),
            TokenKind::Descriptor(d) => write!(f, "<{}>", d.base),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
            TokenKind::LBrace => f.write_str("'{'"),
            TokenKind::RBrace => f.write_str("'}'"),
            TokenKind::Colon => f.write_str("':'"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::Period => f.write_str("'.'"),
            TokenKind::EqEq => f.write_str("'=='"),
            TokenKind::NotEq => f.write_str("'!='"),
            TokenKind::Le => f.write_str("'<='"),
            TokenKind::Ge => f.write_str("'>='"),
            TokenKind::Lt => f.write_str("'<'"),
            TokenKind::Gt => f.write_str("'>'"),
            TokenKind::Plus => f.write_str("'+'"),
            TokenKind::Minus => f.write_str("'-'"),
            TokenKind::Star => f.write_str("'*'"),
            TokenKind::Slash => f.write_str("'/'"),
        }
    }
}

/// A token with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}
