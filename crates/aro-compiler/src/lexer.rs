//! The ARO lexer.
//!
//! Produces a flat token stream from UTF-8 source text. The lexer is
//! error-tolerant: malformed input becomes a diagnostic and scanning
//! continues, so the parser always receives a usable stream.
//!
//! Two context-sensitive spots are resolved here rather than in the parser:
//!
//! - `(` opens a feature-set header unless it is immediately followed by
//!   `*`, which starts a nestable `(* … *)` block comment.
//! - `<` opens a descriptor when the next character can start descriptor
//!   content (a word character, a quote, or a digit); otherwise it is the
//!   less-than operator.

use aro_core::ast::Span;
use aro_core::diagnostics::Diagnostic;
use aro_core::value::RuntimeValue;

use crate::token::{DescriptorToken, Token, TokenKind};

/// Tokenizes `source`, returning the token stream and any lexical
/// diagnostics. The stream is best-effort and never empty-on-error.
pub fn tokenize(source: &str) -> (Vec<Token>, Vec<Diagnostic>) {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
            tokens: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn run(mut self) -> (Vec<Token>, Vec<Diagnostic>) {
        while let Some(&c) = self.chars.peek() {
            let span = self.span();
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.bump();
                }
                '(' => {
                    self.bump();
                    if self.chars.peek() == Some(&'*') {
                        self.bump();
                        self.skip_comment(span);
                    } else {
                        self.push(TokenKind::LParen, span);
                    }
                }
                ')' => self.single(TokenKind::RParen, span),
                '{' => self.single(TokenKind::LBrace, span),
                '}' => self.single(TokenKind::RBrace, span),
                ':' => self.single(TokenKind::Colon, span),
                ',' => self.single(TokenKind::Comma, span),
                '.' => self.single(TokenKind::Period, span),
                '+' => self.single(TokenKind::Plus, span),
                '-' => self.single(TokenKind::Minus, span),
                '*' => self.single(TokenKind::Star, span),
                '/' => self.single(TokenKind::Slash, span),
                '<' => {
                    self.bump();
                    match self.chars.peek() {
                        Some('=') => {
                            self.bump();
                            self.push(TokenKind::Le, span);
                        }
                        Some(&next) if is_descriptor_start(next) => self.scan_descriptor(span),
                        _ => self.push(TokenKind::Lt, span),
                    }
                }
                '>' => {
                    self.bump();
                    if self.chars.peek() == Some(&'=') {
                        self.bump();
                        self.push(TokenKind::Ge, span);
                    } else {
                        self.push(TokenKind::Gt, span);
                    }
                }
                '=' => {
                    self.bump();
                    if self.chars.peek() == Some(&'=') {
                        self.bump();
                        self.push(TokenKind::EqEq, span);
                    } else {
                        self.diagnostics.push(
                            Diagnostic::error("a single '=' is not an ARO operator")
                                .at(span)
                                .hint("use '==' to compare values"),
                        );
                    }
                }
                '!' => {
                    self.bump();
                    if self.chars.peek() == Some(&'=') {
                        self.bump();
                        self.push(TokenKind::NotEq, span);
                    } else {
                        self.diagnostics.push(
                            Diagnostic::error("a single '!' is not an ARO operator")
                                .at(span)
                                .hint("use '!=' to compare values, or the word 'not'"),
                        );
                    }
                }
                '"' => self.scan_string(span),
                c if c.is_ascii_digit() => self.scan_number(span),
                c if is_word_start(c) => self.scan_word(span),
                other => {
                    self.bump();
                    self.diagnostics.push(
                        Diagnostic::error(format!("unexpected character '{other}'")).at(span),
                    );
                }
            }
        }
        (self.tokens, self.diagnostics)
    }

    // ─── Scanners ────────────────────────────────────────────────────────────

    fn scan_word(&mut self, span: Span) {
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                self.bump();
            } else if c == '-' || c == '.' {
                // Interior hyphens join words (`Application-Start`), and
                // interior dots spell namespaced plugin verbs
                // (`collections.transform`). A trailing hyphen stays an
                // operator and a trailing dot the statement terminator.
                let mut lookahead = self.chars.clone();
                lookahead.next();
                match lookahead.peek() {
                    Some(&n) if n.is_alphanumeric() || n == '_' => {
                        word.push(c);
                        self.bump();
                    }
                    _ => break,
                }
            } else {
                break;
            }
        }
        self.push(TokenKind::Word(word), span);
    }

    fn scan_number(&mut self, span: Span) {
        let mut text = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else if c == '.' {
                // Only part of the number when a digit follows; otherwise it
                // is the statement terminator.
                let mut lookahead = self.chars.clone();
                lookahead.next();
                match lookahead.peek() {
                    Some(n) if n.is_ascii_digit() => {
                        text.push('.');
                        self.bump();
                    }
                    _ => break,
                }
            } else {
                break;
            }
        }
        if text.contains('.') {
            match text.parse::<f64>() {
                Ok(f) => self.push(TokenKind::Float(f), span),
                Err(_) => self
                    .diagnostics
                    .push(Diagnostic::error(format!("'{text}' is not a valid number")).at(span)),
            }
        } else {
            match text.parse::<i64>() {
                Ok(n) => self.push(TokenKind::Int(n), span),
                Err(_) => self.diagnostics.push(
                    Diagnostic::error(format!("'{text}' does not fit in a 64-bit integer"))
                        .at(span),
                ),
            }
        }
    }

    fn scan_string(&mut self, span: Span) {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.chars.peek().copied() {
                None | Some('\n') => {
                    self.diagnostics.push(
                        Diagnostic::error("unterminated string literal")
                            .at(span)
                            .hint("close the string with '\"' before the end of the line"),
                    );
                    break;
                }
                Some('"') => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    self.bump();
                    match self.chars.peek().copied() {
                        Some('n') => {
                            text.push('\n');
                            self.bump();
                        }
                        Some('t') => {
                            text.push('\t');
                            self.bump();
                        }
                        Some('r') => {
                            text.push('\r');
                            self.bump();
                        }
                        Some('\\') => {
                            text.push('\\');
                            self.bump();
                        }
                        Some('"') => {
                            text.push('"');
                            self.bump();
                        }
                        Some(other) => {
                            self.diagnostics.push(
                                Diagnostic::warning(format!("unknown escape '\\{other}'"))
                                    .at(self.span()),
                            );
                            text.push(other);
                            self.bump();
                        }
                        None => {}
                    }
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
        self.push(TokenKind::Str(text), span);
    }

    /// Scans descriptor content up to the closing `>`. The opening `<` has
    /// already been consumed.
    fn scan_descriptor(&mut self, span: Span) {
        let mut raw = String::new();
        loop {
            match self.chars.peek().copied() {
                None | Some('\n') => {
                    self.diagnostics.push(
                        Diagnostic::error("unterminated descriptor")
                            .at(span)
                            .hint("close the descriptor with '>'"),
                    );
                    break;
                }
                Some('>') => {
                    self.bump();
                    break;
                }
                Some(c) => {
                    raw.push(c);
                    self.bump();
                }
            }
        }
        let token = self.parse_descriptor_content(raw.trim(), span);
        self.push(TokenKind::Descriptor(token), span);
    }

    /// Interprets raw descriptor content: a quoted or numeric literal, or
    /// `base [: qualifier] [specifier …]`.
    fn parse_descriptor_content(&mut self, raw: &str, span: Span) -> DescriptorToken {
        let mut token = DescriptorToken {
            base: String::new(),
            qualifier: None,
            specifiers: Vec::new(),
            literal: None,
        };

        if let Some(stripped) = raw.strip_prefix('"') {
            let text = stripped.strip_suffix('"').unwrap_or(stripped);
            token.literal = Some(RuntimeValue::Text(text.to_string()));
            return token;
        }
        if raw.chars().next().is_some_and(|c| c.is_ascii_digit()) && !raw.contains(char::is_whitespace) && !raw.contains(':') {
            if let Ok(n) = raw.parse::<i64>() {
                token.literal = Some(RuntimeValue::Int(n));
                return token;
            }
            if let Ok(f) = raw.parse::<f64>() {
                token.literal = Some(RuntimeValue::Float(f));
                return token;
            }
        }

        let (base_part, qualifier_part) = match raw.split_once(':') {
            Some((base, rest)) => (base, Some(rest)),
            None => (raw, None),
        };

        let mut base_words = base_part.split_whitespace();
        match base_words.next() {
            Some(word) => token.base = word.to_string(),
            None => {
                self.diagnostics.push(
                    Diagnostic::error("descriptor is missing its base name")
                        .at(span)
                        .hint("write the variable name first, as in <user: email>"),
                );
            }
        }
        token.specifiers.extend(base_words.map(str::to_string));

        if let Some(rest) = qualifier_part {
            let mut words = rest.split_whitespace();
            match words.next() {
                Some(word) => token.qualifier = Some(word.to_string()),
                None => {
                    self.diagnostics.push(
                        Diagnostic::error("descriptor has ':' but no qualifier").at(span),
                    );
                }
            }
            token.specifiers.extend(words.map(str::to_string));
        }

        token
    }

    /// Skips a `(* … *)` comment. Comments nest.
    fn skip_comment(&mut self, span: Span) {
        let mut depth = 1usize;
        loop {
            match self.chars.peek().copied() {
                None => {
                    self.diagnostics.push(
                        Diagnostic::error("unterminated comment")
                            .at(span)
                            .hint("close the comment with '*)'"),
                    );
                    return;
                }
                Some('(') => {
                    self.bump();
                    if self.chars.peek() == Some(&'*') {
                        self.bump();
                        depth += 1;
                    }
                }
                Some('*') => {
                    self.bump();
                    if self.chars.peek() == Some(&')') {
                        self.bump();
                        depth -= 1;
                        if depth == 0 {
                            return;
                        }
                    }
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    // ─── Plumbing ────────────────────────────────────────────────────────────

    fn span(&self) -> Span {
        Span::new(self.line, self.column)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn single(&mut self, kind: TokenKind, span: Span) {
        self.bump();
        self.push(kind, span);
    }

    fn push(&mut self, kind: TokenKind, span: Span) {
        self.tokens.push(Token::new(kind, span));
    }
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_descriptor_start(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '"'
}
