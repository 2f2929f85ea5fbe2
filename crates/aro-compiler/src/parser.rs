//! The ARO recursive-descent parser.
//!
//! Grammar:
//!
//! ```text
//! file        := feature-set*
//! feature-set := '(' name ':' activity ')' ['when' expr] '{' statement* '}'
//! statement   := verb [article] operand
//!                [preposition [article] operand]
//!                ['with' (mapping | expr)] '.'
//! operand     := descriptor | string | number
//! ```
//!
//! The parser never fails hard: every structural problem becomes a
//! [`Diagnostic`] and parsing resynchronizes at the next statement period or
//! block boundary, returning a best-effort AST.

use aro_core::ast::{
    BinaryOp, Descriptor, Expr, FeatureSet, Preposition, Span, Statement, UnaryOp,
};
use aro_core::diagnostics::Diagnostic;
use aro_core::value::RuntimeValue;

use crate::lexer::tokenize;
use crate::token::{Token, TokenKind};

/// The result of parsing one source file.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub feature_sets: Vec<FeatureSet>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parses ARO source text.
pub fn parse(source: &str) -> ParsedFile {
    let (tokens, mut diagnostics) = tokenize(source);
    let mut parser = Parser {
        tokens,
        pos: 0,
        diagnostics: Vec::new(),
    };
    let feature_sets = parser.parse_file();
    diagnostics.append(&mut parser.diagnostics);
    ParsedFile {
        feature_sets,
        diagnostics,
    }
}

/// Parses ARO source text, attaching `origin` to every diagnostic.
pub fn parse_named(source: &str, origin: &str) -> ParsedFile {
    let mut parsed = parse(source);
    for diagnostic in &mut parsed.diagnostics {
        if diagnostic.origin.is_none() {
            diagnostic.origin = Some(origin.to_string());
        }
    }
    parsed
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    // ─── File and feature sets ───────────────────────────────────────────────

    fn parse_file(&mut self) -> Vec<FeatureSet> {
        let mut feature_sets = Vec::new();
        while !self.at_end() {
            if self.check(&TokenKind::LParen) {
                if let Some(fs) = self.parse_feature_set() {
                    feature_sets.push(fs);
                }
            } else if let Some(token) = self.advance() {
                let (kind, span) = (token.kind.clone(), token.span);
                self.diagnostics.push(
                    Diagnostic::error(format!("expected a feature-set header, found {kind}"))
                        .at(span)
                        .hint("feature sets start with '(<name>: <business activity>)'"),
                );
                self.skip_to_header();
            }
        }
        feature_sets
    }

    fn parse_feature_set(&mut self) -> Option<FeatureSet> {
        let span = self.peek_span();
        self.advance(); // '('

        let mut name_words = Vec::new();
        while let Some(word) = self.peek_word() {
            name_words.push(word.to_string());
            self.advance();
        }
        if name_words.is_empty() {
            self.error_here("feature-set header is missing its name");
            self.skip_to_header();
            return None;
        }
        let name = name_words.join(" ");

        if !self.eat(&TokenKind::Colon) {
            self.error_here(&format!(
                "feature-set header for '{name}' is missing ':' before the business activity"
            ));
            self.skip_to_header();
            return None;
        }

        let mut activity_words = Vec::new();
        loop {
            match self.peek_kind() {
                Some(TokenKind::Word(w)) => {
                    activity_words.push(w.clone());
                    self.advance();
                }
                Some(TokenKind::Int(n)) => {
                    activity_words.push(n.to_string());
                    self.advance();
                }
                _ => break,
            }
        }
        if !self.eat(&TokenKind::RParen) {
            self.error_here(&format!("feature-set header for '{name}' is not closed with ')'"));
            self.skip_to_header();
            return None;
        }
        let business_activity = activity_words.join(" ");

        let guard = if self.eat_word("when") {
            Some(self.parse_expr())
        } else {
            None
        };

        if !self.eat(&TokenKind::LBrace) {
            self.diagnostics.push(
                Diagnostic::error(format!(
                    "feature set '{name}' is missing its '{{' block"
                ))
                .at(self.peek_span())
                .hint("wrap the statements in '{ … }'"),
            );
            self.skip_to_header();
            return None;
        }

        let mut statements = Vec::new();
        loop {
            if self.eat(&TokenKind::RBrace) {
                break;
            }
            if self.at_end() {
                self.diagnostics.push(
                    Diagnostic::error(format!("feature set '{name}' has an unterminated block"))
                        .at(span)
                        .hint("close the block with '}'"),
                );
                break;
            }
            if let Some(statement) = self.parse_statement() {
                statements.push(statement);
            }
        }

        Some(FeatureSet {
            name,
            business_activity,
            guard,
            statements,
            span,
        })
    }

    // ─── Statements ──────────────────────────────────────────────────────────

    fn parse_statement(&mut self) -> Option<Statement> {
        let span = self.peek_span();

        let verb = match self.peek_word() {
            Some(word) => {
                let verb = word.to_ascii_lowercase();
                self.advance();
                verb
            }
            None => {
                let found = self.peek_kind().cloned();
                self.error_here(&format!(
                    "expected an action verb, found {}",
                    found.map_or("end of input".to_string(), |k| k.to_string())
                ));
                self.resync_statement();
                return None;
            }
        };

        self.skip_article();
        let result = self.parse_operand("result")?;

        let mut preposition = None;
        let mut object = None;
        let mut expression = None;
        let mut with_mapping = None;

        if let Some(word) = self.peek_word() {
            let is_with_preposition = word == "with" && self.with_introduces_object();
            if word != "with" || is_with_preposition {
                if let Some(prep) = Preposition::parse(word) {
                    self.advance();
                    self.skip_article();
                    preposition = Some(prep);
                    object = self.parse_operand("object");
                    object.as_ref()?;
                }
            }
        }

        if self.eat_word("with") {
            if self.check(&TokenKind::LBrace) {
                with_mapping = Some(self.parse_mapping_entries());
            } else {
                expression = Some(self.parse_expr());
            }
        }

        if !self.eat(&TokenKind::Period) {
            self.diagnostics.push(
                Diagnostic::error("statement is missing its final period")
                    .at(span)
                    .hint("every ARO statement ends with '.'"),
            );
            self.resync_statement();
        }

        Some(Statement {
            verb,
            result,
            preposition,
            object,
            expression,
            with_mapping,
            span,
        })
    }

    /// Decides whether a `with` at the current position is the statement's
    /// preposition (`Create the <user> with the <data>.`) rather than a
    /// `with`-clause operand. It is a preposition exactly when what follows
    /// is `[article] <descriptor>` and the descriptor ends the clause.
    fn with_introduces_object(&self) -> bool {
        let mut pos = self.pos + 1; // past 'with'
        if self
            .tokens
            .get(pos)
            .is_some_and(|t| t.kind.is_article())
        {
            pos += 1;
        }
        let Some(token) = self.tokens.get(pos) else {
            return false;
        };
        if !matches!(token.kind, TokenKind::Descriptor(_)) {
            return false;
        }
        match self.tokens.get(pos + 1).map(|t| &t.kind) {
            Some(TokenKind::Period) => true,
            Some(TokenKind::Word(w)) => w == "with",
            _ => false,
        }
    }

    /// Parses a statement operand: an angle-bracket descriptor or a bare
    /// literal standing in for one.
    fn parse_operand(&mut self, role: &str) -> Option<Descriptor> {
        let span = self.peek_span();
        match self.peek_kind().cloned() {
            Some(TokenKind::Descriptor(d)) => {
                self.advance();
                Some(Descriptor {
                    base: d.base,
                    qualifier: d.qualifier,
                    specifiers: d.specifiers,
                    literal: d.literal,
                    span,
                })
            }
            Some(TokenKind::Str(s)) => {
                self.advance();
                Some(Descriptor::literal(RuntimeValue::Text(s), span))
            }
            Some(TokenKind::Int(n)) => {
                self.advance();
                Some(Descriptor::literal(RuntimeValue::Int(n), span))
            }
            Some(TokenKind::Float(f)) => {
                self.advance();
                Some(Descriptor::literal(RuntimeValue::Float(f), span))
            }
            found => {
                self.diagnostics.push(
                    Diagnostic::error(format!(
                        "expected a {role} descriptor, found {}",
                        found.map_or("end of input".to_string(), |k| k.to_string())
                    ))
                    .at(span)
                    .hint("write descriptors in angle brackets, as in <user: email>"),
                );
                self.resync_statement();
                None
            }
        }
    }

    // ─── Expressions ─────────────────────────────────────────────────────────

    fn parse_expr(&mut self) -> Expr {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Expr {
        let mut lhs = self.parse_and();
        while self.eat_word("or") {
            let rhs = self.parse_and();
            lhs = Expr::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        lhs
    }

    fn parse_and(&mut self) -> Expr {
        let mut lhs = self.parse_not();
        while self.eat_word("and") {
            let rhs = self.parse_not();
            lhs = Expr::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        lhs
    }

    fn parse_not(&mut self) -> Expr {
        if self.eat_word("not") {
            return Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(self.parse_not()),
            };
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Expr {
        let lhs = self.parse_additive();
        let op = match self.peek_kind() {
            Some(TokenKind::EqEq) => Some(BinaryOp::Eq),
            Some(TokenKind::NotEq) => Some(BinaryOp::Ne),
            Some(TokenKind::Le) => Some(BinaryOp::Le),
            Some(TokenKind::Ge) => Some(BinaryOp::Ge),
            Some(TokenKind::Lt) => Some(BinaryOp::Lt),
            Some(TokenKind::Gt) => Some(BinaryOp::Gt),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let rhs = self.parse_additive();
                Expr::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                }
            }
            None => lhs,
        }
    }

    fn parse_additive(&mut self) -> Expr {
        let mut lhs = self.parse_multiplicative();
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative();
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        lhs
    }

    fn parse_multiplicative(&mut self) -> Expr {
        let mut lhs = self.parse_primary();
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_primary();
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        lhs
    }

    fn parse_primary(&mut self) -> Expr {
        let span = self.peek_span();
        match self.peek_kind().cloned() {
            Some(TokenKind::Int(n)) => {
                self.advance();
                Expr::Literal(RuntimeValue::Int(n))
            }
            Some(TokenKind::Float(f)) => {
                self.advance();
                Expr::Literal(RuntimeValue::Float(f))
            }
            Some(TokenKind::Str(s)) => {
                self.advance();
                Expr::Literal(RuntimeValue::Text(s))
            }
            Some(TokenKind::Word(w)) if w == "true" => {
                self.advance();
                Expr::Literal(RuntimeValue::Bool(true))
            }
            Some(TokenKind::Word(w)) if w == "false" => {
                self.advance();
                Expr::Literal(RuntimeValue::Bool(false))
            }
            Some(TokenKind::Word(w)) if w == "null" => {
                self.advance();
                Expr::Literal(RuntimeValue::Null)
            }
            Some(TokenKind::Descriptor(d)) => {
                self.advance();
                Expr::Ref(Descriptor {
                    base: d.base,
                    qualifier: d.qualifier,
                    specifiers: d.specifiers,
                    literal: d.literal,
                    span,
                })
            }
            Some(TokenKind::Minus) => {
                self.advance();
                Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(self.parse_primary()),
                }
            }
            Some(TokenKind::LParen) => {
                self.advance();
                let inner = self.parse_expr();
                if !self.eat(&TokenKind::RParen) {
                    self.error_here("expected ')' to close the expression");
                }
                inner
            }
            Some(TokenKind::LBrace) => Expr::Mapping(self.parse_mapping_entries()),
            found => {
                self.diagnostics.push(
                    Diagnostic::error(format!(
                        "expected an expression, found {}",
                        found.map_or("end of input".to_string(), |k| k.to_string())
                    ))
                    .at(span),
                );
                Expr::Literal(RuntimeValue::Null)
            }
        }
    }

    /// Parses `{ key: expr, … }`. The opening brace is at the current
    /// position.
    fn parse_mapping_entries(&mut self) -> Vec<(String, Expr)> {
        self.advance(); // '{'
        let mut entries = Vec::new();
        loop {
            if self.eat(&TokenKind::RBrace) || self.at_end() {
                break;
            }
            let key = match self.peek_kind().cloned() {
                Some(TokenKind::Word(w)) => {
                    self.advance();
                    w
                }
                Some(TokenKind::Str(s)) => {
                    self.advance();
                    s
                }
                found => {
                    self.diagnostics.push(
                        Diagnostic::error(format!(
                            "expected a mapping key, found {}",
                            found.map_or("end of input".to_string(), |k| k.to_string())
                        ))
                        .at(self.peek_span()),
                    );
                    self.resync_statement();
                    break;
                }
            };
            if !self.eat(&TokenKind::Colon) {
                self.error_here(&format!("mapping key '{key}' is missing ':'"));
            }
            let value = self.parse_expr();
            entries.push((key, value));
            if !self.eat(&TokenKind::Comma) {
                if !self.eat(&TokenKind::RBrace) {
                    self.error_here("expected ',' or '}' in mapping");
                    self.resync_statement();
                }
                break;
            }
        }
        entries
    }

    // ─── Token plumbing ──────────────────────────────────────────────────────

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_word(&self) -> Option<&str> {
        self.peek_kind().and_then(TokenKind::word)
    }

    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|t| t.span)
            .or_else(|| self.tokens.last().map(|t| t.span))
            .unwrap_or_default()
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.peek_word() == Some(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_article(&mut self) {
        if self.peek_kind().is_some_and(TokenKind::is_article) {
            self.pos += 1;
        }
    }

    fn error_here(&mut self, message: &str) {
        let span = self.peek_span();
        self.diagnostics.push(Diagnostic::error(message).at(span));
    }

    /// Skips ahead to just past the next statement period, stopping early at
    /// a block boundary.
    fn resync_statement(&mut self) {
        while let Some(kind) = self.peek_kind() {
            match kind {
                TokenKind::Period => {
                    self.pos += 1;
                    return;
                }
                TokenKind::RBrace | TokenKind::LParen => return,
                _ => self.pos += 1,
            }
        }
    }

    /// Skips ahead to the next feature-set header.
    fn skip_to_header(&mut self) {
        while let Some(kind) = self.peek_kind() {
            if *kind == TokenKind::LParen {
                return;
            }
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aro_core::ast::FeatureSetKind;

    #[test]
    fn hello_world_parses() {
        let parsed = parse(
            r#"(Application-Start: Hello) {
                Log "Hello from ARO!" to the <console>.
                Return an <OK: status> for the <startup>.
            }"#,
        );
        assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
        assert_eq!(parsed.feature_sets.len(), 1);

        let fs = &parsed.feature_sets[0];
        assert_eq!(fs.kind(), FeatureSetKind::ApplicationStart);
        assert_eq!(fs.statements.len(), 2);

        let log = &fs.statements[0];
        assert_eq!(log.verb, "log");
        assert_eq!(
            log.result.literal,
            Some(RuntimeValue::Text("Hello from ARO!".into()))
        );
        assert_eq!(log.preposition, Some(Preposition::To));
        assert_eq!(log.object.as_ref().unwrap().base, "console");

        let ret = &fs.statements[1];
        assert_eq!(ret.verb, "return");
        assert_eq!(ret.result.base, "OK");
        assert_eq!(ret.result.qualifier.as_deref(), Some("status"));
    }

    #[test]
    fn guard_expression_parses() {
        let parsed = parse(
            r#"(Welcome: UserCreated Handler) when <age> >= 18 {
                Log "adult" to the <console>.
            }"#,
        );
        assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
        let fs = &parsed.feature_sets[0];
        assert_eq!(
            fs.kind(),
            FeatureSetKind::EventHandler {
                event: "UserCreated".to_string()
            }
        );
        match fs.guard.as_ref().unwrap() {
            Expr::Binary { op: BinaryOp::Ge, lhs, rhs } => {
                assert!(matches!(&**lhs, Expr::Ref(d) if d.base == "age"));
                assert!(matches!(&**rhs, Expr::Literal(RuntimeValue::Int(18))));
            }
            other => panic!("unexpected guard {other:?}"),
        }
    }

    #[test]
    fn with_mapping_parses() {
        let parsed = parse(
            r#"(createUser: User Management) {
                Create the <user> with { name: "Alice", age: 30 }.
                Store the <user> in the <user-repository>.
            }"#,
        );
        assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
        let create = &parsed.feature_sets[0].statements[0];
        assert_eq!(create.verb, "create");
        let mapping = create.with_mapping.as_ref().unwrap();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping[0].0, "name");
    }

    #[test]
    fn with_as_preposition() {
        let parsed = parse(
            r#"(merge: Data Shaping) {
                Update the <user> with the <changes>.
            }"#,
        );
        assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
        let stmt = &parsed.feature_sets[0].statements[0];
        assert_eq!(stmt.preposition, Some(Preposition::With));
        assert_eq!(stmt.object.as_ref().unwrap().base, "changes");
        assert!(stmt.expression.is_none());
    }

    #[test]
    fn with_expression_clause() {
        let parsed = parse(
            r#"(count: Arithmetic) {
                Compute the <total> from the <base> with <base> + 1.
            }"#,
        );
        assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
        let stmt = &parsed.feature_sets[0].statements[0];
        assert_eq!(stmt.preposition, Some(Preposition::From));
        assert!(matches!(
            stmt.expression,
            Some(Expr::Binary { op: BinaryOp::Add, .. })
        ));
    }

    #[test]
    fn missing_period_is_reported_and_recovers() {
        let parsed = parse(
            r#"(broken: Recovery) {
                Log "one" to the <console>
                Log "two" to the <console>.
            }"#,
        );
        assert!(
            parsed
                .diagnostics
                .iter()
                .any(|d| d.message.contains("missing its final period")),
            "{:?}",
            parsed.diagnostics
        );
        // Best effort: the block still parses.
        assert_eq!(parsed.feature_sets.len(), 1);
    }

    #[test]
    fn malformed_header_skips_to_next_feature_set() {
        let parsed = parse(
            r#"(oops no colon) { Log "x" to the <console>. }
               (fine: Works) { Log "y" to the <console>. }"#,
        );
        assert!(parsed.diagnostics.iter().any(|d| d.message.contains("missing ':'")));
        assert_eq!(parsed.feature_sets.len(), 1);
        assert_eq!(parsed.feature_sets[0].name, "fine");
    }

    #[test]
    fn empty_source_is_an_empty_program() {
        let parsed = parse("");
        assert!(parsed.feature_sets.is_empty());
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn unterminated_block_is_reported() {
        let parsed = parse(r#"(open: Block) { Log "x" to the <console>."#);
        assert!(
            parsed
                .diagnostics
                .iter()
                .any(|d| d.message.contains("unterminated block"))
        );
    }
}
