//! Term-expression parser
//!
//! Parses signature strings into a structured [`Expr`] AST.

use std::fmt;

/// A parsed expression containing one or more terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub terms: Vec<Term>,
}

impl Expr {
    /// Walk the terms in order, handing each one to `action`.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first error produced by `action`.
    pub fn visit<E>(
        &self,
        mut action: impl FnMut(ElemKind<'_>, Operator, Identifier<'_>) -> Result<(), E>,
    ) -> Result<(), E> {
        for term in &self.terms {
            action(term.source.as_elem(), term.operator, term.kind.as_identifier())?;
        }
        Ok(())
    }

    /// Names of every component referenced with the `And` operator on the
    /// iterated entity itself.
    pub fn required_components(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().filter_map(|t| {
            if t.operator == Operator::And && t.source == Source::This {
                t.name()
            } else {
                None
            }
        })
    }

    /// Names of every component excluded with `!`.
    pub fn excluded_components(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().filter_map(|t| {
            if t.operator == Operator::Not {
                t.name()
            } else {
                None
            }
        })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for term in &self.terms {
            if !first {
                if term.operator == Operator::Or {
                    write!(f, " | ")?;
                } else {
                    write!(f, ", ")?;
                }
            }
            first = false;

            match term.operator {
                Operator::Not => write!(f, "!")?,
                Operator::Optional => write!(f, "?")?,
                Operator::And | Operator::Or => {}
            }

            match &term.source {
                Source::This => {}
                Source::Parent => write!(f, "PARENT:")?,
                Source::Cascade => write!(f, "CASCADE:")?,
                Source::System => write!(f, "SYSTEM:")?,
                Source::Entity(name) => write!(f, "{name}:")?,
            }

            match &term.kind {
                TermKind::Component(name) => write!(f, "{name}")?,
                TermKind::Pair(pair) => write!(f, "({}, {})", pair.relation, pair.target)?,
            }
        }
        Ok(())
    }
}

/// A single term in an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub operator: Operator,
    pub source: Source,
    pub kind: TermKind,
}

impl Term {
    /// Get the component name if this is a Component term.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            TermKind::Component(name) => Some(name),
            TermKind::Pair(_) => None,
        }
    }
}

/// What the term's id is: a single named component or a relationship pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermKind {
    /// A component or tag name like "Position" or "Game.Tag"
    Component(String),
    /// A pair like "(ChildOf, Player)"; `*` is accepted as the target
    Pair(Pair),
}

impl TermKind {
    fn as_identifier(&self) -> Identifier<'_> {
        match self {
            TermKind::Component(name) => Identifier::Name(name),
            TermKind::Pair(pair) => Identifier::Pair {
                relation: &pair.relation,
                target: &pair.target,
            },
        }
    }
}

/// A relationship pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub relation: String,
    pub target: String,
}

/// Where a term's data is read from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Source {
    /// The iterated entity (no prefix)
    #[default]
    This,
    /// The immediate `ChildOf` parent (`PARENT:`)
    Parent,
    /// The nearest ancestor owning the id (`CASCADE:`)
    Cascade,
    /// The entity of the system running the query (`SYSTEM:`)
    System,
    /// A fixed, named entity (`Name:`)
    Entity(String),
}

impl Source {
    fn from_prefix(prefix: String) -> Self {
        match prefix.as_str() {
            "PARENT" => Source::Parent,
            "CASCADE" => Source::Cascade,
            "SYSTEM" => Source::System,
            _ => Source::Entity(prefix),
        }
    }

    fn as_elem(&self) -> ElemKind<'_> {
        match self {
            Source::This => ElemKind::This,
            Source::Parent => ElemKind::Parent,
            Source::Cascade => ElemKind::Cascade,
            Source::System => ElemKind::System,
            Source::Entity(name) => ElemKind::Entity(name),
        }
    }
}

/// Borrowed form of [`Source`] handed to visitor callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemKind<'a> {
    This,
    Parent,
    Cascade,
    System,
    Entity(&'a str),
}

/// Borrowed form of [`TermKind`] handed to visitor callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identifier<'a> {
    Name(&'a str),
    Pair { relation: &'a str, target: &'a str },
}

/// Term operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operator {
    /// Entity must have the id (default)
    #[default]
    And,
    /// Entity must NOT have the id
    Not,
    /// Id is optional (resolved if present)
    Optional,
    /// This term joins the previous one into a family; one of them must match
    Or,
}

/// Parse error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parse error at position {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for ParseError {}

/// Parse an expression string into an [`Expr`] AST.
///
/// # Syntax
///
/// - `Component` - match entities with Component
/// - `!Component` - match entities WITHOUT Component
/// - `?Component` - optionally match Component
/// - `A | B` (or `A || B`) - match entities with A OR B
/// - `(Relation, Target)` - match pair relationship, `*` as a wildcard target
/// - `PARENT:C`, `CASCADE:C`, `SYSTEM:C`, `Entity:C` - read C from another entity
///
/// # Errors
///
/// Returns `ParseError` if the expression is malformed.
pub fn parse_expr(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse()
}

/// Parse `input` and invoke `action` once per term with
/// `(element kind, operator, identifier)`.
///
/// # Errors
///
/// Returns the parse error converted into `E`, or the first error `action`
/// produced.
pub fn visit_expr<E: From<ParseError>>(
    input: &str,
    action: impl FnMut(ElemKind<'_>, Operator, Identifier<'_>) -> Result<(), E>,
) -> Result<(), E> {
    parse_expr(input)?.visit(action)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse(&mut self) -> Result<Expr, ParseError> {
        let mut terms = Vec::new();
        let mut next_is_or = false;

        self.skip_whitespace();

        while !self.is_eof() {
            let mut term = self.parse_term()?;
            if next_is_or {
                if term.operator != Operator::And {
                    return Err(self.error("operators cannot be combined with '|'"));
                }
                term.operator = Operator::Or;
            }
            terms.push(term);

            self.skip_whitespace();

            if self.is_eof() {
                break;
            }

            if self.peek() == Some(',') {
                self.advance();
                next_is_or = false;
            } else if self.peek() == Some('|') {
                self.advance();
                if self.peek() == Some('|') {
                    self.advance();
                }
                next_is_or = true;
            } else {
                return Err(self.error("expected ',' or '|' between terms"));
            }

            self.skip_whitespace();
            if self.is_eof() {
                return Err(self.error("expected term after separator"));
            }
        }

        if terms.is_empty() {
            return Err(ParseError {
                message: "empty expression".to_string(),
                position: 0,
            });
        }

        Ok(Expr { terms })
    }

    fn parse_term(&mut self) -> Result<Term, ParseError> {
        self.skip_whitespace();

        let operator = if self.peek() == Some('!') {
            self.advance();
            Operator::Not
        } else if self.peek() == Some('?') {
            self.advance();
            Operator::Optional
        } else {
            Operator::And
        };

        self.skip_whitespace();

        if self.peek() == Some('(') {
            let pair = self.parse_pair()?;
            return Ok(Term {
                operator,
                source: Source::This,
                kind: TermKind::Pair(pair),
            });
        }

        let first = self.parse_identifier()?;

        // `Source:Id`
        if self.peek() == Some(':') {
            self.advance();
            let source = Source::from_prefix(first);
            let kind = if self.peek() == Some('(') {
                TermKind::Pair(self.parse_pair()?)
            } else {
                TermKind::Component(self.parse_identifier()?)
            };
            return Ok(Term {
                operator,
                source,
                kind,
            });
        }

        Ok(Term {
            operator,
            source: Source::This,
            kind: TermKind::Component(first),
        })
    }

    fn parse_pair(&mut self) -> Result<Pair, ParseError> {
        if self.peek() != Some('(') {
            return Err(self.error("expected '('"));
        }
        self.advance();
        self.skip_whitespace();

        let relation = self.parse_identifier()?;

        self.skip_whitespace();

        if self.peek() != Some(',') {
            return Err(self.error("expected ',' in pair"));
        }
        self.advance();
        self.skip_whitespace();

        let target = if self.peek() == Some('*') {
            self.advance();
            "*".to_string()
        } else {
            self.parse_identifier()?
        };

        self.skip_whitespace();

        if self.peek() != Some(')') {
            return Err(self.error("expected ')' in pair"));
        }
        self.advance();

        Ok(Pair { relation, target })
    }

    /// Identifiers may contain `.` so that dotted paths reach nested names.
    fn parse_identifier(&mut self) -> Result<String, ParseError> {
        let mut ident = String::new();

        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }

        if ident.is_empty() {
            return Err(self.error("expected identifier"));
        }

        Ok(ident)
    }

    fn error(&self, message: &str) -> ParseError {
        ParseError {
            message: message.to_string(),
            position: self.pos,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn remaining(&self) -> &str {
        self.input.get(self.pos..).unwrap_or("")
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }
}
