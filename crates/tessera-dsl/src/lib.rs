//! Term-expression parser
//!
//! A small language for describing query and system signatures.
//!
//! # Syntax
//!
//! ```text
//! Position, Velocity           // Match entities with both components
//! Position, !Velocity          // Match entities with Position but NOT Velocity
//! Position, ?Velocity          // Match entities with Position, optionally Velocity
//! Position | Velocity          // Match entities with Position OR Velocity
//! (ChildOf, Parent)            // Match pair relationships
//! (ChildOf, *)                 // Match any target of a relation
//! PARENT:Position              // Read Position from the immediate parent
//! CASCADE:Position             // Read Position from the nearest ancestor owning it
//! SYSTEM:Timer                 // Read Timer from the running system's entity
//! Game:Config                  // Read Config from the entity named Game
//! ```
//!
//! # Examples
//!
//! ```
//! use tessera_dsl::{parse_expr, Operator, Source};
//!
//! let expr = parse_expr("Position, !Velocity, ?Health, PARENT:Position").unwrap();
//! assert_eq!(expr.terms.len(), 4);
//! assert_eq!(expr.terms[0].operator, Operator::And);
//! assert_eq!(expr.terms[1].operator, Operator::Not);
//! assert_eq!(expr.terms[2].operator, Operator::Optional);
//! assert_eq!(expr.terms[3].source, Source::Parent);
//! ```

mod parser;

pub use parser::{
    ElemKind, Expr, Identifier, Operator, Pair, ParseError, Source, Term, TermKind, parse_expr,
    visit_expr,
};
