//! ECS error types.
//!
//! Hot-path operations report absence through sentinels (`bool`, `Option`,
//! [`Entity::NULL`](crate::Entity::NULL)). These errors cover setup calls and
//! the messages of fatal assertions.

use thiserror::Error;

use crate::{Entity, Id};

/// ECS error type.
#[derive(Debug, Error)]
pub enum EcsError {
    /// The zero handle was passed where a real entity is required.
    #[error("entity handle is null")]
    NullEntity,

    /// A handle whose slot was freed or reissued.
    #[error("entity {0:?} is not alive")]
    StaleEntity(Entity),

    /// A pair names a target slot that holds no live or pending entity.
    #[error("pair {0:?} targets no live entity")]
    InvalidTarget(Id),

    /// A query term names something that is not registered.
    #[error("unknown identifier `{0}`")]
    UnknownIdentifier(String),

    /// A query was built without any terms.
    #[error("query has no terms")]
    EmptyQuery,

    /// A typed accessor was used against an id holding another type.
    #[error("id {0:?} does not hold the requested component type")]
    TypeMismatch(Id),

    /// `defer_end` was called without a matching `defer_begin`.
    #[error("defer_end called without a matching defer_begin")]
    UnbalancedDefer,

    /// No more entity slots can be issued.
    #[error("identifier space exhausted")]
    Exhausted,

    /// An immediate structural mutation ran while workers were iterating.
    #[error("structural mutation while {0} workers are running")]
    ConcurrencyMisuse(usize),

    /// Expression parsing failed.
    #[error(transparent)]
    Parse(#[from] tessera_dsl::ParseError),
}

/// Result type for ECS setup operations.
pub type EcsResult<T> = Result<T, EcsError>;
