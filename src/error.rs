use thiserror::Error;

/// Closed error taxonomy shared by every layer of the crate.
///
/// Validation-style variants are raised by the domain layer before any
/// storage call is made; storage-level variants (`DuplicateKey`,
/// `ForeignKey`, `InvalidData`) originate in a `Storage` implementation and
/// are translated to a domain-specific variant by the caller when the
/// mapping is known (e.g. a `ForeignKey` hit on series delete becomes
/// `LinkedChildrenExist`).
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("series is locked: {0}")]
    LockedSeries(String),

    #[error("series has completions and cannot be deleted: {0}")]
    CompletionsExist(String),

    #[error("series has linked children and cannot be deleted: {0}")]
    LinkedChildrenExist(String),

    #[error("instance does not exist: {0}")]
    NonExistentInstance(String),

    #[error("instance is already cancelled: {0}")]
    AlreadyCancelled(String),

    #[error("instance is cancelled: {0}")]
    CancelledInstance(String),

    #[error("cycle detected: {0}")]
    CycleDetected(String),

    #[error("chain depth exceeded (max 32): {0}")]
    ChainDepthExceeded(String),

    #[error("duplicate completion for series {series_id} on {instance_date}")]
    DuplicateCompletion {
        series_id: String,
        instance_date: String,
    },

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("foreign key violation: {0}")]
    ForeignKey(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("gap-leap is disabled for this cycling configuration")]
    GapLeapDisabled,

    #[error("budget exhausted before a solution was found")]
    BudgetExhausted,

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
