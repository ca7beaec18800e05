//! Error taxonomy for the DSL engine
//!
//! Every component owns a `thiserror` enum; `DSLError` wraps them all so callers
//! that drive the full pipeline can use a single `?` chain.

use std::fmt;

use thiserror::Error;

/// Main error type for the DSL system
#[derive(Error, Debug)]
pub enum DSLError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Grammar error: {0}")]
    Grammar(#[from] GrammarError),

    #[error("Vocabulary error: {0}")]
    Vocabulary(#[from] VocabularyError),

    #[error("Transition error: {0}")]
    Transition(#[from] TransitionError),

    #[error("Placeholder error: {0}")]
    Placeholder(#[from] PlaceholderError),

    #[error("Planning error: {0}")]
    Planning(#[from] PlanningError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Malformed DSL text. Always carries the position where the parser noticed
/// the inconsistency.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("syntax error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }

    pub fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column, 0)
    }
}

/// Grammar-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("Rule '{rule}' not found")]
    RuleNotFound { rule: String },

    #[error("Circular rule dependency detected: {chain}")]
    CircularRule { chain: String },

    #[error("Invalid rule definition: {reason}")]
    InvalidRule { reason: String },

    #[error("Undefined rule '{name}' referenced in rule '{rule}'")]
    UndefinedReference { name: String, rule: String },

    #[error("Rule '{rule}' failed at line {line}, column {column}: expected {expected}, found {found}")]
    Mismatch {
        rule: String,
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },

    #[error("Unexpected trailing input at line {line}, column {column}: {found}")]
    TrailingInput {
        found: String,
        line: usize,
        column: usize,
    },

    #[error("Invalid token at line {line}, column {column}: {message}")]
    Lexical {
        message: String,
        line: usize,
        column: usize,
    },
}

/// Vocabulary and domain-definition errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VocabularyError {
    #[error("unknown verb: {verb} (domain '{domain}')")]
    UnknownVerb { verb: String, domain: String },

    #[error("Invalid verb format for '{verb}': expected {expected}")]
    InvalidVerbFormat { verb: String, expected: String },

    #[error("Verb '{verb}' registered twice in domain '{domain}'")]
    DuplicateVerb { verb: String, domain: String },

    #[error("Verb '{verb}' is missing required argument '{argument}'")]
    MissingArgument { verb: String, argument: String },

    #[error("Invalid argument '{argument}' for verb '{verb}': {reason}")]
    InvalidArgument {
        verb: String,
        argument: String,
        reason: String,
    },

    #[error("Invalid pattern for argument '{argument}' of verb '{verb}': {reason}")]
    InvalidPattern {
        verb: String,
        argument: String,
        reason: String,
    },

    #[error("State '{state}' is not declared in domain '{domain}'")]
    InvalidState { state: String, domain: String },

    #[error("Domain '{domain}' not registered")]
    DomainNotFound { domain: String },

    #[error("Domain '{domain}' registered twice")]
    DuplicateDomain { domain: String },
}

/// Illegal state changes. The session the verb was applied to is left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("illegal transition in domain '{domain}': {from} -> {to}")]
    IllegalTransition {
        domain: String,
        from: String,
        to: String,
    },

    #[error("unknown state '{state}' in domain '{domain}'")]
    UnknownState { domain: String, state: String },

    #[error("verb '{verb}' cannot be applied in state {current} (allowed from: {allowed})")]
    VerbNotAllowed {
        verb: String,
        current: String,
        allowed: String,
    },
}

/// Template tokens that could not be resolved from the context
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaceholderError {
    #[error("unresolved placeholders: {}", .tokens.join(", "))]
    Unresolved { tokens: Vec<String> },

    #[error("missing context values: {}", .tokens.join(", "))]
    MissingContext { tokens: Vec<String> },
}

impl PlaceholderError {
    pub fn tokens(&self) -> &[String] {
        match self {
            PlaceholderError::Unresolved { tokens } | PlaceholderError::MissingContext { tokens } => {
                tokens
            }
        }
    }
}

/// Execution planning errors, raised before any domain runs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanningError {
    #[error("circular dependency among domains: {}", .remaining.join(", "))]
    CircularDependency { remaining: Vec<String> },

    #[error("domain '{domain}' depends on '{dependency}', which is not part of the plan")]
    UnknownDependency { domain: String, dependency: String },
}

/// Durable-store failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("store failure: {message}")]
    Store { message: String },

    #[error("no record for '{entity_id}'")]
    NotFound { entity_id: String },

    #[error("snapshot encoding failed: {message}")]
    Encoding { message: String },
}

/// Session table errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session not found: {session_id}")]
    NotFound { session_id: String },

    #[error("session limit reached ({limit} concurrent sessions)")]
    CapacityExceeded { limit: usize },

    #[error("domain '{domain}' is not active in session {session_id}")]
    DomainNotActive { session_id: String, domain: String },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Vocabulary(#[from] VocabularyError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Orchestrator errors: everything a multi-domain run can surface
#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Planning(#[from] PlanningError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Vocabulary(#[from] VocabularyError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Placeholder(#[from] PlaceholderError),

    #[error("fragment generation failed for domain '{domain}': {message}")]
    Generation { domain: String, message: String },

    #[error("product '{product}' is not compatible with entity type '{entity_type}'")]
    IncompatibleProduct { product: String, entity_type: String },

    #[error("product '{product}' is not in the catalog")]
    UnknownProduct { product: String },
}

/// Result type aliases for convenience
pub type DSLResult<T> = Result<T, DSLError>;
pub type ParseResult<T> = Result<T, ParseError>;
pub type GrammarResult<T> = Result<T, GrammarError>;
pub type VocabularyResult<T> = Result<T, VocabularyError>;
pub type TransitionResult<T> = Result<T, TransitionError>;
pub type PlaceholderResult<T> = Result<T, PlaceholderError>;
pub type PlanningResult<T> = Result<T, PlanningError>;
pub type PersistenceResult<T> = Result<T, PersistenceError>;
pub type SessionResult<T> = Result<T, SessionError>;
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

/// Source location information for nodes and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }

    pub fn unknown() -> Self {
        Self {
            line: 0,
            column: 0,
            offset: 0,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
