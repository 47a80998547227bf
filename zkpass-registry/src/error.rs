//! Error types for the registry and admission flow.
//!
//! Every rejection has its own variant so callers can tell exactly why a
//! registration or admission failed.

use serde::Serialize;
use thiserror::Error;
use zkpass_common::EventId;
use zkpass_prover::ProverError;
use zkpass_verifier::VerifierError;

/// Coarse classification of a [`RegistryError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Crypto,
    State,
    External,
    Storage,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    /// A record with this secret hash is already registered.
    #[error("secret hash {0} is already registered")]
    DuplicateSecretHash(String),

    /// The tree holds `2^TREE_DEPTH` leaves already.
    #[error("registry is full ({0} leaves)")]
    CapacityExceeded(u64),

    #[error("leaf index {index} out of range (size {size})")]
    IndexOutOfRange { index: u64, size: u64 },

    /// Unknown op code or a field index past the attribute vector.
    #[error("malformed criteria: {0}")]
    MalformedCriteria(String),

    #[error("expected {expected} encrypted fields, got {actual}")]
    FieldCountMismatch { expected: usize, actual: usize },

    #[error("event {0} not found")]
    EventNotFound(EventId),

    /// No record is registered under this secret hash.
    #[error("no user registered under secret hash {0}")]
    UserNotFound(String),

    /// The proof was generated for a different event.
    #[error("proof is bound to a different event than {0}")]
    WrongEvent(EventId),

    /// The proof's (fieldIndex, op, value) differ from the stored criteria.
    #[error("proof criteria do not match event {0}")]
    CriteriaMismatch(EventId),

    /// The proof's root is neither current nor in the accepted history.
    /// Regenerating the proof against the current root resolves it.
    #[error("merkle root {0} is not a known registry root")]
    RootMismatch(String),

    #[error("proof failed verification")]
    InvalidProof,

    /// Wrong public input count or an undecodable proof.
    #[error("malformed proof: {0}")]
    MalformedProof(String),

    #[error("nullifier already used for event {0}")]
    NullifierReused(EventId),

    #[error("store error: {0}")]
    Store(String),

    /// Failure reported by the circuit client.
    #[error("circuit client error: {0}")]
    External(#[from] ProverError),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::DuplicateSecretHash(_)
            | RegistryError::IndexOutOfRange { .. }
            | RegistryError::MalformedCriteria(_)
            | RegistryError::FieldCountMismatch { .. }
            | RegistryError::EventNotFound(_)
            | RegistryError::UserNotFound(_)
            | RegistryError::WrongEvent(_)
            | RegistryError::CriteriaMismatch(_) => ErrorKind::Validation,
            RegistryError::InvalidProof | RegistryError::MalformedProof(_) => ErrorKind::Crypto,
            RegistryError::RootMismatch(_)
            | RegistryError::NullifierReused(_)
            | RegistryError::CapacityExceeded(_) => ErrorKind::State,
            RegistryError::External(_) => ErrorKind::External,
            RegistryError::Store(_) => ErrorKind::Storage,
        }
    }

    /// Get a machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            RegistryError::DuplicateSecretHash(_) => "DUPLICATE_SECRET_HASH",
            RegistryError::CapacityExceeded(_) => "CAPACITY_EXCEEDED",
            RegistryError::IndexOutOfRange { .. } => "INDEX_OUT_OF_RANGE",
            RegistryError::MalformedCriteria(_) => "MALFORMED_CRITERIA",
            RegistryError::FieldCountMismatch { .. } => "FIELD_COUNT_MISMATCH",
            RegistryError::EventNotFound(_) => "EVENT_NOT_FOUND",
            RegistryError::UserNotFound(_) => "USER_NOT_FOUND",
            RegistryError::WrongEvent(_) => "WRONG_EVENT",
            RegistryError::CriteriaMismatch(_) => "CRITERIA_MISMATCH",
            RegistryError::RootMismatch(_) => "ROOT_MISMATCH",
            RegistryError::InvalidProof => "INVALID_PROOF",
            RegistryError::MalformedProof(_) => "MALFORMED_PROOF",
            RegistryError::NullifierReused(_) => "NULLIFIER_REUSED",
            RegistryError::Store(_) => "STORE_ERROR",
            RegistryError::External(err) => err.error_code(),
        }
    }

    /// Only a stale root can succeed on a later attempt, after the proof is
    /// regenerated against the current tree.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::RootMismatch(_))
    }
}

impl From<sled::Error> for RegistryError {
    fn from(err: sled::Error) -> Self {
        RegistryError::Store(format!("sled: {err}"))
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Store(format!("corrupt record: {err}"))
    }
}

impl From<VerifierError> for RegistryError {
    fn from(err: VerifierError) -> Self {
        match err {
            VerifierError::InputCount { .. } => RegistryError::MalformedProof(err.to_string()),
            other => RegistryError::Store(format!("verifier: {other}")),
        }
    }
}

/// Error payload for machine consumers such as the CLI's JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorContext {
    pub code: String,
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl From<&RegistryError> for ErrorContext {
    fn from(err: &RegistryError) -> Self {
        ErrorContext {
            code: err.error_code().to_string(),
            kind: err.kind(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}
