// src/error.rs
//
// =============================================================================
// LABLOG: ERROR TAXONOMY (v 0.1 )
// =============================================================================
//
// Three failure families, three propagation rules:
// 1. ValidationError: detected before any store call, shown to the user verbatim.
// 2. StoreError:      primary store failed, shown with the underlying message.
// 3. MirrorError:     reporting sink failed, logged at the MirrorSync boundary
//                     and never returned to a caller.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please fill in all fields")]
    MissingFields,

    #[error("Please select at least one equipment with quantity > 0")]
    NoQuantity,

    #[error("Equipment list cannot be empty")]
    EmptyCatalog,

    #[error("Equipment name cannot be blank")]
    BlankName,

    #[error("Duplicate equipment name: {0}")]
    DuplicateName(String),

    #[error("Please enter both username and password")]
    MissingCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("Malformed document {collection}/{id}: {reason}")]
    Corrupt {
        collection: String,
        id: String,
        reason: String,
    },

    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        // `{:#}` keeps the context chain on one line
        StoreError::Backend(format!("{:#}", err))
    }
}

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Mirror request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Mirror rejected record: HTTP {status}")]
    Rejected { status: u16 },

    #[error("Mirror sink unavailable: {0}")]
    Unavailable(String),
}

/// What a Reconciler operation can surface to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ReconcileError::Validation(_))
    }
}
