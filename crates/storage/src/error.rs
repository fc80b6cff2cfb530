/// All errors that can be returned by an EstimateStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No graph is stored under the given identifier.
    #[error("graph not found: {graph_id}")]
    GraphNotFound { graph_id: String },

    /// No pricing run has been recorded under the given identifier.
    #[error("pricing run not found: {run_id}")]
    RunNotFound { run_id: String },

    /// A record handed to the backend is inconsistent with its run.
    #[error("invalid record for run {run_id}: {message}")]
    InvalidRecord { run_id: String, message: String },

    /// A backend-specific storage error (DB connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
