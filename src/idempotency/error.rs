use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    /// Command id reused with a materially different payload (409-class)
    #[error("command id '{command_id}' already used with a different payload")]
    Conflict { command_id: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored record exists but could not be read back after a lost
    /// insert race. Should not happen; indicates store corruption.
    #[error("idempotency record for '{command_id}' vanished after duplicate-key insert")]
    RecordVanished { command_id: String },

    /// Failure from the wrapped command itself. Failed executions are not
    /// recorded, so the client may retry with the same command id.
    #[error("command execution failed: {0}")]
    Execution(String),
}
