use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExecError>;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}: {stderr}")]
    Process {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("job service: {0}")]
    JobService(String),

    #[error("encode template: {0}")]
    Template(String),

    #[error("hashing error: {0}")]
    Hash(String),

    #[error(transparent)]
    Storage(#[from] autoabr_io::Error),

    #[error(transparent)]
    Ladder(#[from] autoabr_ladder::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
