use deadpool::managed::PoolError;

/// Pool error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to establish a connection with RabbitMq.")]
    Connect(#[source] anyhow::Error),
    #[error("Timed out waiting for a connection from the pool.")]
    Timeout,
    #[error("The connection pool has been closed.")]
    Closed,
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Connect(err)
    }
}

impl From<lapin::Error> for Error {
    fn from(err: lapin::Error) -> Self {
        Self::Connect(err.into())
    }
}

impl From<PoolError<Error>> for Error {
    fn from(err: PoolError<Error>) -> Self {
        match err {
            PoolError::Backend(e) => e,
            PoolError::Timeout(_) => Self::Timeout,
            PoolError::Closed => Self::Closed,
            err => Self::Connect(anyhow::anyhow!(err.to_string())),
        }
    }
}
