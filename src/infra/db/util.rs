use crate::application::repos::RepoError;

/// Map low-level sqlx failures onto the repository error taxonomy.
pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        other => RepoError::from_persistence(other),
    }
}

/// Postgres counts come back signed; a negative count is a driver bug.
pub fn convert_count(count: i64) -> Result<u64, RepoError> {
    u64::try_from(count)
        .map_err(|_| RepoError::from_persistence(format!("negative count from database: {count}")))
}
