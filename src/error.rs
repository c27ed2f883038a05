use serde::Serialize;

/// App-wide error type. Every fallible function returns `Result<T, AppError>`.
/// Serializes cleanly so schedulers and the UI get structured error messages.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Write attempted against a locked scenario.
    #[error("Scenario locked: {0}")]
    Locked(String),

    /// Derived or bookkeeping state is inconsistent. Never retried locally.
    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database",
            AppError::Pool(_) => "pool",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation",
            AppError::Locked(_) => "locked",
            AppError::Integrity(_) => "integrity",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Serde(_) => "serde",
        }
    }
}

/// Serialized as `{ error: "...", kind: "..." }` for schedulers and the UI.
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("error", &self.to_string())?;
        s.serialize_field("kind", self.kind())?;
        s.end()
    }
}

/// Map `QueryReturnedNoRows` to a `NotFound` naming the missing entity.
pub(crate) fn not_found_or(entity: impl FnOnce() -> String) -> impl FnOnce(rusqlite::Error) -> AppError {
    move |e| match e {
        rusqlite::Error::QueryReturnedNoRows => AppError::NotFound(entity()),
        other => AppError::Database(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_kind_and_message() {
        let err = AppError::Locked("Scenario s-1".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "locked");
        assert_eq!(json["error"], "Scenario locked: Scenario s-1");
    }

    #[test]
    fn test_no_rows_maps_to_not_found() {
        let err = not_found_or(|| "AlertEvent e-9".into())(rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(err, AppError::NotFound(ref m) if m == "AlertEvent e-9"));

        let err = not_found_or(|| "x".into())(rusqlite::Error::InvalidQuery);
        assert_eq!(err.kind(), "database");
    }
}
