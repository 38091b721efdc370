/// Primary key type for generation and profile rows (UUID, assigned upstream).
pub type RecordId = uuid::Uuid;

/// Standard timestamp type used across the platform.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
