/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// A JSON object, used for params, settings and state maps.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;
