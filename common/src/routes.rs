pub const PATH_TELEMETRY: &str = "/api/data";
pub const PATH_DECISION: &str = "/api/decision";

pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE_JSON: &str = "application/json";
