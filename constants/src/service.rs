/// Upload endpoint the selected image is POSTed to as multipart form data
pub const DEFAULT_UPLOAD_ENDPOINT: &str = "/upload";

/// Status endpoint polled by prediction id
pub const DEFAULT_STATUS_ENDPOINT: &str = "/status";

/// Seconds between status polls
pub const DEFAULT_POLL_INTERVAL_SECS: f32 = 5.0;

/// Multipart field name the upload endpoint expects the file under
pub const UPLOAD_FIELD_NAME: &str = "image";
