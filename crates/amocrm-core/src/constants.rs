/// Integration configuration constants

/// Provider-side maximum rows per search request; larger limits are clamped
pub const SEARCH_LIMIT_MAX: u32 = 250;

/// Refresh the access token once its remaining lifetime drops below this
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 7 * 60 * 60;

/// How long cached account metadata stays fresh
pub const DEFAULT_ACCOUNT_TTL_SECS: i64 = 24 * 60 * 60;

/// Connect/read timeout for every HTTP call
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

/// User agent sent on every request
pub const USER_AGENT: &str = "AmoCRM-API-client/1.0";
