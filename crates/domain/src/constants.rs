//! Application constants
//!
//! Backend endpoint paths (relative to the configured API base URL) and the
//! defaults used when no configuration overrides them.

// Auth endpoints
pub const AUTH_LOGIN: &str = "/auth/login";
pub const AUTH_LOGOUT: &str = "/auth/logout";
pub const AUTH_REFRESH: &str = "/auth/refresh";

// Entity endpoints
pub const PATIENTS: &str = "/patients";
pub const INVENTORY: &str = "/inventory";
pub const REPORTS: &str = "/reports";
pub const USERS: &str = "/users";
pub const USERS_PROFILE: &str = "/users/profile";
pub const DASHBOARD_STATS: &str = "/dashboard/stats";
pub const DASHBOARD_RECENT_ACTIVITY: &str = "/dashboard/recent-activity";

// Session storage
pub const DEFAULT_KEYCHAIN_SERVICE: &str = "cuidar-plus";

// Transport defaults
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api/v1";
pub const DEFAULT_API_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_REFRESH_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_USER_AGENT: &str = concat!("cuidar-client/", env!("CARGO_PKG_VERSION"));

// Query cache defaults
pub const DEFAULT_STALE_TIME_MS: u64 = 5 * 60 * 1000;
pub const DEFAULT_GC_TIME_MS: u64 = 10 * 60 * 1000;
pub const DEFAULT_MAX_READ_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;
pub const DEFAULT_MUTATION_RETRIES: u32 = 1;

