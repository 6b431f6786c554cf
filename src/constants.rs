// API Versions
pub const FACEBOOK_API_VERSION: &str = "v20.0";

// API Base URLs
pub const FACEBOOK_BASE_URL: &str = "https://graph.facebook.com";

// Graph API error codes
pub const FB_CODE_TOKEN_EXPIRED: i64 = 190;
pub const FB_CODE_TOO_MANY_CALLS: i64 = 4;
pub const FB_CODE_APP_REQUEST_LIMIT: i64 = 368;
pub const FB_RATE_LIMIT_CODES: &[i64] = &[FB_CODE_TOO_MANY_CALLS, FB_CODE_APP_REQUEST_LIMIT];

// Outbound retry settings
pub const RETRY_MAX_ATTEMPTS: u32 = 3;
pub const RETRY_BASE_DELAY_SECS: u64 = 1;

// Token exchange settings
pub const EXCHANGE_TIMEOUT_SECS: u64 = 30;

// Per-request deadline for campaign and insights calls
pub const GRAPH_TIMEOUT_SECS: u64 = 30;

// Suggested client wait after exhausting retries, by severity
pub const WAIT_MINUTES_APP_LIMIT: u64 = 30;
pub const WAIT_MINUTES_TEMP_BLOCK: u64 = 5;

// Inbound per-IP limiter: rolling window and tiered lockouts
pub const INBOUND_WINDOW_SECS: u64 = 3600;
pub const INBOUND_TIER_1_REQUESTS: u32 = 5;
pub const INBOUND_TIER_1_LOCKOUT_SECS: u64 = 5 * 60;
pub const INBOUND_TIER_2_REQUESTS: u32 = 10;
pub const INBOUND_TIER_2_LOCKOUT_SECS: u64 = 15 * 60;
pub const INBOUND_TIER_3_REQUESTS: u32 = 20;
pub const INBOUND_TIER_3_LOCKOUT_SECS: u64 = 30 * 60;

// Default sync window when the caller supplies no date range
pub const DEFAULT_SYNC_WINDOW_DAYS: i64 = 7;

// Facebook API fields
pub const FB_CAMPAIGN_FIELDS: &str =
    "id,name,status,effective_status,objective,daily_budget,lifetime_budget,start_time,stop_time";
pub const FB_INSIGHT_FIELDS: &str = "spend,impressions,clicks,ctr,cpc,cpm,reach,actions";
pub const FB_ACCOUNT_FIELDS: &str = "id,name,account_status,currency";

// Ad-account status code the platform uses for "active"
pub const FB_ACCOUNT_STATUS_ACTIVE: i64 = 1;
