use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One linked ad-platform account.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Integration {
    pub id: i32,
    pub workspace_id: String,
    pub platform: Platform,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub account_id: String,
    pub account_name: String,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub settings: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    Meta,
    Google,
    Tiktok,
    GoogleAnalytics,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Meta => "meta",
            Platform::Google => "google",
            Platform::Tiktok => "tiktok",
            Platform::GoogleAnalytics => "google-analytics",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "meta" => Some(Platform::Meta),
            "google" => Some(Platform::Google),
            "tiktok" => Some(Platform::Tiktok),
            "google-analytics" => Some(Platform::GoogleAnalytics),
            _ => None,
        }
    }
}

/// Mirror of a platform-side campaign, as fetched from the Graph API.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CampaignRecord {
    pub external_id: String,
    pub name: String,
    pub status: CampaignStatus,
    pub objective: String,
    pub budget_amount: f64,
    pub budget_type: BudgetType,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Active,
    Paused,
    Archived,
    Draft,
}

impl CampaignStatus {
    /// Maps the platform status vocabulary to the internal one. Unrecognized
    /// strings map to `Draft` so new platform statuses never break a sync.
    pub fn from_platform(status: &str) -> Self {
        match status {
            "ACTIVE" => CampaignStatus::Active,
            "PAUSED" | "CAMPAIGN_PAUSED" => CampaignStatus::Paused,
            "ARCHIVED" | "DELETED" => CampaignStatus::Archived,
            _ => CampaignStatus::Draft,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Archived => "archived",
            CampaignStatus::Draft => "draft",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BudgetType {
    Daily,
    Lifetime,
}

impl BudgetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetType::Daily => "daily",
            BudgetType::Lifetime => "lifetime",
        }
    }
}

/// One platform-specific named counter from an insights payload.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ActionCount {
    pub action_type: String,
    pub value: i64,
}

/// One dated performance snapshot for a campaign.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MetricRecord {
    pub date_key: NaiveDate,
    pub spend: f64,
    pub impressions: i64,
    pub clicks: i64,
    pub ctr: f64,
    pub cpc: f64,
    pub cpm: f64,
    pub reach: i64,
    pub actions: Vec<ActionCount>,
}

impl MetricRecord {
    /// A zeroed snapshot, used when a per-campaign insights fetch fails.
    pub fn zeroed(date_key: NaiveDate) -> Self {
        Self {
            date_key,
            spend: 0.0,
            impressions: 0,
            clicks: 0,
            ctr: 0.0,
            cpc: 0.0,
            cpm: 0.0,
            reach: 0,
            actions: Vec::new(),
        }
    }
}

/// Outcome of one sync run, returned to the caller and logged.
#[derive(Debug, Serialize, Default)]
pub struct SyncSummary {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub metrics_synced: usize,
    pub errors: usize,
    pub details: Vec<SyncDetail>,
}

#[derive(Debug, Serialize)]
pub struct SyncDetail {
    pub campaign_id: String,
    pub campaign_name: String,
    pub status: String,
    pub error: Option<String>,
}

/// Ad account metadata returned alongside a token exchange.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdAccountInfo {
    pub id: String,
    pub name: String,
    pub account_status: i64,
    pub currency: Option<String>,
}

/// Basic profile of the authenticated platform user.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
}

/// The token grant returned by the platform's OAuth endpoint.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: Option<i64>,
}
