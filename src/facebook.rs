use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::constants::{
    FACEBOOK_API_VERSION, FACEBOOK_BASE_URL, FB_CAMPAIGN_FIELDS, FB_CODE_APP_REQUEST_LIMIT,
    FB_CODE_TOKEN_EXPIRED, FB_CODE_TOO_MANY_CALLS, FB_INSIGHT_FIELDS, WAIT_MINUTES_APP_LIMIT,
    WAIT_MINUTES_TEMP_BLOCK,
};
use crate::models::{ActionCount, BudgetType, CampaignRecord, CampaignStatus, MetricRecord};
use crate::retry::RetryPolicy;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Rate limited by provider (code {code}), retry in ~{wait_minutes} minutes")]
    RateLimited { code: i64, wait_minutes: u64 },
    #[error("Access token expired or invalid")]
    TokenExpired,
    #[error("Provider rejected the request: {message}")]
    ProviderRejected { message: String, code: Option<i64> },
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
    #[error("Request failed: {0}")]
    Transport(String),
    #[error("Request timed out")]
    Timeout,
}

impl GraphError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GraphError::Timeout
        } else {
            GraphError::Transport(e.to_string())
        }
    }

    fn is_transient(&self, policy: &RetryPolicy) -> bool {
        match self {
            GraphError::RateLimited { code, .. } => policy.is_retryable_code(*code),
            GraphError::Transport(_) | GraphError::Timeout => true,
            _ => false,
        }
    }
}

fn wait_minutes_for_code(code: i64) -> u64 {
    if code == FB_CODE_APP_REQUEST_LIMIT {
        WAIT_MINUTES_APP_LIMIT
    } else {
        WAIT_MINUTES_TEMP_BLOCK
    }
}

/// Classifies a failing HTTP status when the body carries no Graph error
/// object. A downstream 401 is a token-expiry signal in its own right.
pub fn classify_status(status: reqwest::StatusCode) -> GraphError {
    if status == reqwest::StatusCode::UNAUTHORIZED {
        GraphError::TokenExpired
    } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        GraphError::RateLimited {
            code: FB_CODE_TOO_MANY_CALLS,
            wait_minutes: WAIT_MINUTES_TEMP_BLOCK,
        }
    } else if status.is_client_error() {
        GraphError::ProviderRejected {
            message: format!("HTTP {}", status),
            code: None,
        }
    } else {
        GraphError::Transport(format!("HTTP {}", status))
    }
}

/// Classifies a Graph API response body. Returns `None` when the body
/// carries no error object.
pub fn classify_error(body: &Value) -> Option<GraphError> {
    let error = body.get("error")?;
    if !error.is_object() {
        return None;
    }

    let code = error.get("code").and_then(|c| c.as_i64());
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("unknown provider error")
        .to_string();

    match code {
        Some(FB_CODE_TOKEN_EXPIRED) => Some(GraphError::TokenExpired),
        Some(c) if c == FB_CODE_TOO_MANY_CALLS || c == FB_CODE_APP_REQUEST_LIMIT => {
            Some(GraphError::RateLimited {
                code: c,
                wait_minutes: wait_minutes_for_code(c),
            })
        }
        _ => Some(GraphError::ProviderRejected { message, code }),
    }
}

/// Issues one GET against the Graph API, absorbing transient failures with
/// exponential backoff. Every outbound call in this service goes through
/// here; rate-limit codes are retried up to the policy's maximum, anything
/// indicating a data or auth problem fails fast.
pub async fn graph_get(
    client: &Client,
    url: &str,
    query: &[(&str, String)],
    policy: &RetryPolicy,
) -> Result<Value, GraphError> {
    let mut attempt = 0;
    loop {
        let result = async {
            let response = client
                .get(url)
                .query(query)
                .send()
                .await
                .map_err(GraphError::from_reqwest)?;

            let status = response.status();
            let body = response.json::<Value>().await;

            match body {
                Ok(body) => {
                    // A structured Graph error is more precise than the
                    // status line, so it wins when both are present.
                    if let Some(err) = classify_error(&body) {
                        return Err(err);
                    }
                    if !status.is_success() {
                        return Err(classify_status(status));
                    }
                    Ok(body)
                }
                Err(_) if !status.is_success() => Err(classify_status(status)),
                Err(e) => Err(GraphError::MalformedResponse(e.to_string())),
            }
        }
        .await;

        match result {
            Ok(body) => return Ok(body),
            Err(err) if err.is_transient(policy) && !policy.is_last_attempt(attempt) => {
                let delay = policy.backoff_delay(attempt);
                warn!(url, attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying Graph API call");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Ensures exactly one `act_` prefix on an ad-account identifier.
/// Idempotent, and collapses accidental double prefixes.
pub fn normalize_account_id(raw: &str) -> String {
    let mut bare = raw.trim();
    while let Some(rest) = bare.strip_prefix("act_") {
        bare = rest;
    }
    format!("act_{}", bare)
}

pub struct FacebookAPI {
    client: Client,
    access_token: String,
    base_url: String,
    retry: RetryPolicy,
}

impl FacebookAPI {
    /// Every caller supplies a deadline; a Graph call must never hang an
    /// inbound request indefinitely.
    pub fn with_timeout(access_token: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        Self {
            client,
            access_token,
            base_url: format!("{}/{}", FACEBOOK_BASE_URL, FACEBOOK_API_VERSION),
            retry: RetryPolicy::default(),
        }
    }

    pub async fn get_campaigns(&self, account_id: &str) -> Result<Vec<CampaignRecord>, GraphError> {
        let account = normalize_account_id(account_id);
        let url = format!("{}/{}/campaigns", self.base_url, account);
        let body = graph_get(
            &self.client,
            &url,
            &[
                ("access_token", self.access_token.clone()),
                ("fields", FB_CAMPAIGN_FIELDS.to_string()),
                ("limit", "200".to_string()),
            ],
            &self.retry,
        )
        .await?;

        Ok(parse_campaign_list(&body))
    }

    pub async fn get_campaign_insights(
        &self,
        campaign_id: &str,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<MetricRecord>, GraphError> {
        let url = format!("{}/{}/insights", self.base_url, campaign_id);
        let time_range = format!(
            "{{\"since\":\"{}\",\"until\":\"{}\"}}",
            since.format("%Y-%m-%d"),
            until.format("%Y-%m-%d"),
        );
        let body = graph_get(
            &self.client,
            &url,
            &[
                ("access_token", self.access_token.clone()),
                ("fields", FB_INSIGHT_FIELDS.to_string()),
                ("time_range", time_range),
                // one row per calendar day
                ("time_increment", "1".to_string()),
            ],
            &self.retry,
        )
        .await?;

        Ok(parse_insight_rows(&body, until))
    }
}

fn parse_campaign_list(body: &Value) -> Vec<CampaignRecord> {
    let Some(data) = body["data"].as_array() else {
        return Vec::new();
    };

    data.iter()
        .filter_map(|c| {
            let external_id = c["id"].as_str()?.to_string();
            let status = c["effective_status"]
                .as_str()
                .or_else(|| c["status"].as_str())
                .unwrap_or("");

            // Budgets arrive as strings in minor currency units.
            let daily = budget_value(&c["daily_budget"]);
            let lifetime = budget_value(&c["lifetime_budget"]);
            let (budget_amount, budget_type) = match (daily, lifetime) {
                (Some(d), _) => (d, BudgetType::Daily),
                (None, Some(l)) => (l, BudgetType::Lifetime),
                (None, None) => (0.0, BudgetType::Daily),
            };

            Some(CampaignRecord {
                external_id,
                name: c["name"].as_str().unwrap_or("").to_string(),
                status: CampaignStatus::from_platform(status),
                objective: c["objective"].as_str().unwrap_or("").to_string(),
                budget_amount,
                budget_type,
                started_at: parse_timestamp(&c["start_time"]),
                ended_at: parse_timestamp(&c["stop_time"]),
            })
        })
        .collect()
}

fn budget_value(v: &Value) -> Option<f64> {
    v.as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .map(|minor| minor / 100.0)
}

fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    v.as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Normalizes heterogeneous insights rows into `MetricRecord`s. The Graph
/// API returns numbers as strings and omits fields freely, so everything
/// defaults to zero at this boundary instead of scattering fallbacks through
/// the callers. Rows without a parseable date key fall back to `until`.
pub fn parse_insight_rows(body: &Value, until: NaiveDate) -> Vec<MetricRecord> {
    let Some(data) = body["data"].as_array() else {
        return Vec::new();
    };

    data.iter()
        .map(|row| {
            let date_key = row["date_start"]
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .unwrap_or(until);

            MetricRecord {
                date_key,
                spend: num_f64(&row["spend"]),
                impressions: num_i64(&row["impressions"]),
                clicks: num_i64(&row["clicks"]),
                ctr: num_f64(&row["ctr"]),
                cpc: num_f64(&row["cpc"]),
                cpm: num_f64(&row["cpm"]),
                reach: num_i64(&row["reach"]),
                actions: parse_actions(&row["actions"]),
            }
        })
        .collect()
}

fn parse_actions(v: &Value) -> Vec<ActionCount> {
    let Some(list) = v.as_array() else {
        return Vec::new();
    };

    list.iter()
        .filter_map(|a| {
            Some(ActionCount {
                action_type: a["action_type"].as_str()?.to_string(),
                value: num_i64(&a["value"]),
            })
        })
        .collect()
}

fn num_f64(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn num_i64(v: &Value) -> i64 {
    match v {
        Value::Number(n) => n.as_i64().unwrap_or(0),
        Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_adds_prefix_once() {
        assert_eq!(normalize_account_id("12345"), "act_12345");
        assert_eq!(normalize_account_id("act_12345"), "act_12345");
        assert_eq!(normalize_account_id("act_act_12345"), "act_12345");
        assert_eq!(normalize_account_id(" act_12345 "), "act_12345");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["9", "act_9", "act_act_9", "  42"] {
            let once = normalize_account_id(raw);
            assert_eq!(normalize_account_id(&once), once);
        }
    }

    #[test]
    fn code_190_classifies_as_token_expired() {
        let body = json!({"error": {"message": "Error validating access token", "code": 190}});
        assert!(matches!(
            classify_error(&body),
            Some(GraphError::TokenExpired)
        ));
    }

    #[test]
    fn rate_limit_codes_classify_with_wait_hint() {
        let body = json!({"error": {"message": "Application request limit reached", "code": 4}});
        match classify_error(&body) {
            Some(GraphError::RateLimited { code, wait_minutes }) => {
                assert_eq!(code, 4);
                assert_eq!(wait_minutes, 30);
            }
            other => panic!("unexpected classification: {:?}", other),
        }

        let body = json!({"error": {"message": "Too many calls", "code": 368}});
        match classify_error(&body) {
            Some(GraphError::RateLimited { code, wait_minutes }) => {
                assert_eq!(code, 368);
                assert_eq!(wait_minutes, 5);
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn other_error_codes_classify_as_provider_rejected() {
        let body = json!({"error": {"message": "Unsupported request", "code": 100}});
        match classify_error(&body) {
            Some(GraphError::ProviderRejected { message, code }) => {
                assert_eq!(message, "Unsupported request");
                assert_eq!(code, Some(100));
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn client_is_built_with_a_deadline() {
        let api = FacebookAPI::with_timeout("token".to_string(), Duration::from_secs(30));
        assert_eq!(api.retry.max_attempts, 3);
        assert!(api.base_url.ends_with(FACEBOOK_API_VERSION));
    }

    #[test]
    fn http_401_without_error_body_classifies_as_token_expired() {
        assert!(matches!(
            classify_status(reqwest::StatusCode::UNAUTHORIZED),
            GraphError::TokenExpired
        ));
    }

    #[test]
    fn http_statuses_classify_by_class() {
        assert!(matches!(
            classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS),
            GraphError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_status(reqwest::StatusCode::BAD_REQUEST),
            GraphError::ProviderRejected { .. }
        ));
        assert!(matches!(
            classify_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR),
            GraphError::Transport(_)
        ));
    }

    #[test]
    fn clean_body_classifies_as_no_error() {
        let body = json!({"data": []});
        assert!(classify_error(&body).is_none());
    }

    #[test]
    fn campaign_list_parses_budget_and_status() {
        let body = json!({"data": [
            {
                "id": "c1",
                "name": "Summer Launch",
                "status": "ACTIVE",
                "effective_status": "ACTIVE",
                "objective": "CONVERSIONS",
                "daily_budget": "2500",
                "start_time": "2026-08-01T00:00:00+0000"
            },
            {
                "id": "c2",
                "name": "Retired",
                "status": "DELETED",
                "objective": "LINK_CLICKS",
                "lifetime_budget": "100000"
            },
            {
                "id": "c3",
                "name": "Mystery",
                "status": "IN_PROCESS",
                "objective": "BRAND_AWARENESS"
            }
        ]});

        let campaigns = parse_campaign_list(&body);
        assert_eq!(campaigns.len(), 3);

        assert_eq!(campaigns[0].status, CampaignStatus::Active);
        assert_eq!(campaigns[0].budget_amount, 25.0);
        assert_eq!(campaigns[0].budget_type, BudgetType::Daily);
        assert!(campaigns[0].started_at.is_some());

        assert_eq!(campaigns[1].status, CampaignStatus::Archived);
        assert_eq!(campaigns[1].budget_amount, 1000.0);
        assert_eq!(campaigns[1].budget_type, BudgetType::Lifetime);

        // forward-compatibility: unknown status maps to draft
        assert_eq!(campaigns[2].status, CampaignStatus::Draft);
    }

    #[test]
    fn insight_rows_normalize_stringly_numbers() {
        let until = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        let body = json!({"data": [{
            "date_start": "2026-08-20",
            "date_stop": "2026-08-20",
            "spend": "12.34",
            "impressions": "1000",
            "clicks": "50",
            "ctr": "5.0",
            "cpc": "0.2468",
            "cpm": "12.34",
            "reach": "800",
            "actions": [
                {"action_type": "purchase", "value": "3"},
                {"action_type": "link_click", "value": "47"}
            ]
        }]});

        let rows = parse_insight_rows(&body, until);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.date_key, NaiveDate::from_ymd_opt(2026, 8, 20).unwrap());
        assert_eq!(row.spend, 12.34);
        assert_eq!(row.impressions, 1000);
        assert_eq!(row.clicks, 50);
        assert_eq!(row.reach, 800);
        assert_eq!(row.actions.len(), 2);
        assert_eq!(row.actions[0].action_type, "purchase");
        assert_eq!(row.actions[0].value, 3);
    }

    #[test]
    fn missing_insight_data_yields_no_rows() {
        let until = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        assert!(parse_insight_rows(&json!({}), until).is_empty());
        assert!(parse_insight_rows(&json!({"data": []}), until).is_empty());
    }
}
