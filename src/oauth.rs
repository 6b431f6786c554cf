use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::constants::{
    EXCHANGE_TIMEOUT_SECS, FACEBOOK_API_VERSION, FACEBOOK_BASE_URL, FB_ACCOUNT_FIELDS,
    FB_ACCOUNT_STATUS_ACTIVE,
};
use crate::facebook::{graph_get, GraphError};
use crate::models::{AdAccountInfo, TokenGrant, UserProfile};
use crate::retry::RetryPolicy;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Missing required field: {0}")]
    InvalidRequest(&'static str),
    #[error("Selected ad account is not active")]
    InactiveAccount,
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Everything the OAuth flow yields in one pass: the token grant, the
/// authenticated user, the reachable ad accounts, and (when the choice is
/// unambiguous) the auto-selected account. Persisting an integration row is
/// the caller's job.
#[derive(Debug)]
pub struct ExchangeResult {
    pub grant: TokenGrant,
    pub profile: Option<UserProfile>,
    pub accounts: Vec<AdAccountInfo>,
    pub selected: Option<AdAccountInfo>,
}

/// Converts a one-time OAuth authorization code into a durable access token
/// plus account metadata.
pub struct TokenExchanger {
    client: Client,
    app_id: String,
    app_secret: String,
    base_url: String,
    retry: RetryPolicy,
}

impl TokenExchanger {
    pub fn new(app_id: String, app_secret: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(EXCHANGE_TIMEOUT_SECS))
            .build()
            .expect("reqwest client");
        Self {
            client,
            app_id,
            app_secret,
            base_url: format!("{}/{}", FACEBOOK_BASE_URL, FACEBOOK_API_VERSION),
            retry: RetryPolicy::default(),
        }
    }

    pub async fn exchange(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<ExchangeResult, ExchangeError> {
        if code.trim().is_empty() {
            return Err(ExchangeError::InvalidRequest("code"));
        }
        if redirect_uri.trim().is_empty() {
            return Err(ExchangeError::InvalidRequest("redirect_uri"));
        }

        info!(redirect_uri, code = %mask_secret(code), "exchanging authorization code");

        let url = format!("{}/oauth/access_token", self.base_url);
        let body = graph_get(
            &self.client,
            &url,
            &[
                ("client_id", self.app_id.clone()),
                ("client_secret", self.app_secret.clone()),
                ("redirect_uri", redirect_uri.to_string()),
                ("code", code.to_string()),
            ],
            &self.retry,
        )
        .await?;

        let grant = parse_token_grant(&body)?;

        // Profile is diagnostic metadata; a failure here should not lose an
        // otherwise valid grant.
        let profile = match self.fetch_profile(&grant.access_token).await {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(error = %e, "profile fetch failed after token exchange");
                None
            }
        };

        let accounts = self.fetch_ad_accounts(&grant.access_token).await?;
        let selected = auto_select_account(&accounts)?;

        info!(
            accounts = accounts.len(),
            auto_selected = selected.is_some(),
            "token exchange complete"
        );

        Ok(ExchangeResult {
            grant,
            profile,
            accounts,
            selected,
        })
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, GraphError> {
        let url = format!("{}/me", self.base_url);
        let body = graph_get(
            &self.client,
            &url,
            &[
                ("access_token", access_token.to_string()),
                ("fields", "id,name".to_string()),
            ],
            &self.retry,
        )
        .await?;

        Ok(UserProfile {
            id: body["id"].as_str().unwrap_or("").to_string(),
            name: body["name"].as_str().unwrap_or("").to_string(),
        })
    }

    async fn fetch_ad_accounts(&self, access_token: &str) -> Result<Vec<AdAccountInfo>, GraphError> {
        let url = format!("{}/me/adaccounts", self.base_url);
        let body = graph_get(
            &self.client,
            &url,
            &[
                ("access_token", access_token.to_string()),
                ("fields", FB_ACCOUNT_FIELDS.to_string()),
            ],
            &self.retry,
        )
        .await?;

        Ok(parse_ad_accounts(&body))
    }
}

/// Auto-selects when exactly one ad account is reachable. A sole account
/// that is not active (platform status 1) is rejected rather than silently
/// linked. Multiple accounts defer to a caller-side selection step.
pub fn auto_select_account(
    accounts: &[AdAccountInfo],
) -> Result<Option<AdAccountInfo>, ExchangeError> {
    match accounts {
        [only] => {
            if only.account_status == FB_ACCOUNT_STATUS_ACTIVE {
                Ok(Some(only.clone()))
            } else {
                Err(ExchangeError::InactiveAccount)
            }
        }
        _ => Ok(None),
    }
}

pub fn parse_token_grant(body: &Value) -> Result<TokenGrant, GraphError> {
    let access_token = body["access_token"]
        .as_str()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GraphError::MalformedResponse("response missing access_token".to_string()))?
        .to_string();

    Ok(TokenGrant {
        access_token,
        token_type: body["token_type"].as_str().unwrap_or("bearer").to_string(),
        expires_in: body["expires_in"].as_i64(),
    })
}

fn parse_ad_accounts(body: &Value) -> Vec<AdAccountInfo> {
    let Some(data) = body["data"].as_array() else {
        return Vec::new();
    };

    data.iter()
        .filter_map(|a| {
            Some(AdAccountInfo {
                id: a["id"].as_str()?.to_string(),
                name: a["name"].as_str().unwrap_or("").to_string(),
                account_status: a["account_status"].as_i64().unwrap_or(0),
                currency: a["currency"].as_str().map(str::to_string),
            })
        })
        .collect()
}

/// Shows only a short prefix of a secret for log lines. Counts characters,
/// not bytes, so multi-byte input cannot split a char boundary.
pub fn mask_secret(value: &str) -> String {
    let chars = value.chars().count();
    if chars > 8 {
        let prefix: String = value.chars().take(4).collect();
        format!("{}...{}", prefix, chars)
    } else if !value.is_empty() {
        "****".to_string()
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn account(id: &str, status: i64) -> AdAccountInfo {
        AdAccountInfo {
            id: id.to_string(),
            name: format!("Account {}", id),
            account_status: status,
            currency: Some("USD".to_string()),
        }
    }

    #[tokio::test]
    async fn missing_code_fails_before_any_http_call() {
        let exchanger = TokenExchanger::new("app".to_string(), "secret".to_string());
        let err = exchanger
            .exchange("", "https://app.example.com/callback")
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidRequest("code")));
    }

    #[tokio::test]
    async fn missing_redirect_uri_fails_before_any_http_call() {
        let exchanger = TokenExchanger::new("app".to_string(), "secret".to_string());
        let err = exchanger.exchange("AQB-code", "  ").await.unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidRequest("redirect_uri")));
    }

    #[test]
    fn single_active_account_is_auto_selected() {
        let accounts = vec![account("act_1", 1)];
        let selected = auto_select_account(&accounts).unwrap();
        assert_eq!(selected.unwrap().id, "act_1");
    }

    #[test]
    fn single_inactive_account_is_rejected() {
        let accounts = vec![account("act_1", 2)];
        assert!(matches!(
            auto_select_account(&accounts),
            Err(ExchangeError::InactiveAccount)
        ));
    }

    #[test]
    fn multiple_accounts_defer_selection() {
        let accounts = vec![account("act_1", 1), account("act_2", 1)];
        assert!(auto_select_account(&accounts).unwrap().is_none());
    }

    #[test]
    fn token_grant_requires_access_token() {
        let ok = parse_token_grant(&json!({
            "access_token": "EAAB-token",
            "token_type": "bearer",
            "expires_in": 5183944
        }))
        .unwrap();
        assert_eq!(ok.access_token, "EAAB-token");
        assert_eq!(ok.expires_in, Some(5183944));

        let err = parse_token_grant(&json!({"token_type": "bearer"})).unwrap_err();
        assert!(matches!(err, GraphError::MalformedResponse(_)));
    }

    #[test]
    fn mask_secret_hides_the_middle() {
        assert_eq!(mask_secret(""), "");
        assert_eq!(mask_secret("short"), "****");
        let masked = mask_secret("AQB1234567890abcdef");
        assert!(masked.starts_with("AQB1"));
        assert!(!masked.contains("567890"));
    }

    #[test]
    fn mask_secret_handles_multibyte_codes() {
        // 12 bytes, 4 chars: must not slice mid-character
        assert_eq!(mask_secret("€€€€"), "****");
        let masked = mask_secret("€€€€€€€€€");
        assert_eq!(masked, "€€€€...9");
    }
}
