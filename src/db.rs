use crate::models::{CampaignRecord, Integration, MetricRecord, Platform};
use crate::sync::{SyncStore, UpsertOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use postgres_openssl::MakeTlsConnector;
use thiserror::Error;
use tokio_postgres::{Client, Config};
use std::str::FromStr;
use tracing::error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] tokio_postgres::Error),
    #[error("SSL error: {0}")]
    SslError(#[from] openssl::error::ErrorStack),
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),
    #[error("Unrecognized platform value: {0}")]
    UnknownPlatform(String),
}

pub struct Database {
    client: Client,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, DatabaseError> {
        // Configure SSL
        let mut builder = SslConnector::builder(SslMethod::tls())?;
        builder.set_verify(SslVerifyMode::NONE); // For development only, use proper verification in production
        let connector = MakeTlsConnector::new(builder.build());

        // Parse the connection config from URL
        let mut config = Config::from_str(database_url)
            .map_err(|e| DatabaseError::InvalidConnectionString(e.to_string()))?;

        // Connect with SSL
        let (client, connection) = config
            .connect_timeout(std::time::Duration::from_secs(5))
            .connect(connector)
            .await
            .map_err(DatabaseError::ConnectionError)?;

        // Spawn the connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "database connection error");
            }
        });

        Ok(Self { client })
    }

    /// The authoritative active integration for a (workspace, platform)
    /// pair, or `None` when the workspace has never connected that platform.
    pub async fn get_active_integration(
        &self,
        workspace_id: &str,
        platform: Platform,
    ) -> Result<Option<Integration>, DatabaseError> {
        let row = self
            .client
            .query_opt(
                "SELECT
                    id,
                    workspace_id,
                    platform,
                    access_token,
                    refresh_token,
                    account_id,
                    account_name,
                    is_active,
                    expires_at,
                    settings
                 FROM ad_integrations
                 WHERE workspace_id = $1 AND platform = $2 AND is_active = true
                 ORDER BY id DESC
                 LIMIT 1",
                &[&workspace_id, &platform.as_str()],
            )
            .await?;

        row.map(integration_from_row).transpose()
    }

    /// Links (or re-links) a platform account to a workspace. Reconnecting
    /// replaces the stored token rather than accumulating rows.
    pub async fn upsert_integration(
        &self,
        workspace_id: &str,
        platform: Platform,
        access_token: &str,
        account_id: &str,
        account_name: &str,
        expires_at: Option<DateTime<Utc>>,
        settings: Option<&serde_json::Value>,
    ) -> Result<i32, DatabaseError> {
        let row = self
            .client
            .query_one(
                "INSERT INTO ad_integrations
                    (workspace_id, platform, access_token, account_id,
                     account_name, is_active, expires_at, settings, updated_at)
                 VALUES ($1, $2, $3, $4, $5, true, $6, $7, NOW())
                 ON CONFLICT (workspace_id, platform) DO UPDATE SET
                    access_token = EXCLUDED.access_token,
                    account_id = EXCLUDED.account_id,
                    account_name = EXCLUDED.account_name,
                    is_active = true,
                    expires_at = EXCLUDED.expires_at,
                    settings = EXCLUDED.settings,
                    updated_at = NOW()
                 RETURNING id",
                &[
                    &workspace_id,
                    &platform.as_str(),
                    &access_token,
                    &account_id,
                    &account_name,
                    &expires_at,
                    &settings,
                ],
            )
            .await?;

        Ok(row.get(0))
    }

    /// Timestamp of the most recent metric write for an integration's
    /// campaigns; `None` before the first sync.
    pub async fn last_sync(
        &self,
        integration_id: i32,
    ) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        let row = self
            .client
            .query_one(
                "SELECT MAX(cm.updated_at)
                 FROM campaign_metrics cm
                 JOIN campaigns c ON c.id = cm.campaign_id
                 WHERE c.integration_id = $1",
                &[&integration_id],
            )
            .await?;

        Ok(row.get(0))
    }
}

fn integration_from_row(row: tokio_postgres::Row) -> Result<Integration, DatabaseError> {
    let platform_raw: String = row.get(2);
    let platform = Platform::parse(&platform_raw)
        .ok_or_else(|| DatabaseError::UnknownPlatform(platform_raw))?;

    Ok(Integration {
        id: row.get(0),
        workspace_id: row.get(1),
        platform,
        access_token: row.get(3),
        refresh_token: row.get(4),
        account_id: row.get(5),
        account_name: row.get(6),
        is_active: row.get(7),
        expires_at: row.get(8),
        settings: row.get(9),
    })
}

#[async_trait]
impl SyncStore for Database {
    async fn upsert_campaign(
        &self,
        integration_id: i32,
        campaign: &CampaignRecord,
    ) -> Result<(i32, UpsertOutcome), DatabaseError> {
        let row = self
            .client
            .query_one(
                "INSERT INTO campaigns
                    (integration_id, external_id, name, status, objective,
                     budget_amount, budget_type, started_at, ended_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
                 ON CONFLICT (integration_id, external_id) DO UPDATE SET
                    name = EXCLUDED.name,
                    status = EXCLUDED.status,
                    objective = EXCLUDED.objective,
                    budget_amount = EXCLUDED.budget_amount,
                    budget_type = EXCLUDED.budget_type,
                    started_at = EXCLUDED.started_at,
                    ended_at = EXCLUDED.ended_at,
                    updated_at = NOW()
                 RETURNING id, (xmax = 0) AS inserted",
                &[
                    &integration_id,
                    &campaign.external_id,
                    &campaign.name,
                    &campaign.status.as_str(),
                    &campaign.objective,
                    &campaign.budget_amount,
                    &campaign.budget_type.as_str(),
                    &campaign.started_at,
                    &campaign.ended_at,
                ],
            )
            .await?;

        let id: i32 = row.get(0);
        let inserted: bool = row.get(1);
        let outcome = if inserted {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        };
        Ok((id, outcome))
    }

    async fn upsert_metric(
        &self,
        campaign_id: i32,
        metric: &MetricRecord,
        results: i64,
    ) -> Result<(), DatabaseError> {
        let actions = serde_json::to_value(&metric.actions)
            .unwrap_or_else(|_| serde_json::Value::Array(Vec::new()));

        self.client
            .execute(
                "INSERT INTO campaign_metrics
                    (campaign_id, date_key, spend, impressions, clicks,
                     ctr, cpc, cpm, reach, actions, results, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
                 ON CONFLICT (campaign_id, date_key) DO UPDATE SET
                    spend = EXCLUDED.spend,
                    impressions = EXCLUDED.impressions,
                    clicks = EXCLUDED.clicks,
                    ctr = EXCLUDED.ctr,
                    cpc = EXCLUDED.cpc,
                    cpm = EXCLUDED.cpm,
                    reach = EXCLUDED.reach,
                    actions = EXCLUDED.actions,
                    results = EXCLUDED.results,
                    updated_at = NOW()",
                &[
                    &campaign_id,
                    &metric.date_key,
                    &metric.spend,
                    &metric.impressions,
                    &metric.clicks,
                    &metric.ctr,
                    &metric.cpc,
                    &metric.cpm,
                    &metric.reach,
                    &actions,
                    &results,
                ],
            )
            .await?;

        Ok(())
    }
}
