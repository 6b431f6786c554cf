use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::DatabaseError;
use crate::facebook::{FacebookAPI, GraphError};
use crate::models::{
    ActionCount, CampaignRecord, Integration, MetricRecord, SyncDetail, SyncSummary,
};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid date range: since must not be after until")]
    InvalidRange,
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Read side of a sync run. `FacebookAPI` is the production implementation;
/// tests substitute an in-memory fake.
#[async_trait]
pub trait AdsApi: Send + Sync {
    async fn fetch_campaigns(&self, account_id: &str) -> Result<Vec<CampaignRecord>, GraphError>;

    async fn fetch_insights(
        &self,
        campaign_external_id: &str,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<MetricRecord>, GraphError>;
}

#[async_trait]
impl AdsApi for FacebookAPI {
    async fn fetch_campaigns(&self, account_id: &str) -> Result<Vec<CampaignRecord>, GraphError> {
        self.get_campaigns(account_id).await
    }

    async fn fetch_insights(
        &self,
        campaign_external_id: &str,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<MetricRecord>, GraphError> {
        self.get_campaign_insights(campaign_external_id, since, until)
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Write side of a sync run, keyed by the uniqueness invariants:
/// campaigns on (integration, external_id), metrics on (campaign, date_key).
#[async_trait]
pub trait SyncStore: Send + Sync {
    async fn upsert_campaign(
        &self,
        integration_id: i32,
        campaign: &CampaignRecord,
    ) -> Result<(i32, UpsertOutcome), DatabaseError>;

    async fn upsert_metric(
        &self,
        campaign_id: i32,
        metric: &MetricRecord,
        results: i64,
    ) -> Result<(), DatabaseError>;
}

/// Action types counted as "results" per campaign objective. Unmapped
/// objectives fall back to summing every action value.
fn result_action_types(objective: &str) -> Option<&'static [&'static str]> {
    match objective {
        "CONVERSIONS" | "OUTCOME_SALES" => {
            Some(&["purchase", "lead", "complete_registration"])
        }
        "VIDEO_VIEWS" | "OUTCOME_ENGAGEMENT" => Some(&["video_view"]),
        "LINK_CLICKS" | "OUTCOME_TRAFFIC" => Some(&["link_click"]),
        "LEAD_GENERATION" | "OUTCOME_LEADS" => Some(&["lead"]),
        _ => None,
    }
}

/// Derives the conversion-like "results" counter for one metrics snapshot.
pub fn results_for(objective: &str, actions: &[ActionCount]) -> i64 {
    match result_action_types(objective) {
        Some(types) => actions
            .iter()
            .filter(|a| types.contains(&a.action_type.as_str()))
            .map(|a| a.value)
            .sum(),
        None => actions.iter().map(|a| a.value).sum(),
    }
}

/// Pulls the campaign list and per-day metric snapshots for one integration
/// and reconciles them into the store.
///
/// Per-campaign insight failures degrade to a zeroed snapshot on the `until`
/// date and are recorded in the summary; they never abort the batch.
/// Re-running with identical inputs leaves the store unchanged (upserts).
pub async fn sync_campaigns(
    api: &dyn AdsApi,
    store: &dyn SyncStore,
    integration: &Integration,
    since: NaiveDate,
    until: NaiveDate,
) -> Result<SyncSummary, SyncError> {
    if since > until {
        return Err(SyncError::InvalidRange);
    }

    let campaigns = api.fetch_campaigns(&integration.account_id).await?;
    info!(
        workspace_id = %integration.workspace_id,
        account_id = %integration.account_id,
        campaigns = campaigns.len(),
        %since,
        %until,
        "fetched campaign list"
    );

    // Insight fetches are independent reads; fan them out.
    let insight_results = join_all(
        campaigns
            .iter()
            .map(|c| api.fetch_insights(&c.external_id, since, until)),
    )
    .await;

    let mut summary = SyncSummary::default();

    for (campaign, insights) in campaigns.iter().zip(insight_results) {
        let (campaign_id, outcome) = store.upsert_campaign(integration.id, campaign).await?;
        summary.total += 1;
        match outcome {
            UpsertOutcome::Created => summary.created += 1,
            UpsertOutcome::Updated => summary.updated += 1,
        }

        let mut detail_error = None;
        let rows = match insights {
            Ok(rows) if !rows.is_empty() => rows,
            Ok(_) => {
                // No insight data for the range (e.g. campaign never
                // delivered); record a zeroed snapshot so the campaign
                // still shows up dated.
                vec![MetricRecord::zeroed(until)]
            }
            Err(e) => {
                warn!(
                    campaign = %campaign.external_id,
                    error = %e,
                    "insights fetch failed, storing zeroed snapshot"
                );
                summary.errors += 1;
                detail_error = Some(e.to_string());
                vec![MetricRecord::zeroed(until)]
            }
        };

        for row in &rows {
            let results = results_for(&campaign.objective, &row.actions);
            store.upsert_metric(campaign_id, row, results).await?;
            summary.metrics_synced += 1;
        }

        summary.details.push(SyncDetail {
            campaign_id: campaign.external_id.clone(),
            campaign_name: campaign.name.clone(),
            status: match outcome {
                UpsertOutcome::Created => "created".to_string(),
                UpsertOutcome::Updated => "updated".to_string(),
            },
            error: detail_error,
        });
    }

    info!(
        total = summary.total,
        created = summary.created,
        updated = summary.updated,
        metrics = summary.metrics_synced,
        errors = summary.errors,
        "sync complete"
    );

    Ok(summary)
}
