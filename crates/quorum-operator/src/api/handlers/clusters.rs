//! Cluster handlers

use crate::api::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    Json,
};
use quorum_types::{ClusterId, ClusterObservedState, ClusterPhase, ConditionType};
use serde::Serialize;

/// One row of the cluster listing
#[derive(Debug, Serialize)]
pub struct ClusterSummary {
    pub cluster: String,
    pub generation: u64,
    /// Absent until the first cycle has written observed state
    pub phase: Option<ClusterPhase>,
    pub observed_generation: Option<u64>,
    pub members: usize,
    pub healthy_members: usize,
    /// Conditions currently true
    pub conditions: Vec<ConditionType>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ClusterSummary {
    fn new(id: &ClusterId, generation: u64, observed: Option<&ClusterObservedState>) -> Self {
        Self {
            cluster: id.key(),
            generation,
            phase: observed.map(|o| o.phase),
            observed_generation: observed.map(|o| o.observed_generation),
            members: observed.map(|o| o.members.len()).unwrap_or(0),
            healthy_members: observed.map(|o| o.healthy_members()).unwrap_or(0),
            conditions: observed
                .map(|o| {
                    o.conditions
                        .iter()
                        .filter(|c| c.is_true())
                        .map(|c| c.condition_type)
                        .collect()
                })
                .unwrap_or_default(),
            updated_at: observed.map(|o| o.updated_at),
        }
    }
}

/// List every managed cluster
pub async fn list_clusters(State(state): State<AppState>) -> ApiResult<Json<Vec<ClusterSummary>>> {
    let substrate = state.ctx.substrate();
    let mut summaries = Vec::new();

    for (key, desired) in substrate.desired().list("").await? {
        let observed = substrate.observed().get(&key).await?.map(|o| o.value);
        summaries.push(ClusterSummary::new(
            &desired.value.id,
            desired.value.generation,
            observed.as_ref(),
        ));
    }

    Ok(Json(summaries))
}

/// Full observed state of one cluster
pub async fn get_cluster(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<Json<ClusterObservedState>> {
    let id = ClusterId::new(namespace, name);
    state
        .ctx
        .substrate()
        .observed()
        .get(&id.key())
        .await?
        .map(|observed| Json(observed.value))
        .ok_or_else(|| ApiError::NotFound(format!("cluster {id} has no observed state")))
}
