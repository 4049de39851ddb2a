//! The DesiredConfig loop: hash, record, select and publish a version, then
//! collect revisions that fell out of the history.

use tracing::Instrument;

use crate::api::conditions::{
    find_condition, remove_condition, set_condition, Condition, ConditionStatus,
    CACHE_OUT_OF_SYNC, CONFIG_FAILED, ROLLBACK_FAILED,
};
use crate::api::{CacheState, DesiredConfig, ObjectKey, SNAPSHOT_FINALIZER};
use crate::hash::hash_resources;

use super::context::Context;
use super::error::ReconcileError;
use super::revision_store::{
    consolidate, delete_unreferenced, ensure_revision, mark_published, unpublish_all,
};
use super::selector::select_version;

/// What a DesiredConfig reconcile did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOutcome {
    /// The record no longer exists.
    Missing,
    /// The node's snapshot was cleared and the finalizer released.
    Finalized,
    Published { version: String, state: CacheState },
    /// Every revision in the history is tainted.
    RollbackFailed,
}

/// Reconciles the DesiredConfig at `key`.
pub async fn reconcile_config(
    ctx: &Context,
    key: &ObjectKey,
) -> Result<ConfigOutcome, ReconcileError> {
    let span = tracing::info_span!("reconcile_config", key = %key);
    async move {
        let Some(config) = ctx.store.get_config(key).await? else {
            log::debug!("DesiredConfig {} is gone", key);
            return Ok(ConfigOutcome::Missing);
        };

        if config.metadata.is_deleting() {
            return finalize(ctx, config).await;
        }

        let config = ensure_finalizer(ctx, config).await?;
        publish(ctx, config).await
    }
    .instrument(span)
    .await
}

async fn ensure_finalizer(
    ctx: &Context,
    config: DesiredConfig,
) -> Result<DesiredConfig, ReconcileError> {
    if config.metadata.has_finalizer(SNAPSHOT_FINALIZER) {
        return Ok(config);
    }
    let mut next = config;
    next.metadata.add_finalizer(SNAPSHOT_FINALIZER);
    Ok(ctx.store.update_config(next).await?)
}

async fn publish(ctx: &Context, config: DesiredConfig) -> Result<ConfigOutcome, ReconcileError> {
    let store = ctx.store.as_ref();
    let node_id = config.node_id().to_string();

    let desired = hash_resources(&config.spec.resources);
    let revision = ensure_revision(store, &config, &desired).await?;

    let mut next = config.clone();
    consolidate(&mut next, &revision, ctx.max_revisions);
    next.status.desired_version = Some(desired.clone());

    let outcome = match select_version(store, &next).await {
        Ok(version) => {
            let state = if version == desired {
                CacheState::InSync
            } else {
                CacheState::Rollback
            };
            let message = match state {
                CacheState::InSync => format!("desired version {} is published", version),
                _ => format!(
                    "desired version {} is tainted, rolled back to {}",
                    desired, version
                ),
            };
            mark_published(store, &node_id, &version, &state.to_string(), &message).await?;
            apply_published(&mut next, &version, state, &message);
            ConfigOutcome::Published { version, state }
        }
        Err(ReconcileError::AllRevisionsTainted { .. }) => {
            log::warn!(
                "No untainted revision left for node {}, desired version {}",
                node_id,
                desired
            );
            unpublish_all(store, &node_id, "AllRevisionsTainted", "no untainted revision left")
                .await?;
            apply_rollback_failed(&mut next, &desired);
            ConfigOutcome::RollbackFailed
        }
        Err(e) => return Err(e),
    };

    let written = if next.status != config.status {
        ctx.store.update_config_status(&next).await?
    } else {
        next
    };

    let deleted = delete_unreferenced(store, &written).await;
    if deleted > 0 {
        log::info!("Deleted {} unreferenced revisions for node {}", deleted, node_id);
    }

    Ok(outcome)
}

fn apply_published(config: &mut DesiredConfig, version: &str, state: CacheState, message: &str) {
    let status = &mut config.status;
    if status.published_version.as_deref() != Some(version) {
        if remove_condition(&mut status.conditions, CONFIG_FAILED) {
            log::info!("Cleared ConfigFailed for {} after publishing {}", config.metadata.key(), version);
        }
        status.published_version = Some(version.to_string());
    }
    status.cache_state = Some(state);

    set_condition(
        &mut status.conditions,
        Condition::new(
            CACHE_OUT_OF_SYNC,
            ConditionStatus::from_bool(state != CacheState::InSync),
            state.to_string(),
            message,
        ),
    );
    if find_condition(&status.conditions, ROLLBACK_FAILED).is_some() {
        set_condition(
            &mut status.conditions,
            Condition::new(
                ROLLBACK_FAILED,
                ConditionStatus::False,
                "RevisionAvailable",
                format!("version {} is publishable", version),
            ),
        );
    }
}

fn apply_rollback_failed(config: &mut DesiredConfig, desired: &str) {
    let status = &mut config.status;
    status.published_version = None;
    status.cache_state = Some(CacheState::RollbackFailed);

    let message = format!(
        "desired version {} and every older revision are tainted",
        desired
    );
    set_condition(
        &mut status.conditions,
        Condition::new(ROLLBACK_FAILED, ConditionStatus::True, "AllRevisionsTainted", &message),
    );
    set_condition(
        &mut status.conditions,
        Condition::new(CACHE_OUT_OF_SYNC, ConditionStatus::True, "RollbackFailed", &message),
    );
}

/// Clears the node's snapshot and the config's revisions, then releases the
/// finalizer so the store can drop the record.
async fn finalize(ctx: &Context, config: DesiredConfig) -> Result<ConfigOutcome, ReconcileError> {
    if !config.metadata.has_finalizer(SNAPSHOT_FINALIZER) {
        return Ok(ConfigOutcome::Finalized);
    }
    let node_id = config.node_id().to_string();

    {
        let _guard = ctx.lock_node(&node_id).await;
        ctx.cache.clear_snapshot(&node_id);
        log::info!("Cleared snapshot of node {} for deleted {}", node_id, config.key());
    }

    for revision in ctx.store.list_owned_revisions(&config.metadata.uid).await? {
        match ctx.store.delete_revision(&revision.key()).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
    }

    let mut next = config;
    next.metadata.remove_finalizer(SNAPSHOT_FINALIZER);
    ctx.store.update_config(next).await?;
    ctx.forget_node(&node_id);
    Ok(ConfigOutcome::Finalized)
}
