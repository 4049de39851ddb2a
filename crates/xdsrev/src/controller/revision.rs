//! The Revision loop: load the published revision of a node and push it to
//! the snapshot cache when its content differs from what is served.

use chrono::Utc;
use tracing::Instrument;

use crate::api::conditions::{
    set_condition, Condition, ConditionStatus, RESOURCES_OUT_OF_SYNC, REVISION_TAINTED,
};
use crate::api::{ObjectKey, Revision};
use crate::snapshot::snapshots_equal;

use super::context::Context;
use super::error::ReconcileError;

/// What a Revision reconcile did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionOutcome {
    Missing,
    /// Not published, or tainted; only bookkeeping was done.
    Idle,
    /// Loading failed validation and the revision is now tainted.
    Tainted,
    /// The served snapshot already had this content.
    Unchanged,
    Pushed,
}

/// Reconciles the Revision at `key`.
pub async fn reconcile_revision(
    ctx: &Context,
    key: &ObjectKey,
) -> Result<RevisionOutcome, ReconcileError> {
    let span = tracing::info_span!("reconcile_revision", key = %key);
    async move {
        let Some(peek) = ctx.store.get_revision(key).await? else {
            return Ok(RevisionOutcome::Missing);
        };

        let _guard = ctx.lock_node(peek.node_id()).await;
        let Some(revision) = ctx.store.get_revision(key).await? else {
            return Ok(RevisionOutcome::Missing);
        };

        if !revision.is_published() || revision.is_tainted() {
            mark_idle(ctx, &revision).await?;
            return Ok(RevisionOutcome::Idle);
        }

        publish(ctx, revision).await
    }
    .instrument(span)
    .await
}

async fn mark_idle(ctx: &Context, revision: &Revision) -> Result<(), ReconcileError> {
    if !revision.status.published {
        return Ok(());
    }
    let mut next = revision.clone();
    next.status.published = false;
    ctx.store.update_revision_status(&next).await?;
    Ok(())
}

async fn publish(ctx: &Context, revision: Revision) -> Result<RevisionOutcome, ReconcileError> {
    let node_id = revision.node_id();
    let loaded = ctx
        .loader
        .load(
            node_id,
            revision.namespace(),
            revision.version(),
            revision.spec.serialization,
            &revision.spec.resources,
        )
        .await;

    let snapshot = match loaded {
        Ok(snapshot) => snapshot,
        Err(e) if e.is_validation() => {
            log::warn!("Tainting revision {}: {}", revision.key(), e);
            let mut next = revision.clone();
            set_condition(
                &mut next.status.conditions,
                Condition::new(REVISION_TAINTED, ConditionStatus::True, e.reason(), e.to_string()),
            );
            next.status.tainted = true;
            next.status.published = false;
            ctx.store.update_revision_status(&next).await?;
            return Ok(RevisionOutcome::Tainted);
        }
        Err(e) => return Err(e.into()),
    };

    let unchanged = ctx
        .cache
        .get_snapshot(node_id)
        .is_some_and(|current| snapshots_equal(&current, &snapshot));
    if unchanged {
        log::debug!("Snapshot of node {} already matches {}", node_id, revision.key());
    } else {
        ctx.cache.set_snapshot(node_id, snapshot);
        log::info!(
            "Pushed version {} of node {} to the snapshot cache",
            revision.version(),
            node_id
        );
    }

    let mut next = revision.clone();
    next.status.published = true;
    if !unchanged || next.status.last_published_at.is_none() {
        next.status.last_published_at = Some(Utc::now());
    }
    if revision.resources_out_of_sync() {
        set_condition(
            &mut next.status.conditions,
            Condition::new(
                RESOURCES_OUT_OF_SYNC,
                ConditionStatus::False,
                "ResourcesSynced",
                "referenced resources republished",
            ),
        );
    }
    if next.status != revision.status {
        ctx.store.update_revision_status(&next).await?;
    }

    Ok(if unchanged {
        RevisionOutcome::Unchanged
    } else {
        RevisionOutcome::Pushed
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::api::conditions::REVISION_PUBLISHED;
    use crate::api::{DesiredConfig, DesiredConfigSpec, EnvoyResource, EnvoyResources, EnvoySecretResource};
    use crate::config::ControllerSpec;
    use crate::envoy::ResourceType;
    use crate::secrets::{InMemorySecretStore, SecretData};
    use crate::snapshot::{InMemorySnapshotCache, SnapshotCache};
    use crate::store::{RecordStore, SqliteStore};

    struct Fixture {
        ctx: Context,
        cache: Arc<InMemorySnapshotCache>,
        secrets: Arc<InMemorySecretStore>,
    }

    fn fixture() -> Fixture {
        let cache = Arc::new(InMemorySnapshotCache::default());
        let secrets = Arc::new(InMemorySecretStore::default());
        let ctx = Context::new(
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            cache.clone(),
            secrets.clone(),
            &ControllerSpec::default(),
        );
        Fixture { ctx, cache, secrets }
    }

    async fn published_revision(ctx: &Context, resources: EnvoyResources) -> Revision {
        let config = ctx
            .store
            .create_config(DesiredConfig::desired(
                "default",
                "edge",
                DesiredConfigSpec {
                    node_id: "node1".into(),
                    resources,
                    ..Default::default()
                },
            ))
            .await
            .unwrap();
        let mut revision = ctx
            .store
            .create_revision(Revision::for_config(&config, "v1"))
            .await
            .unwrap();
        set_condition(
            &mut revision.status.conditions,
            Condition::new(REVISION_PUBLISHED, ConditionStatus::True, "InSync", ""),
        );
        ctx.store.update_revision_status(&revision).await.unwrap()
    }

    fn endpoints(raw: &str) -> EnvoyResources {
        EnvoyResources {
            endpoints: vec![EnvoyResource::new("e1", raw)],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_push_then_unchanged() {
        let f = fixture();
        let revision = published_revision(&f.ctx, endpoints(r#"{"cluster_name":"e1"}"#)).await;

        let first = reconcile_revision(&f.ctx, &revision.key()).await.unwrap();
        assert_eq!(first, RevisionOutcome::Pushed);
        assert_eq!(f.cache.get_snapshot("node1").unwrap().len(), 1);

        let stored = f.ctx.store.get_revision(&revision.key()).await.unwrap().unwrap();
        assert!(stored.status.published);
        assert!(stored.status.last_published_at.is_some());

        let second = reconcile_revision(&f.ctx, &revision.key()).await.unwrap();
        assert_eq!(second, RevisionOutcome::Unchanged);
        let again = f.ctx.store.get_revision(&revision.key()).await.unwrap().unwrap();
        assert_eq!(stored.metadata.resource_version, again.metadata.resource_version);
    }

    #[tokio::test]
    async fn test_malformed_resource_taints() {
        let f = fixture();
        let revision = published_revision(&f.ctx, endpoints("{not json")).await;

        let outcome = reconcile_revision(&f.ctx, &revision.key()).await.unwrap();
        assert_eq!(outcome, RevisionOutcome::Tainted);
        assert!(f.cache.get_snapshot("node1").is_none());

        let stored = f.ctx.store.get_revision(&revision.key()).await.unwrap().unwrap();
        assert!(stored.is_tainted());
        assert!(stored.status.tainted);
        assert!(!stored.status.published);
    }

    #[tokio::test]
    async fn test_unpublished_revision_is_idle() {
        let f = fixture();
        let config = f
            .ctx
            .store
            .create_config(DesiredConfig::desired("default", "edge", DesiredConfigSpec::default()))
            .await
            .unwrap();
        let revision = f
            .ctx
            .store
            .create_revision(Revision::for_config(&config, "v1"))
            .await
            .unwrap();

        let outcome = reconcile_revision(&f.ctx, &revision.key()).await.unwrap();
        assert_eq!(outcome, RevisionOutcome::Idle);
    }

    #[tokio::test]
    async fn test_missing_secret_is_retryable() {
        let f = fixture();
        let resources = EnvoyResources {
            secrets: vec![EnvoySecretResource::new("server-cert", "cert")],
            ..Default::default()
        };
        let revision = published_revision(&f.ctx, resources).await;

        let err = reconcile_revision(&f.ctx, &revision.key()).await.unwrap_err();
        assert!(err.is_retryable());

        f.secrets
            .put(ObjectKey::new("default", "cert"), SecretData::tls(b"crt", b"key"));
        let outcome = reconcile_revision(&f.ctx, &revision.key()).await.unwrap();
        assert_eq!(outcome, RevisionOutcome::Pushed);
        let snapshot = f.cache.get_snapshot("node1").unwrap();
        assert!(snapshot.version(ResourceType::Secret).starts_with("v1-"));
    }
}
