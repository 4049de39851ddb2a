//! Secret-change trigger: flags published revisions whose referenced secret
//! material changed so the Revision loop republishes them.

use crate::api::conditions::{set_condition, Condition, ConditionStatus, RESOURCES_OUT_OF_SYNC};
use crate::api::{ObjectKey, Revision};

use super::context::Context;
use super::error::ReconcileError;

/// Flags every published revision referencing the secret at `key`.
/// Returns the number of revisions flagged.
pub async fn on_secret_changed(ctx: &Context, key: &ObjectKey) -> Result<usize, ReconcileError> {
    let message = format!("secret {} changed", key);
    flag_matching(ctx, &message, |revision| {
        revision
            .spec
            .resources
            .references_secret(revision.namespace(), &key.namespace, &key.name)
    })
    .await
}

/// Flags every published revision that references any secret. Used when
/// individual secret notifications were lost.
pub async fn flag_all_secret_consumers(ctx: &Context) -> Result<usize, ReconcileError> {
    flag_matching(ctx, "secret notifications lagged", |revision| {
        !revision.spec.resources.secrets.is_empty()
    })
    .await
}

async fn flag_matching<F>(ctx: &Context, message: &str, matches: F) -> Result<usize, ReconcileError>
where
    F: Fn(&Revision) -> bool,
{
    let mut flagged = 0;
    for revision in ctx.store.list_published_revisions().await? {
        if revision.is_tainted() || !matches(&revision) {
            continue;
        }
        let mut next = revision.clone();
        let changed = set_condition(
            &mut next.status.conditions,
            Condition::new(RESOURCES_OUT_OF_SYNC, ConditionStatus::True, "SecretChanged", message),
        );
        if changed {
            ctx.store.update_revision_status(&next).await?;
            log::info!("Flagged revision {} out of sync: {}", revision.key(), message);
            flagged += 1;
        }
    }
    Ok(flagged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::api::conditions::REVISION_PUBLISHED;
    use crate::api::{DesiredConfig, DesiredConfigSpec, EnvoyResources, EnvoySecretResource};
    use crate::config::ControllerSpec;
    use crate::secrets::InMemorySecretStore;
    use crate::snapshot::InMemorySnapshotCache;
    use crate::store::{RecordStore, SqliteStore};

    async fn revision_with_secret(ctx: &Context, name: &str, secret: &str, published: bool) {
        let config = ctx
            .store
            .create_config(DesiredConfig::desired(
                "default",
                name,
                DesiredConfigSpec {
                    node_id: name.into(),
                    resources: EnvoyResources {
                        secrets: vec![EnvoySecretResource::new("server-cert", secret)],
                        ..Default::default()
                    },
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
            Condition::new(
                REVISION_PUBLISHED,
                ConditionStatus::from_bool(published),
                "InSync",
                "",
            ),
        );
        ctx.store.update_revision_status(&revision).await.unwrap();
    }

    fn context() -> Context {
        Context::new(
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            Arc::new(InMemorySnapshotCache::default()),
            Arc::new(InMemorySecretStore::default()),
            &ControllerSpec::default(),
        )
    }

    #[tokio::test]
    async fn test_flags_only_published_consumers() {
        let ctx = context();
        revision_with_secret(&ctx, "a", "cert", true).await;
        revision_with_secret(&ctx, "b", "cert", false).await;
        revision_with_secret(&ctx, "c", "other", true).await;

        let flagged = on_secret_changed(&ctx, &ObjectKey::new("default", "cert"))
            .await
            .unwrap();
        assert_eq!(flagged, 1);

        let a = ctx.store.find_revisions("a", "v1").await.unwrap().remove(0);
        assert!(a.resources_out_of_sync());
        let c = ctx.store.find_revisions("c", "v1").await.unwrap().remove(0);
        assert!(!c.resources_out_of_sync());

        // Already flagged
        let again = on_secret_changed(&ctx, &ObjectKey::new("default", "cert"))
            .await
            .unwrap();
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn test_other_namespace_is_ignored() {
        let ctx = context();
        revision_with_secret(&ctx, "a", "cert", true).await;
        let flagged = on_secret_changed(&ctx, &ObjectKey::new("infra", "cert"))
            .await
            .unwrap();
        assert_eq!(flagged, 0);
    }

    #[tokio::test]
    async fn test_flag_all_consumers() {
        let ctx = context();
        revision_with_secret(&ctx, "a", "cert", true).await;
        revision_with_secret(&ctx, "c", "other", true).await;
        assert_eq!(flag_all_secret_consumers(&ctx).await.unwrap(), 2);
    }
}
