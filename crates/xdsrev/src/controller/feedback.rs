//! Proxy rejection feedback.

use crate::api::conditions::{
    set_condition, Condition, ConditionStatus, CONFIG_FAILED, REVISION_TAINTED,
};

use super::context::Context;
use super::error::ReconcileError;

const REASON_PROXY_REJECTED: &str = "ProxyRejected";

/// Records that the proxy `node_id` rejected the configuration it was sent.
///
/// Sets `ConfigFailed` on the node's single DesiredConfig. With
/// `taint_on_rejection` the published revision is tainted as well, which
/// makes the DesiredConfig loop roll back as it does after a load failure.
pub async fn on_node_rejected(ctx: &Context, node_id: &str) -> Result<(), ReconcileError> {
    let mut configs = ctx.store.list_configs_for_node(node_id).await?;
    let config = match configs.len() {
        0 => {
            return Err(ReconcileError::ConfigNotFound {
                node_id: node_id.to_string(),
            })
        }
        1 => configs.remove(0),
        count => {
            return Err(ReconcileError::MultipleConfigsForNode {
                node_id: node_id.to_string(),
                count,
            })
        }
    };

    let published = config.status.published_version.clone();
    let message = match &published {
        Some(version) => format!("proxy rejected version {}", version),
        None => "proxy rejected its configuration".to_string(),
    };
    log::warn!("Node {} rejected its configuration: {}", node_id, message);

    let mut next = config.clone();
    if set_condition(
        &mut next.status.conditions,
        Condition::new(CONFIG_FAILED, ConditionStatus::True, REASON_PROXY_REJECTED, &message),
    ) {
        ctx.store.update_config_status(&next).await?;
    }

    if !ctx.taint_on_rejection {
        return Ok(());
    }
    let Some(version) = published else {
        return Ok(());
    };
    for revision in ctx.store.find_revisions(node_id, &version).await? {
        if revision.is_tainted() {
            continue;
        }
        let mut tainted = revision.clone();
        set_condition(
            &mut tainted.status.conditions,
            Condition::new(REVISION_TAINTED, ConditionStatus::True, REASON_PROXY_REJECTED, &message),
        );
        tainted.status.tainted = true;
        ctx.store.update_revision_status(&tainted).await?;
        log::info!("Tainted revision {} after rejection by node {}", revision.key(), node_id);
    }
    Ok(())
}
