//! Scaling executor — turns a decision into a target instance count and the
//! mutating control-plane call.

use tracing::{debug, info, warn};

use gridscale_client::{ClientResult, RemoteClient};

use crate::hysteresis::ScaleDecision;

/// Instance-count arithmetic for one app.
#[derive(Debug, Clone, Copy)]
pub struct ScalePolicy {
    /// Ratio applied to the current instance count per action.
    pub multiplier: f64,
    /// Lower clamp for scale-down targets.
    pub min_instances: u32,
    /// Upper clamp for scale-up targets.
    pub max_instances: u32,
}

/// Candidate target for a decision, clamped to the policy bounds.
///
/// Instance counts stay integral: scale-up rounds the product up, scale-down
/// rounds the quotient down.
pub fn target_instances(policy: &ScalePolicy, decision: ScaleDecision, current: u32) -> u32 {
    match decision {
        ScaleDecision::NoAction => current,
        ScaleDecision::ScaleUp => {
            let desired = (f64::from(current) * policy.multiplier).ceil() as u32;
            if desired > policy.max_instances {
                warn!(
                    desired,
                    max = policy.max_instances,
                    "scale-up target clamped to maximum"
                );
                policy.max_instances
            } else {
                desired
            }
        }
        ScaleDecision::ScaleDown => {
            let desired = (f64::from(current) / policy.multiplier).floor() as u32;
            if desired < policy.min_instances {
                warn!(
                    desired,
                    min = policy.min_instances,
                    "scale-down target clamped to minimum"
                );
                policy.min_instances
            } else {
                desired
            }
        }
    }
}

/// Apply a decision, issuing the scale call only when the target differs
/// from the current count. Returns whether a call was issued.
///
/// Already sitting at a clamp boundary legitimately produces a no-op.
pub async fn apply(
    client: &mut RemoteClient,
    app_id: &str,
    policy: &ScalePolicy,
    decision: ScaleDecision,
    current: u32,
) -> ClientResult<bool> {
    let target = target_instances(policy, decision, current);
    if target == current {
        debug!(app = app_id, current, "target equals current instance count");
        return Ok(false);
    }

    info!(
        app = app_id,
        from = current,
        to = target,
        ?decision,
        "scaling app"
    );
    client.scale_app(app_id, target).await?;
    Ok(true)
}
