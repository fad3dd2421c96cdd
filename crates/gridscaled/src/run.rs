//! The polling control loop: observe, decide, act, sleep.
//!
//! One logical thread of control. Each cycle verifies the app still exists,
//! snapshots its instance count, reads the metric, runs the decision engine
//! and applies a positive decision, then sleeps for the poll interval. The
//! skip routes (app missing, no task data, metric unavailable) go straight
//! to the sleep with the hysteresis state untouched.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, warn};

use gridscale_client::RemoteClient;
use gridscale_engine::{self as engine, Band, HysteresisState, ScaleDecision, ScalePolicy};
use gridscale_metrics::{MetricSource, METRIC_UNAVAILABLE};

/// Run until shutdown is signalled or a fatal client error propagates.
pub async fn control_loop(
    client: &mut RemoteClient,
    source: &dyn MetricSource,
    app_id: &str,
    band: &Band,
    policy: &ScalePolicy,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut state = HysteresisState::default();
    let mut first_cycle = true;

    loop {
        state = cycle(client, source, app_id, band, policy, first_cycle, state).await?;
        first_cycle = false;

        tokio::select! {
            _ = sleep(interval) => {}
            _ = shutdown.changed() => {
                info!("shutdown requested, leaving control loop");
                return Ok(());
            }
        }
    }
}

/// What the app-listing check allows a cycle to do.
#[derive(Debug, PartialEq, Eq)]
enum Gate {
    Proceed,
    Skip,
    Fatal,
}

/// Fatal only when the very first listing is empty; a later empty listing
/// degrades to the app-absent skip path.
fn listing_gate(app_id: &str, apps: &[String], first_cycle: bool) -> Gate {
    if apps.is_empty() && first_cycle {
        return Gate::Fatal;
    }
    if apps.iter().any(|a| a == app_id) {
        Gate::Proceed
    } else {
        Gate::Skip
    }
}

/// True when a reading must bypass the decision engine entirely.
fn metric_unavailable(value: f64) -> bool {
    value == METRIC_UNAVAILABLE
}

/// One observe-decide-act pass. Returns the hysteresis state to carry into
/// the next cycle; skipped cycles return it unchanged.
async fn cycle(
    client: &mut RemoteClient,
    source: &dyn MetricSource,
    app_id: &str,
    band: &Band,
    policy: &ScalePolicy,
    first_cycle: bool,
    state: HysteresisState,
) -> anyhow::Result<HysteresisState> {
    let apps = client.list_apps().await?;
    match listing_gate(app_id, &apps, first_cycle) {
        Gate::Fatal => anyhow::bail!("control plane reported no apps at all"),
        Gate::Skip => {
            warn!(app = app_id, "app not present in the control-plane listing, skipping cycle");
            return Ok(state);
        }
        Gate::Proceed => {}
    }

    let Some(snapshot) = client.app_snapshot(app_id).await? else {
        // No task data; the parser already logged it.
        return Ok(state);
    };

    let value = source.value(client, &snapshot).await?;
    if metric_unavailable(value) {
        warn!(app = app_id, trigger = source.name(), "metric unavailable, skipping cycle");
        return Ok(state);
    }

    let (decision, next) = engine::evaluate(band, value, state);
    info!(
        app = app_id,
        trigger = source.name(),
        value,
        instances = snapshot.instances,
        scale_up_streak = next.scale_up,
        cool_down_streak = next.cool_down,
        ?decision,
        "cycle evaluated"
    );

    if decision != ScaleDecision::NoAction {
        engine::apply(client, app_id, policy, decision, snapshot.instances).await?;
    }

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apps(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_first_listing_is_fatal() {
        assert_eq!(listing_gate("shop-api", &[], true), Gate::Fatal);
    }

    #[test]
    fn later_empty_listing_only_skips() {
        assert_eq!(listing_gate("shop-api", &[], false), Gate::Skip);
    }

    #[test]
    fn absent_app_skips_the_cycle() {
        assert_eq!(
            listing_gate("shop-api", &apps(&["billing", "mailer"]), false),
            Gate::Skip
        );
    }

    #[test]
    fn present_app_proceeds() {
        assert_eq!(
            listing_gate("shop-api", &apps(&["billing", "shop-api"]), true),
            Gate::Proceed
        );
    }

    #[test]
    fn sentinel_bypasses_the_decision_engine() {
        assert!(metric_unavailable(METRIC_UNAVAILABLE));
        assert!(!metric_unavailable(0.0));
        assert!(!metric_unavailable(95.0));
    }
}
