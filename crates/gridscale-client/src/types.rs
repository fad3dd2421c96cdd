//! Wire types for the control plane's app descriptors.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

/// One running task of an app.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskRef {
    pub id: String,
    #[serde(default)]
    pub host: String,
    #[serde(rename = "agentId", default)]
    pub agent_id: String,
}

/// Point-in-time view of one app.
///
/// Fetched fresh every cycle and never cached across cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSnapshot {
    pub id: String,
    pub instances: u32,
    pub tasks: Vec<TaskRef>,
}

#[derive(Deserialize)]
struct AppsListing {
    #[serde(default)]
    apps: Vec<AppEntry>,
}

#[derive(Deserialize)]
struct AppEntry {
    id: String,
}

#[derive(Deserialize)]
struct AppDescriptor {
    app: AppBody,
}

#[derive(Deserialize)]
struct AppBody {
    #[serde(default)]
    instances: u32,
    #[serde(default)]
    tasks: Vec<TaskRef>,
}

/// App ids in an apps-collection payload; an absent or empty list is empty.
pub fn app_ids(value: &Value) -> Vec<String> {
    match serde_json::from_value::<AppsListing>(value.clone()) {
        Ok(listing) => listing.apps.into_iter().map(|a| a.id).collect(),
        Err(e) => {
            error!(error = %e, "malformed apps listing");
            Vec::new()
        }
    }
}

/// Snapshot from an app-descriptor payload.
///
/// `None` when the descriptor has no task data; callers treat that as a
/// skipped cycle.
pub fn snapshot(app_id: &str, value: &Value) -> Option<AppSnapshot> {
    let descriptor: AppDescriptor = match serde_json::from_value(value.clone()) {
        Ok(d) => d,
        Err(e) => {
            error!(app = app_id, error = %e, "malformed app descriptor");
            return None;
        }
    };

    if descriptor.app.tasks.is_empty() {
        error!(app = app_id, "no task data for app");
        return None;
    }

    for task in &descriptor.app.tasks {
        debug!(
            app = app_id,
            task = %task.id,
            host = %task.host,
            agent = %task.agent_id,
            "task placement"
        );
    }

    Some(AppSnapshot {
        id: app_id.to_string(),
        instances: descriptor.app.instances,
        tasks: descriptor.app.tasks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn app_ids_from_listing() {
        let payload = json!({
            "apps": [
                {"id": "shop-api", "instances": 4},
                {"id": "billing", "instances": 2},
            ]
        });
        assert_eq!(app_ids(&payload), vec!["shop-api", "billing"]);
    }

    #[test]
    fn missing_apps_array_is_empty() {
        assert!(app_ids(&json!({})).is_empty());
        assert!(app_ids(&json!({"apps": []})).is_empty());
    }

    #[test]
    fn malformed_listing_is_empty() {
        assert!(app_ids(&json!({"apps": "nope"})).is_empty());
    }

    #[test]
    fn snapshot_with_tasks() {
        let payload = json!({
            "app": {
                "instances": 4,
                "tasks": [
                    {"id": "shop-api.1", "host": "10.0.0.4", "agentId": "agent-a"},
                    {"id": "shop-api.2", "host": "10.0.0.5", "agentId": "agent-b"},
                ]
            }
        });
        let snap = snapshot("shop-api", &payload).unwrap();
        assert_eq!(snap.id, "shop-api");
        assert_eq!(snap.instances, 4);
        assert_eq!(snap.tasks.len(), 2);
        assert_eq!(snap.tasks[0].agent_id, "agent-a");
    }

    #[test]
    fn snapshot_without_tasks_is_none() {
        let payload = json!({"app": {"instances": 4, "tasks": []}});
        assert!(snapshot("shop-api", &payload).is_none());

        let payload = json!({"app": {"instances": 4}});
        assert!(snapshot("shop-api", &payload).is_none());
    }

    #[test]
    fn snapshot_from_malformed_descriptor_is_none() {
        assert!(snapshot("shop-api", &json!({})).is_none());
        assert!(snapshot("shop-api", &json!({"app": []})).is_none());
    }
}
