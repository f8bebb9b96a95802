use serde::{Deserialize, Serialize};

use crate::types::ContainerHealthStatus;

/// Server-to-client messages that carry no reply (spec §4.6, §6.1).
/// Notifications referencing a single entry are never reordered relative
/// to each other, though the dispatcher may coalesce distinct ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notification {
    ApplicationServiceTerminated {
        parent_id: String,
        app_service_id: String,
        exit_code: i32,
    },
    ContainerHealthStatusChange {
        node_id: String,
        statuses: Vec<ContainerHealthStatus>,
    },
    ContainerEngineTerminated {
        node_id: String,
    },
    DockerProcessTerminated {
        app_service_id: String,
        exit_code: i32,
    },
    OverlayNetworkRoutePublish {
        node_id: String,
        routes: Vec<String>,
    },
    NodeEnabled,
    NodeDisabled,
}
