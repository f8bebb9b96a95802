use serde::{Deserialize, Serialize};

use crate::types::WireErrorKind;

/// Reply payloads, one per `Request` variant (spec §6.1). Produced on
/// operation completion, not on dispatch, for async operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    Register {
        error: Option<WireErrorKind>,
    },
    Unregister {
        error: Option<WireErrorKind>,
    },
    ActivateProcess {
        error: Option<WireErrorKind>,
        process_id: Option<i32>,
    },
    DeactivateProcess {
        error: Option<WireErrorKind>,
    },
    TerminateProcess {
        error: Option<WireErrorKind>,
    },
    ActivateHostedService {
        error: Option<WireErrorKind>,
    },
    DeactivateHostedService {
        error: Option<WireErrorKind>,
    },
    GetContainerInfo {
        error: Option<WireErrorKind>,
        info: Option<String>,
    },
    CollaboratorRequest {
        error: Option<WireErrorKind>,
        payload: Option<Vec<u8>>,
    },
}

impl Reply {
    pub fn ok(&self) -> bool {
        self.error().is_none()
    }

    pub fn error(&self) -> Option<WireErrorKind> {
        match self {
            Reply::Register { error }
            | Reply::Unregister { error }
            | Reply::DeactivateProcess { error }
            | Reply::TerminateProcess { error }
            | Reply::ActivateHostedService { error }
            | Reply::DeactivateHostedService { error }
            | Reply::ActivateProcess { error, .. }
            | Reply::GetContainerInfo { error, .. }
            | Reply::CollaboratorRequest { error, .. } => *error,
        }
    }
}
