//! Identity of the caller, as resolved upstream by the auth layer.

use serde::{Deserialize, Serialize};

/// Which controller variant serves a request.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Privileged,
    Public,
}

/// An authenticated caller.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
}

/// Per-request caller context passed explicitly through controllers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub role: ActorRole,
    pub actor: Option<Actor>,
}

impl RequestContext {
    pub fn privileged(actor: Actor) -> Self {
        Self {
            role: ActorRole::Privileged,
            actor: Some(actor),
        }
    }

    pub fn public(actor: Option<Actor>) -> Self {
        Self {
            role: ActorRole::Public,
            actor,
        }
    }

    pub fn is_privileged(&self) -> bool {
        self.role == ActorRole::Privileged
    }
}
