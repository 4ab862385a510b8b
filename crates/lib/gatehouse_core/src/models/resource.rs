//! Access request evaluated by the scope authorizer.

use serde::{Deserialize, Serialize};

/// What a caller wants to do, to what, and on whose behalf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub application_id: String,
    pub action: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Owner of the resource, if it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Opaque request value echoed back in denials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl Resource {
    pub fn new(
        application_id: impl Into<String>,
        action: impl Into<String>,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            application_id: application_id.into(),
            action: action.into(),
            resource_type: resource_type.into(),
            owner: None,
            value: None,
        }
    }

    /// Set the resource owner.
    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Owner id, treating an empty string as absent.
    pub fn owner_id(&self) -> Option<&str> {
        self.owner.as_deref().filter(|o| !o.is_empty())
    }
}
