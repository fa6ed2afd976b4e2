use serde::{Deserialize, Serialize};

/// Static description of a selectable model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// The identifier sent to the API.
    pub id: String,

    /// Human-readable model name.
    pub display_name: String,

    /// Largest `max_tokens` the model accepts for one response.
    pub token_ceiling: u32,

    /// The organization that trained the model.
    pub vendor: String,
}

impl ModelDescriptor {
    /// Create a new `ModelDescriptor`.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        token_ceiling: u32,
        vendor: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            token_ceiling,
            vendor: vendor.into(),
        }
    }

    /// The label shown in model pickers, e.g. `LLaMA3-8b-8192 (Meta)`.
    pub fn label(&self) -> String {
        format!("{} ({})", self.display_name, self.vendor)
    }
}
