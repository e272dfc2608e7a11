//! Seam between the search side and whoever owns the current model selection.

/// Source of the currently selected model id.
pub trait ModelSelection: Send + Sync {
    fn current_model_id(&self) -> String;
}

/// A selection that never changes. Handy for hosts without a lifecycle manager.
#[derive(Debug, Clone)]
pub struct FixedModel(pub String);

impl ModelSelection for FixedModel {
    fn current_model_id(&self) -> String {
        self.0.clone()
    }
}
