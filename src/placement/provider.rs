//! Model lookup for object types

use std::collections::HashMap;
use std::future::Future;

use super::request::ObjectBounds;
use crate::core::types::Result;

/// A resolved model for one object type
#[derive(Clone, Debug, PartialEq)]
pub struct ModelHandle {
    pub id: u64,
    pub name: String,
    /// Model bounds; replace the request's bounds when present
    pub bounds: Option<ObjectBounds>,
}

/// Resolves object types to models, possibly over the network
pub trait ModelProvider: Send + Sync {
    fn model_for(&self, object_type: &str, description: &str) -> impl Future<Output = Result<ModelHandle>> + Send;
}

/// In-memory provider keyed by exact object type
#[derive(Clone, Debug, Default)]
pub struct StaticModelProvider {
    models: HashMap<String, ModelHandle>,
}

impl StaticModelProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, object_type: impl Into<String>, handle: ModelHandle) -> Self {
        self.models.insert(object_type.into(), handle);
        self
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl ModelProvider for StaticModelProvider {
    async fn model_for(&self, object_type: &str, _description: &str) -> Result<ModelHandle> {
        self.models.get(object_type).cloned().ok_or_else(|| crate::core::Error::ProviderFailure {
            object_type: object_type.to_string(),
            reason: "no model registered".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec3;

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticModelProvider::new().with_model(
            "house",
            ModelHandle {
                id: 4,
                name: "house_a".into(),
                bounds: Some(ObjectBounds::new(Vec3::new(3.0, 2.0, 3.0))),
            },
        );
        assert_eq!(provider.len(), 1);
        let handle = provider.model_for("house", "red roof").await.unwrap();
        assert_eq!(handle.id, 4);
        assert!(provider.model_for("castle", "").await.is_err());
    }
}
