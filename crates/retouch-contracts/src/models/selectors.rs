use thiserror::Error;

use super::registry::{Capability, ModelRegistry, ModelSpec};

/// Why the selected model differs from the one asked for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fallback {
    #[error("no model configured; using default")]
    Unrequested,
    #[error("unknown model '{0}'")]
    Unknown(String),
    #[error("model '{name}' does not support {capability}")]
    Unsupported { name: String, capability: Capability },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no models available for {0}")]
pub struct NoModelFor(pub Capability);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub fallback: Option<Fallback>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: ModelRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Picks `requested` when it is registered and supports `capability`,
    /// otherwise the capability's default along with the reason.
    pub fn select(
        &self,
        requested: Option<&str>,
        capability: Capability,
    ) -> Result<ModelSelection, NoModelFor> {
        let fallback = match requested.map(|name| (name, self.registry.get(name))) {
            Some((_, Some(model))) if model.supports(capability) => {
                return Ok(ModelSelection {
                    model: model.clone(),
                    fallback: None,
                });
            }
            Some((name, Some(_))) => Fallback::Unsupported {
                name: name.trim().to_string(),
                capability,
            },
            Some((name, None)) => Fallback::Unknown(name.trim().to_string()),
            None => Fallback::Unrequested,
        };

        let model = self
            .registry
            .default_for(capability)
            .cloned()
            .ok_or(NoModelFor(capability))?;
        Ok(ModelSelection {
            model,
            fallback: Some(fallback),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capable_request_is_kept() {
        let selection = ModelSelector::default()
            .select(Some("models/gemini-3-pro-image-preview"), Capability::ImageEdit)
            .unwrap();
        assert_eq!(selection.model.name, "gemini-3-pro-image-preview");
        assert_eq!(selection.fallback, None);
    }

    #[test]
    fn text_model_asked_to_edit_falls_back() {
        let selection = ModelSelector::default()
            .select(Some("gemini-2.5-pro"), Capability::ImageEdit)
            .unwrap();
        assert_eq!(selection.model.name, "gemini-2.5-flash-image");
        assert_eq!(
            selection.fallback.map(|reason| reason.to_string()).as_deref(),
            Some("model 'gemini-2.5-pro' does not support image_edit")
        );
    }

    #[test]
    fn unknown_and_missing_requests_explain_fallback() {
        let selector = ModelSelector::default();
        let unknown = selector.select(Some("imaginary"), Capability::Vision).unwrap();
        assert_eq!(unknown.model.name, "gemini-2.5-flash");
        assert_eq!(unknown.fallback, Some(Fallback::Unknown("imaginary".to_string())));

        let missing = selector.select(None, Capability::Text).unwrap();
        assert_eq!(missing.fallback, Some(Fallback::Unrequested));
    }

    #[test]
    fn empty_capability_is_an_error() {
        let selector = ModelSelector::new(ModelRegistry::from_specs([ModelSpec::new(
            "edit-only",
            &[Capability::ImageEdit],
        )]));
        let err = selector.select(Some("edit-only"), Capability::Text).unwrap_err();
        assert_eq!(err, NoModelFor(Capability::Text));
        assert_eq!(err.to_string(), "no models available for text");
    }
}
