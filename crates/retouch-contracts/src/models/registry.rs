use std::fmt;

use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Takes an image plus instruction and returns an image.
    ImageEdit,
    Text,
    /// Accepts image input and answers in text.
    Vision,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ImageEdit => "image_edit",
            Self::Text => "text",
            Self::Vision => "vision",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<Capability>,
}

impl ModelSpec {
    pub fn new(name: &str, capabilities: &[Capability]) -> Self {
        Self {
            name: name.to_string(),
            provider: "gemini".to_string(),
            capabilities: capabilities.to_vec(),
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Known models in preference order; the first model supporting a
/// capability is that capability's default.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::from_specs([
            ModelSpec::new("gemini-2.5-flash-image", &[Capability::ImageEdit]),
            ModelSpec::new("gemini-2.5-flash-image-preview", &[Capability::ImageEdit]),
            ModelSpec::new("gemini-3-pro-image-preview", &[Capability::ImageEdit]),
            ModelSpec::new("gemini-2.5-flash", &[Capability::Text, Capability::Vision]),
            ModelSpec::new("gemini-2.5-pro", &[Capability::Text, Capability::Vision]),
            ModelSpec::new("gemini-2.0-flash-001", &[Capability::Text, Capability::Vision]),
        ])
    }
}

impl ModelRegistry {
    pub fn from_specs(specs: impl IntoIterator<Item = ModelSpec>) -> Self {
        Self {
            models: specs
                .into_iter()
                .map(|spec| (spec.name.clone(), spec))
                .collect(),
        }
    }

    /// Looks up `name`, accepting the provider's `models/` prefix.
    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name.trim().trim_start_matches("models/"))
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn default_for(&self, capability: Capability) -> Option<&ModelSpec> {
        self.models.values().find(|model| model.supports(capability))
    }
}
