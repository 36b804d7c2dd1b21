//! Transformation client: one request per operation kind, each mapping a
//! source artifact plus an instruction to exactly one service call.

use std::sync::Arc;

use retouch_contracts::{
    codec, AspectRatio, BackgroundColor, ImageArtifact, ProviderTurn, TransformKind,
    TransformationRequest,
};

use crate::service::{error_chain_text, ChatRequest, ContentRequest, GenerativeService};

/// Media type assumed for returned images that do not declare one.
pub const FALLBACK_MEDIA_TYPE: &str = "image/jpeg";

pub const ANALYZE_INSTRUCTION: &str = "Analyze this image. Identify the main subject, the background context, and suggest the best background color for a professional ID photo based on the subject's clothing.";
pub const ENHANCE_INSTRUCTION: &str = "Enhance this image to high definition. Improve clarity, sharpness, and lighting while preserving the original details and identity of the subject exactly. Do not alter facial features.";
pub const PASSPORT_INSTRUCTION: &str = "Transform this into a professional passport photo. Crop to a standard head-and-shoulders shot. Change background to solid white. Ensure the subject is centered, facing forward, and lighting is even. Keep the person's identity exactly the same.";

const ERROR_DETAIL_MAX_CHARS: usize = 400;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("no usable content: {0}")]
    NoContent(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl TransformError {
    fn from_service(err: anyhow::Error) -> Self {
        Self::ServiceUnavailable(error_chain_text(&err, ERROR_DETAIL_MAX_CHARS))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutput {
    Image(ImageArtifact),
    Analysis(String),
}

pub fn background_instruction(color: &BackgroundColor) -> String {
    format!(
        "Replace the background of this image with a solid {} color. Keep the main subject exactly as is. Ensure clean edges.",
        color.name().trim()
    )
}

/// Natural-language instruction sent for `request`.
pub fn instruction_for(request: &TransformationRequest) -> String {
    match request {
        TransformationRequest::BackgroundReplace { color } => background_instruction(color),
        TransformationRequest::FreeformEdit { prompt, .. } => prompt.trim().to_string(),
        TransformationRequest::Enhance => ENHANCE_INSTRUCTION.to_string(),
        TransformationRequest::PassportNormalize => PASSPORT_INSTRUCTION.to_string(),
        TransformationRequest::Analyze => ANALYZE_INSTRUCTION.to_string(),
    }
}

/// Stateless request mapper for image operations. Image-producing kinds use
/// the image model; analysis uses the text model.
pub struct TransformClient {
    service: Arc<dyn GenerativeService>,
    image_model: String,
    text_model: String,
}

impl TransformClient {
    pub fn new(
        service: Arc<dyn GenerativeService>,
        image_model: impl Into<String>,
        text_model: impl Into<String>,
    ) -> Self {
        Self {
            service,
            image_model: image_model.into(),
            text_model: text_model.into(),
        }
    }

    pub fn image_model(&self) -> &str {
        self.image_model.as_str()
    }

    pub fn text_model(&self) -> &str {
        self.text_model.as_str()
    }

    pub fn execute(
        &self,
        request: &TransformationRequest,
        source: &ImageArtifact,
    ) -> Result<TransformOutput, TransformError> {
        request.validate().map_err(TransformError::InvalidInput)?;
        match request.kind() {
            TransformKind::Analyze => self.analyze(source).map(TransformOutput::Analysis),
            _ => self
                .request_image(source, instruction_for(request), request.aspect_ratio())
                .map(TransformOutput::Image),
        }
    }

    pub fn replace_background(
        &self,
        source: &ImageArtifact,
        color: &BackgroundColor,
    ) -> Result<ImageArtifact, TransformError> {
        self.expect_image(TransformationRequest::background(color.clone()), source)
    }

    pub fn edit_with_prompt(
        &self,
        source: &ImageArtifact,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<ImageArtifact, TransformError> {
        self.expect_image(TransformationRequest::edit(prompt, aspect_ratio), source)
    }

    pub fn enhance(&self, source: &ImageArtifact) -> Result<ImageArtifact, TransformError> {
        self.expect_image(TransformationRequest::Enhance, source)
    }

    pub fn create_passport_photo(
        &self,
        source: &ImageArtifact,
    ) -> Result<ImageArtifact, TransformError> {
        self.expect_image(TransformationRequest::PassportNormalize, source)
    }

    pub fn analyze(&self, source: &ImageArtifact) -> Result<String, TransformError> {
        let request = ContentRequest {
            model: self.text_model.clone(),
            inline_image: Some(codec::encode(source)),
            instruction: ANALYZE_INSTRUCTION.to_string(),
            aspect_ratio: None,
        };
        let reply = self
            .service
            .generate(&request)
            .map_err(TransformError::from_service)?;
        reply
            .text()
            .ok_or_else(|| TransformError::NoContent("analysis reply contained no text".to_string()))
    }

    fn expect_image(
        &self,
        request: TransformationRequest,
        source: &ImageArtifact,
    ) -> Result<ImageArtifact, TransformError> {
        match self.execute(&request, source)? {
            TransformOutput::Image(image) => Ok(image),
            TransformOutput::Analysis(_) => Err(TransformError::NoContent(
                "expected an image reply".to_string(),
            )),
        }
    }

    fn request_image(
        &self,
        source: &ImageArtifact,
        instruction: String,
        aspect_ratio: Option<AspectRatio>,
    ) -> Result<ImageArtifact, TransformError> {
        let request = ContentRequest {
            model: self.image_model.clone(),
            inline_image: Some(codec::encode(source)),
            instruction,
            aspect_ratio,
        };
        let reply = self
            .service
            .generate(&request)
            .map_err(TransformError::from_service)?;
        let Some(encoded) = reply.first_image() else {
            return Err(TransformError::NoContent("No image generated.".to_string()));
        };
        let mut encoded = encoded.clone();
        if encoded.media_type.trim().is_empty() {
            encoded.media_type = FALLBACK_MEDIA_TYPE.to_string();
        }
        codec::decode(&encoded)
            .map_err(|err| TransformError::NoContent(format!("undecodable image payload: {err}")))
    }
}

/// Conversational counterpart of [`TransformClient`].
pub struct ChatClient {
    service: Arc<dyn GenerativeService>,
    model: String,
}

impl ChatClient {
    pub fn new(service: Arc<dyn GenerativeService>, model: impl Into<String>) -> Self {
        Self {
            service,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        self.model.as_str()
    }

    pub fn reply(
        &self,
        system_instruction: Option<&str>,
        history: &[ProviderTurn],
        message: &str,
    ) -> Result<String, TransformError> {
        if message.trim().is_empty() {
            return Err(TransformError::InvalidInput("message is empty".to_string()));
        }
        let request = ChatRequest {
            model: self.model.clone(),
            system_instruction: system_instruction.map(str::to_string),
            history: history.to_vec(),
            message: message.to_string(),
        };
        let reply = self
            .service
            .chat(&request)
            .map_err(TransformError::from_service)?;
        reply
            .text()
            .ok_or_else(|| TransformError::NoContent("chat reply contained no text".to_string()))
    }
}
