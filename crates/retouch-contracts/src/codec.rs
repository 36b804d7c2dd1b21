//! Transfer codec between [`ImageArtifact`] and the base64 payload the
//! generative service speaks.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::artifact::ImageArtifact;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("image payload is not valid base64: {0}")]
    InvalidBase64(String),
    #[error("not a base64 data url")]
    InvalidDataUrl,
}

/// Base64 payload plus declared media type, as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    pub data: String,
    #[serde(rename = "mimeType")]
    pub media_type: String,
}

pub fn encode(artifact: &ImageArtifact) -> EncodedImage {
    EncodedImage {
        data: BASE64.encode(artifact.bytes()),
        media_type: artifact.media_type().to_string(),
    }
}

pub fn decode(encoded: &EncodedImage) -> Result<ImageArtifact, CodecError> {
    let bytes = BASE64
        .decode(encoded.data.trim().as_bytes())
        .map_err(|err| CodecError::InvalidBase64(err.to_string()))?;
    Ok(ImageArtifact::new(bytes, encoded.media_type.as_str()))
}

pub fn to_data_url(artifact: &ImageArtifact) -> String {
    let encoded = encode(artifact);
    format!("data:{};base64,{}", encoded.media_type, encoded.data)
}

pub fn parse_data_url(raw: &str) -> Result<EncodedImage, CodecError> {
    let rest = raw
        .trim()
        .strip_prefix("data:")
        .ok_or(CodecError::InvalidDataUrl)?;
    let (header, data) = rest.split_once(',').ok_or(CodecError::InvalidDataUrl)?;
    let media_type = header
        .strip_suffix(";base64")
        .ok_or(CodecError::InvalidDataUrl)?;
    Ok(EncodedImage {
        data: data.to_string(),
        media_type: media_type.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn decode_restores_payload_and_media_type() -> anyhow::Result<()> {
        let artifact = ImageArtifact::new(vec![0u8, 255, 16, 42, 7], "image/webp");
        let encoded = encode(&artifact);
        assert_eq!(encoded.media_type, "image/webp");
        assert_eq!(decode(&encoded)?, artifact);
        Ok(())
    }

    #[test]
    fn encoded_image_serializes_with_wire_field_names() -> anyhow::Result<()> {
        let encoded = encode(&ImageArtifact::new(b"hi".to_vec(), "image/png"));
        let value = serde_json::to_value(&encoded)?;
        assert_eq!(
            value,
            serde_json::json!({ "data": "aGk=", "mimeType": "image/png" })
        );
        Ok(())
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode(&EncodedImage {
            data: "@@not base64@@".to_string(),
            media_type: "image/png".to_string(),
        });
        assert!(matches!(err, Err(CodecError::InvalidBase64(_))));
    }

    #[test]
    fn data_url_parses_back_into_encoded_image() -> anyhow::Result<()> {
        let artifact = ImageArtifact::new(b"jpeg-bytes".to_vec(), "image/jpeg");
        let url = to_data_url(&artifact);
        assert!(url.starts_with("data:image/jpeg;base64,"));
        let parsed = parse_data_url(&url)?;
        assert_eq!(decode(&parsed)?, artifact);
        Ok(())
    }

    #[test]
    fn data_url_requires_base64_marker() {
        assert_eq!(
            parse_data_url("data:image/png,abc"),
            Err(CodecError::InvalidDataUrl)
        );
        assert_eq!(parse_data_url("abc"), Err(CodecError::InvalidDataUrl));
    }

    proptest! {
        #[test]
        fn any_payload_survives_encode_and_decode(
            bytes in proptest::collection::vec(any::<u8>(), 0..512),
            media_type in any::<String>(),
        ) {
            let artifact = ImageArtifact::new(bytes, media_type.as_str());
            let decoded = decode(&encode(&artifact));
            prop_assert_eq!(decoded, Ok(artifact));
        }

        #[test]
        fn any_payload_survives_a_data_url(
            bytes in proptest::collection::vec(any::<u8>(), 0..256),
            media_type in "[a-z]{1,8}/[a-z0-9.+-]{1,12}",
        ) {
            let artifact = ImageArtifact::new(bytes, media_type.as_str());
            let parsed = parse_data_url(&to_data_url(&artifact));
            let parsed_type = parsed.as_ref().map(|encoded| encoded.media_type.as_str());
            prop_assert_eq!(parsed_type, Ok(media_type.as_str()));
            let restored = parsed.and_then(|encoded| decode(&encoded));
            prop_assert_eq!(restored, Ok(artifact));
        }
    }
}
