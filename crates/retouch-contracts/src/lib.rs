pub mod artifact;
pub mod chat;
pub mod codec;
pub mod events;
pub mod history;
pub mod models;
pub mod request;
pub mod transcript;

pub use artifact::ImageArtifact;
pub use codec::{CodecError, EncodedImage};
pub use history::{HistoryEntry, HistoryLog};
pub use request::{AspectRatio, BackgroundColor, TransformKind, TransformationRequest};
pub use transcript::{Message, ProviderTurn, Role, Transcript};
