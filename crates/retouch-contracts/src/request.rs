use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Operation kind without its parameters; what a session reports while busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    BackgroundReplace,
    FreeformEdit,
    Enhance,
    PassportNormalize,
    Analyze,
}

impl TransformKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BackgroundReplace => "background_replace",
            Self::FreeformEdit => "freeform_edit",
            Self::Enhance => "enhance",
            Self::PassportNormalize => "passport_normalize",
            Self::Analyze => "analyze",
        }
    }

    /// Whether a successful run replaces the session's current image.
    pub fn produces_image(self) -> bool {
        !matches!(self, Self::Analyze)
    }

    pub fn failure_message(self) -> &'static str {
        match self {
            Self::BackgroundReplace => "Failed to update background.",
            Self::FreeformEdit => "Failed to edit image.",
            Self::Enhance => "Failed to enhance image.",
            Self::PassportNormalize => "Failed to create passport photo.",
            Self::Analyze => "Failed to analyze image.",
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformationRequest {
    BackgroundReplace {
        color: BackgroundColor,
    },
    FreeformEdit {
        prompt: String,
        aspect_ratio: AspectRatio,
    },
    Enhance,
    PassportNormalize,
    Analyze,
}

impl TransformationRequest {
    pub fn background(color: BackgroundColor) -> Self {
        Self::BackgroundReplace { color }
    }

    pub fn edit(prompt: impl Into<String>, aspect_ratio: AspectRatio) -> Self {
        Self::FreeformEdit {
            prompt: prompt.into(),
            aspect_ratio,
        }
    }

    pub fn kind(&self) -> TransformKind {
        match self {
            Self::BackgroundReplace { .. } => TransformKind::BackgroundReplace,
            Self::FreeformEdit { .. } => TransformKind::FreeformEdit,
            Self::Enhance => TransformKind::Enhance,
            Self::PassportNormalize => TransformKind::PassportNormalize,
            Self::Analyze => TransformKind::Analyze,
        }
    }

    /// Aspect ratio sent with the request; `None` for kinds that ignore it.
    pub fn aspect_ratio(&self) -> Option<AspectRatio> {
        match self {
            Self::FreeformEdit { aspect_ratio, .. } => Some(*aspect_ratio),
            Self::Enhance => Some(AspectRatio::Square),
            Self::PassportNormalize => Some(AspectRatio::Portrait3x4),
            Self::BackgroundReplace { .. } | Self::Analyze => None,
        }
    }

    /// Rejects requests that must never reach the service.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::FreeformEdit { prompt, .. } if prompt.trim().is_empty() => {
                Err("edit prompt is empty".to_string())
            }
            Self::BackgroundReplace { color } if color.name().trim().is_empty() => {
                Err("background color is empty".to_string())
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackgroundColor {
    White,
    Blue,
    Red,
    Black,
    Transparent,
    Named(String),
}

impl BackgroundColor {
    pub const PRESETS: [BackgroundColor; 5] = [
        BackgroundColor::White,
        BackgroundColor::Blue,
        BackgroundColor::Red,
        BackgroundColor::Black,
        BackgroundColor::Transparent,
    ];

    pub fn name(&self) -> &str {
        match self {
            Self::White => "White",
            Self::Blue => "Blue",
            Self::Red => "Red",
            Self::Black => "Black",
            Self::Transparent => "Transparent",
            Self::Named(name) => name.as_str(),
        }
    }
}

impl FromStr for BackgroundColor {
    type Err = std::convert::Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let color = Self::PRESETS
            .into_iter()
            .find(|preset| preset.name().eq_ignore_ascii_case(trimmed))
            .unwrap_or_else(|| Self::Named(trimmed.to_string()));
        Ok(color)
    }
}

impl fmt::Display for BackgroundColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "3:4")]
    Portrait3x4,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "9:16")]
    Portrait9x16,
    #[serde(rename = "16:9")]
    Landscape16x9,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Portrait3x4,
        AspectRatio::Landscape4x3,
        AspectRatio::Portrait9x16,
        AspectRatio::Landscape16x9,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Portrait3x4 => "3:4",
            Self::Landscape4x3 => "4:3",
            Self::Portrait9x16 => "9:16",
            Self::Landscape16x9 => "16:9",
        }
    }

    fn ratio(self) -> f64 {
        match self {
            Self::Square => 1.0,
            Self::Portrait3x4 => 3.0 / 4.0,
            Self::Landscape4x3 => 4.0 / 3.0,
            Self::Portrait9x16 => 9.0 / 16.0,
            Self::Landscape16x9 => 16.0 / 9.0,
        }
    }

    /// Accepts exact ratios, `WxH` sizes, other `W:H` ratios and the
    /// portrait/landscape/square keywords, snapping to the nearest
    /// supported ratio. Snaps are reported through `warnings`.
    pub fn nearest(raw: &str, warnings: &mut Vec<String>) -> Option<AspectRatio> {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return None;
        }
        match normalized.as_str() {
            "portrait" | "tall" => return Some(Self::Portrait9x16),
            "landscape" | "wide" => return Some(Self::Landscape16x9),
            "square" => return Some(Self::Square),
            "passport" => return Some(Self::Portrait3x4),
            _ => {}
        }
        if let Some(exact) = Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == normalized)
        {
            return Some(exact);
        }

        let target = if let Some((left, right)) = parse_pair(&normalized, ':') {
            left / right
        } else if let Some((width, height)) = parse_pair(&normalized, 'x') {
            width / height
        } else {
            return None;
        };

        let mut best = Self::Square;
        let mut best_delta = f64::MAX;
        for candidate in Self::ALL {
            let delta = (candidate.ratio() - target).abs();
            if delta < best_delta {
                best = candidate;
                best_delta = delta;
            }
        }
        let message = format!("Aspect ratio {normalized} snapped to {}.", best.as_str());
        if !warnings.contains(&message) {
            warnings.push(message);
        }
        Some(best)
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == trimmed)
            .ok_or_else(|| {
                format!(
                    "unsupported aspect ratio '{trimmed}' (expected one of {})",
                    Self::ALL.map(AspectRatio::as_str).join(", ")
                )
            })
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_pair(raw: &str, separator: char) -> Option<(f64, f64)> {
    let (left, right) = raw.split_once(separator)?;
    let left = left.trim().parse::<u32>().ok()?;
    let right = right.trim().parse::<u32>().ok()?;
    if left == 0 || right == 0 {
        return None;
    }
    Some((left as f64, right as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_ratio_applies_only_to_sizing_operations() {
        assert_eq!(
            TransformationRequest::edit("add a hat", AspectRatio::Landscape16x9).aspect_ratio(),
            Some(AspectRatio::Landscape16x9)
        );
        assert_eq!(
            TransformationRequest::Enhance.aspect_ratio(),
            Some(AspectRatio::Square)
        );
        assert_eq!(
            TransformationRequest::PassportNormalize.aspect_ratio(),
            Some(AspectRatio::Portrait3x4)
        );
        assert_eq!(
            TransformationRequest::background(BackgroundColor::Blue).aspect_ratio(),
            None
        );
        assert_eq!(TransformationRequest::Analyze.aspect_ratio(), None);
    }

    #[test]
    fn validate_rejects_blank_prompt_and_color() {
        assert!(TransformationRequest::edit("   ", AspectRatio::Square)
            .validate()
            .is_err());
        assert!(
            TransformationRequest::background(BackgroundColor::Named(String::new()))
                .validate()
                .is_err()
        );
        assert!(TransformationRequest::edit("retro filter", AspectRatio::Square)
            .validate()
            .is_ok());
        assert!(TransformationRequest::Enhance.validate().is_ok());
    }

    #[test]
    fn background_color_parses_presets_case_insensitively() {
        assert_eq!("blue".parse::<BackgroundColor>(), Ok(BackgroundColor::Blue));
        assert_eq!(" TRANSPARENT ".parse::<BackgroundColor>(), Ok(BackgroundColor::Transparent));
        assert_eq!(
            "sky blue".parse::<BackgroundColor>(),
            Ok(BackgroundColor::Named("sky blue".to_string()))
        );
        assert_eq!(BackgroundColor::Named("teal".to_string()).to_string(), "teal");
    }

    #[test]
    fn aspect_ratio_from_str_is_strict() {
        assert_eq!("3:4".parse::<AspectRatio>(), Ok(AspectRatio::Portrait3x4));
        let err = "2:3".parse::<AspectRatio>().err().unwrap_or_default();
        assert!(err.contains("unsupported aspect ratio '2:3'"));
        assert!(err.contains("1:1, 3:4, 4:3, 9:16, 16:9"));
    }

    #[test]
    fn aspect_ratio_nearest_snaps_sizes_and_ratios() {
        let mut warnings = Vec::new();
        assert_eq!(
            AspectRatio::nearest("1920x1080", &mut warnings),
            Some(AspectRatio::Landscape16x9)
        );
        assert_eq!(
            AspectRatio::nearest("2:3", &mut warnings),
            Some(AspectRatio::Portrait3x4)
        );
        assert!(warnings
            .iter()
            .any(|warning| warning == "Aspect ratio 2:3 snapped to 3:4."));
        assert_eq!(warnings.len(), 2);

        let mut keyword_warnings = Vec::new();
        assert_eq!(
            AspectRatio::nearest("portrait", &mut keyword_warnings),
            Some(AspectRatio::Portrait9x16)
        );
        assert_eq!(
            AspectRatio::nearest("4:3", &mut keyword_warnings),
            Some(AspectRatio::Landscape4x3)
        );
        assert!(keyword_warnings.is_empty());
        assert_eq!(AspectRatio::nearest("0x10", &mut keyword_warnings), None);
        assert_eq!(AspectRatio::nearest("banana", &mut keyword_warnings), None);
    }

    #[test]
    fn aspect_ratio_serializes_as_wire_string() -> anyhow::Result<()> {
        assert_eq!(
            serde_json::to_value(AspectRatio::Portrait9x16)?,
            serde_json::json!("9:16")
        );
        Ok(())
    }
}
