use std::fmt;

use anyhow::{bail, Context, Result};
use base64::alphabet;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;

pub const SCENE_SENTINEL: &str = "a room";

const DEFAULT_IMAGE_MIME: &str = "image/png";

// Browsers and hand-written clients regularly drop base64 padding.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneDescription {
    Observed(String),
    Unavailable,
}

impl SceneDescription {
    pub fn from_caption(raw: &str) -> Self {
        let trimmed = raw.trim();
        if !trimmed.chars().any(char::is_alphanumeric)
            || trimmed.eq_ignore_ascii_case(SCENE_SENTINEL)
        {
            return Self::Unavailable;
        }
        Self::Observed(trimmed.to_string())
    }

    pub fn observed(&self) -> Option<&str> {
        match self {
            Self::Observed(text) => Some(text.as_str()),
            Self::Unavailable => None,
        }
    }

    pub fn is_observed(&self) -> bool {
        matches!(self, Self::Observed(_))
    }

    pub fn as_text(&self) -> &str {
        self.observed().unwrap_or(SCENE_SENTINEL)
    }
}

impl fmt::Display for SceneDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_text())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ImagePayload {
    pub fn from_bytes(bytes: Vec<u8>, declared_mime: Option<&str>) -> Result<Self> {
        if bytes.is_empty() {
            bail!("image payload is empty");
        }
        let mime_type = resolve_mime(&bytes, declared_mime);
        Ok(Self { mime_type, bytes })
    }

    pub fn from_data_url(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            bail!("image payload is empty");
        }

        let (declared_mime, encoded) = match trimmed.strip_prefix("data:") {
            Some(rest) => {
                let Some((header, data)) = rest.split_once(',') else {
                    bail!("data URI is missing the ',' separator");
                };
                let mut parts = header.split(';');
                let mime = parts.next().map(str::trim).unwrap_or_default();
                if !parts.any(|part| part.trim().eq_ignore_ascii_case("base64")) {
                    bail!("only base64 data URIs are supported");
                }
                (Some(mime), data)
            }
            None => (None, trimmed),
        };

        let compact: String = encoded.chars().filter(|ch| !ch.is_whitespace()).collect();
        let bytes = LENIENT_BASE64
            .decode(compact.as_bytes())
            .context("image payload is not valid base64")?;
        Self::from_bytes(bytes, declared_mime)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.bytes))
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn resolve_mime(bytes: &[u8], declared: Option<&str>) -> String {
    if let Some(declared) = declared
        .map(str::trim)
        .filter(|value| value.to_ascii_lowercase().starts_with("image/"))
    {
        return declared.to_ascii_lowercase();
    }
    image::guess_format(bytes)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| DEFAULT_IMAGE_MIME.to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedesignRequest {
    pub image: Option<ImagePayload>,
    pub prompt: Option<String>,
    pub style: Option<String>,
    pub room_type: Option<String>,
}
