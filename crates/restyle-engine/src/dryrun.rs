use std::io::Cursor;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use restyle_contracts::jobs::{GenerationMode, GenerationResult};
use restyle_contracts::requests::ImagePayload;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::{now_utc_iso, GatewayError, GenerationInput, GenerationProvider};

const PLACEHOLDER_DIM: u32 = 64;

pub struct DryrunProvider {
    mode: GenerationMode,
}

impl DryrunProvider {
    pub fn new(mode: GenerationMode) -> Self {
        Self { mode }
    }
}

#[async_trait]
impl GenerationProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn mode(&self) -> GenerationMode {
        self.mode
    }

    async fn start(&self, input: &GenerationInput) -> Result<GenerationResult, GatewayError> {
        let prediction_id = short_id(&input.prompt, &input.image.bytes);
        let url = render_placeholder(&prediction_id)?;
        match self.mode {
            GenerationMode::Wait => Ok(GenerationResult::Completed { url }),
            GenerationMode::Poll => {
                let stamp = now_utc_iso();
                Ok(GenerationResult::Job(json!({
                    "id": prediction_id,
                    "model": "dryrun",
                    "status": "succeeded",
                    "input": {"prompt": input.prompt},
                    "output": [url],
                    "error": null,
                    "created_at": stamp,
                    "completed_at": stamp,
                })))
            }
        }
    }

    async fn status(&self, job_id: &str) -> Result<Value, GatewayError> {
        Ok(json!({
            "id": job_id,
            "model": "dryrun",
            "status": "succeeded",
            "output": [render_placeholder(job_id)?],
            "error": null,
        }))
    }
}

fn render_placeholder(seed_text: &str) -> Result<String, GatewayError> {
    let (r, g, b) = color_from_text(seed_text);
    let mut image = RgbImage::new(PLACEHOLDER_DIM, PLACEHOLDER_DIM);
    for pixel in image.pixels_mut() {
        *pixel = Rgb([r, g, b]);
    }
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|err| GatewayError::upstream(format!("dryrun render failed: {err}")))?;
    let payload = ImagePayload {
        mime_type: "image/png".to_string(),
        bytes,
    };
    Ok(payload.to_data_url())
}

fn color_from_text(text: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

fn short_id(prompt: &str, image: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(image);
    let digest = hasher.finalize();
    format!("dryrun-{}", hex::encode(&digest[..6]))
}
