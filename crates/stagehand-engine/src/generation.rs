use std::io::Cursor;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use stagehand_contracts::image::{extension_for_mime, DEFAULT_IMAGE_MIME};
use stagehand_contracts::{GenerationPlan, ImageHandle, WorkspaceError};

use crate::{truncate_text, EngineConfig, DRYRUN_MODEL};

const DRYRUN_DEFAULT_EDGE: u32 = 512;
const DRYRUN_MAX_EDGE: u32 = 1024;

const CANVAS_RULES: &str = "You are an expert photo editor. The first image is the canvas.";
const PRODUCT_RULES: &str = "The second image shows a product. Isolate only the product \
from it, ignoring its background and any models or props, and composite it into the \
canvas as the instruction describes.";
const EDIT_RULES: &str = "Edit the canvas as the instruction describes.";
const REALISM_RULES: &str = "The instruction is the dominant directive. Keep the result \
photorealistic: lighting, shadows, perspective and scale must match the canvas. \
Return a single edited image.";

/// Wraps the user's free text in the fixed editing instructions.
pub fn compose_instruction(instruction: &str, has_product: bool) -> String {
    let middle = if has_product {
        PRODUCT_RULES
    } else {
        EDIT_RULES
    };
    format!(
        "{CANVAS_RULES} {middle} {REALISM_RULES}\n\nInstruction: {}",
        instruction.trim()
    )
}

/// Ordered image parts plus the final text part of one provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub images: Vec<ImageHandle>,
    pub instruction: String,
    pub prompt_text: String,
}

impl GenerationRequest {
    pub fn from_plan(plan: &GenerationPlan) -> Self {
        let mut images = vec![plan.base.clone()];
        if let Some(product) = plan.product.as_ref() {
            images.push(product.clone());
        }
        Self {
            prompt_text: compose_instruction(&plan.instruction, plan.product.is_some()),
            instruction: plan.instruction.clone(),
            images,
        }
    }

    pub fn includes_product(&self) -> bool {
        self.images.len() > 1
    }
}

/// One request/response round trip per call: no retry, no streaming.
pub trait GenerationClient: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    fn generate(&self, request: &GenerationRequest) -> Result<ImageHandle, WorkspaceError>;
}

pub struct GeminiClient {
    api_base: String,
    api_key: Option<String>,
    model: String,
    http: HttpClient,
}

impl GeminiClient {
    pub fn new(config: &EngineConfig) -> anyhow::Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self {
            api_base: config.api_base.trim().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.trim().to_string(),
            http,
        })
    }

    pub fn endpoint(&self) -> String {
        let model_path = if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    pub fn build_payload(request: &GenerationRequest) -> Value {
        let mut parts = request
            .images
            .iter()
            .map(|image| {
                json!({
                    "inlineData": {
                        "mimeType": image.mime_type(),
                        "data": BASE64.encode(image.bytes()),
                    }
                })
            })
            .collect::<Vec<Value>>();
        parts.push(json!({ "text": request.prompt_text }));
        json!({
            "contents": [{
                "role": "user",
                "parts": parts,
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE", "TEXT"],
            },
        })
    }

    /// First inline image wins. Text without an image is a refusal.
    pub fn decode_response(payload: &Value) -> Result<ImageHandle, WorkspaceError> {
        let candidates = payload
            .get("candidates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut texts = Vec::new();

        for candidate in &candidates {
            let parts = candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for part in parts {
                let inline = part
                    .get("inlineData")
                    .or_else(|| part.get("inline_data"))
                    .and_then(Value::as_object);
                if let Some(inline) = inline {
                    let data = inline
                        .get("data")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    if data.is_empty() {
                        continue;
                    }
                    let bytes = BASE64.decode(data.as_bytes()).map_err(|err| {
                        WorkspaceError::Transport(format!("Gemini image base64 decode failed: {err}"))
                    })?;
                    let mime_type = inline
                        .get("mimeType")
                        .or_else(|| inline.get("mime_type"))
                        .and_then(Value::as_str)
                        .unwrap_or(DEFAULT_IMAGE_MIME)
                        .to_string();
                    let file_name = result_file_name(&bytes, &mime_type);
                    return Ok(ImageHandle::new(bytes, mime_type, file_name));
                }
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    if !text.trim().is_empty() {
                        texts.push(text.trim().to_string());
                    }
                }
            }
        }

        if !texts.is_empty() {
            return Err(WorkspaceError::ModelRefused(texts.join("\n")));
        }
        if let Some(reason) = payload
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str)
        {
            return Err(WorkspaceError::ModelRefused(format!("request blocked ({reason})")));
        }
        Err(WorkspaceError::NoOutput)
    }
}

impl GenerationClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, request: &GenerationRequest) -> Result<ImageHandle, WorkspaceError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(WorkspaceError::Configuration(
                "GEMINI_API_KEY or GOOGLE_API_KEY not set".to_string(),
            ));
        };
        let endpoint = self.endpoint();
        let payload = Self::build_payload(request);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .json(&payload)
            .send()
            .map_err(|err| {
                WorkspaceError::Transport(format!("Gemini request failed ({endpoint}): {err}"))
            })?;

        let status = response.status();
        let code = status.as_u16();
        let body = response.text().map_err(|err| {
            WorkspaceError::Transport(format!("Gemini response body read failed: {err}"))
        })?;
        if code == 401 || code == 403 {
            return Err(WorkspaceError::Configuration(format!(
                "Gemini rejected the API key ({code}): {}",
                truncate_text(&body, 512)
            )));
        }
        if !status.is_success() {
            return Err(WorkspaceError::Transport(format!(
                "Gemini request failed ({code}): {}",
                truncate_text(&body, 512)
            )));
        }
        let parsed: Value = serde_json::from_str(&body).map_err(|err| {
            WorkspaceError::Transport(format!("Gemini returned invalid JSON payload: {err}"))
        })?;
        Self::decode_response(&parsed)
    }
}

/// Offline client: answers every request with a solid-colour PNG whose
/// colour is derived from the prompt.
pub struct DryrunClient;

impl GenerationClient for DryrunClient {
    fn name(&self) -> &str {
        DRYRUN_MODEL
    }

    fn model(&self) -> &str {
        DRYRUN_MODEL
    }

    fn generate(&self, request: &GenerationRequest) -> Result<ImageHandle, WorkspaceError> {
        let (width, height) = request
            .images
            .first()
            .and_then(|base| image::load_from_memory(base.bytes()).ok())
            .map(|decoded| (decoded.width(), decoded.height()))
            .unwrap_or((DRYRUN_DEFAULT_EDGE, DRYRUN_DEFAULT_EDGE));
        let (r, g, b) = color_from_prompt(&request.prompt_text, request.images.len() as u64);
        let canvas = RgbImage::from_pixel(
            width.clamp(1, DRYRUN_MAX_EDGE),
            height.clamp(1, DRYRUN_MAX_EDGE),
            Rgb([r, g, b]),
        );
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(canvas)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|err| WorkspaceError::Io(format!("dry-run encode failed: {err}")))?;
        let file_name = format!("dryrun-{}", result_file_name(&bytes, "image/png"));
        Ok(ImageHandle::new(bytes, "image/png", file_name))
    }
}

fn color_from_prompt(prompt: &str, seed: u64) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(seed.to_be_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

fn result_file_name(bytes: &[u8], mime_type: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    format!(
        "result-{}.{}",
        hex::encode(&digest[..4]),
        extension_for_mime(mime_type)
    )
}
