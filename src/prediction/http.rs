use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use url::Url;

use super::types::{error_message, parse_prediction};
use super::{PredictionClient, PredictionResult};
use crate::asset::ImageAsset;
use crate::error::DetectError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const PREDICT_PATH: &str = "/api/v1/predict";

/// Multipart client for `POST {base}/api/v1/predict`.
pub struct HttpPredictionClient {
    client: Client,
    base_url: String,
    endpoint: String,
}

impl HttpPredictionClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).with_context(|| format!("Invalid API URL {}", base_url))?;

        // Inference on a cold model can take a while; never give up on our own.
        let client = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .context("Failed to build HTTP client")?;

        let endpoint = format!("{}{}", base_url, PREDICT_PATH);

        Ok(Self {
            client,
            base_url,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl PredictionClient for HttpPredictionClient {
    fn predict(&self, asset: &ImageAsset) -> Result<PredictionResult, DetectError> {
        let _span = tracing::debug_span!("predict").entered();

        let part = Part::bytes(asset.bytes().to_vec())
            .file_name(asset.file_name().to_string())
            .mime_str(asset.media_type())
            .map_err(|e| DetectError::PredictionFailed(format!("invalid media type: {}", e)))?;
        let form = Form::new().part("file", part);

        tracing::info!(
            "Submitting {} ({} bytes) to {}",
            asset.file_name(),
            asset.len(),
            self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .map_err(|e| {
                if e.is_builder() {
                    DetectError::PredictionFailed(format!("invalid request: {}", e))
                } else {
                    tracing::warn!("Prediction request failed: {}", e);
                    DetectError::BackendUnreachable {
                        url: self.base_url.clone(),
                    }
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| DetectError::PredictionFailed(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            let message = error_message(status.as_u16(), &body);
            tracing::warn!("Prediction rejected with {}: {}", status, message);
            return Err(DetectError::PredictionFailed(message));
        }

        let result = parse_prediction(&body)?;
        tracing::info!("Predicted {} ({:?})", result.label, result.confidence);
        Ok(result)
    }
}
