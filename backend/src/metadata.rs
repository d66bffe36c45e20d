//! ERC-721 metadata for minted achievements, and where it gets stored.

use crate::claim::{AchievementClaim, ClaimContext};
use crate::config::IpfsConfig;
use crate::errors::PipelineError;
use crate::proof_generator::GeneratedProof;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[async_trait]
pub trait PinService: Send + Sync {
    /// Pin a JSON document, returning its content id.
    async fn pin_json(&self, name: &str, document: &Value) -> Result<String, PipelineError>;

    /// HTTP gateway URL for a content id.
    fn url_for(&self, cid: &str) -> String;
}

pub struct PinataClient {
    http: reqwest::Client,
    api_url: String,
    jwt: String,
    gateway: String,
}

#[derive(Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

impl PinataClient {
    pub fn new(config: &IpfsConfig) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PipelineError::Metadata(format!("http client: {e}")))?;
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            jwt: config.pinata_jwt.clone(),
            gateway: config.gateway.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PinService for PinataClient {
    async fn pin_json(&self, name: &str, document: &Value) -> Result<String, PipelineError> {
        let body = json!({
            "pinataContent": document,
            "pinataMetadata": { "name": name },
        });

        let resp = self
            .http
            .post(format!("{}/pinning/pinJSONToIPFS", self.api_url))
            .bearer_auth(&self.jwt)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Metadata(format!("pin request: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Metadata(format!("pin service returned {status}: {text}")));
        }

        let pinned: PinResponse =
            resp.json().await.map_err(|e| PipelineError::Metadata(format!("pin response: {e}")))?;
        Ok(pinned.ipfs_hash)
    }

    fn url_for(&self, cid: &str) -> String {
        format!("{}/ipfs/{cid}", self.gateway)
    }
}

#[derive(Clone, Debug)]
pub struct PackagedMetadata {
    /// Goes into the mint call as `metadataURI`.
    pub uri: String,
    pub gateway_url: Option<String>,
    pub document: Value,
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

fn completed_date(completed_at: u64) -> String {
    i64::try_from(completed_at)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| completed_at.to_string())
}

/// Builds token metadata that carries the public proof bindings and none of the
/// private attributes.
pub struct MetadataPackager {
    app_name: String,
    pin: Option<Arc<dyn PinService>>,
}

impl MetadataPackager {
    pub fn new(app_name: impl Into<String>, pin: Option<Arc<dyn PinService>>) -> Self {
        Self { app_name: app_name.into(), pin }
    }

    pub fn badge_svg(&self, claim: &AchievementClaim) -> String {
        let (label, accent) = match claim.context {
            ClaimContext::Module { .. } => ("MODULE COMPLETE", "#2f80ed"),
            ClaimContext::Achievement { .. } => ("ACHIEVEMENT", "#f2994a"),
        };
        format!(
            concat!(
                r##"<svg xmlns="http://www.w3.org/2000/svg" width="400" height="400" viewBox="0 0 400 400">"##,
                r##"<rect width="400" height="400" rx="24" fill="#0f172a"/>"##,
                r##"<circle cx="200" cy="160" r="90" fill="none" stroke="{accent}" stroke-width="10"/>"##,
                r##"<text x="200" y="170" font-family="sans-serif" font-size="28" fill="#ffffff" text-anchor="middle">ZK</text>"##,
                r##"<text x="200" y="295" font-family="sans-serif" font-size="20" fill="{accent}" text-anchor="middle">{label}</text>"##,
                r##"<text x="200" y="330" font-family="sans-serif" font-size="16" fill="#cbd5e1" text-anchor="middle">{id}</text>"##,
                r##"<text x="200" y="365" font-family="sans-serif" font-size="12" fill="#64748b" text-anchor="middle">{app} · {date}</text>"##,
                "</svg>"
            ),
            accent = accent,
            label = label,
            id = xml_escape(claim.context.id()),
            app = xml_escape(&self.app_name),
            date = completed_date(claim.completed_at),
        )
    }

    pub fn document(&self, claim: &AchievementClaim, proof: &GeneratedProof) -> Value {
        let (kind, title) = match &claim.context {
            ClaimContext::Module { module_id } => ("Module", format!("Module {module_id} completed")),
            ClaimContext::Achievement { achievement_type } => {
                ("Achievement", format!("{achievement_type} achievement"))
            }
        };
        let image = format!("data:image/svg+xml;base64,{}", STANDARD.encode(self.badge_svg(claim)));

        json!({
            "name": format!("{} · {title}", self.app_name),
            "description": format!(
                "{title} on {}. Performance requirements proven with a Groth16 zero-knowledge proof; \
                 the underlying scores are not disclosed.",
                completed_date(claim.completed_at)
            ),
            "image": image,
            "attributes": [
                { "trait_type": "Type", "value": kind },
                { "trait_type": "Context", "value": claim.context.id() },
                { "trait_type": "Circuit", "value": proof.circuit().to_string() },
                { "trait_type": "Commitment Hash", "value": proof.commitment_hex() },
                { "trait_type": "Student Hash", "value": proof.student_hash_hex() },
                { "trait_type": "Completed", "display_type": "date", "value": claim.completed_at },
                { "trait_type": "ZK Verified", "value": true },
            ],
        })
    }

    /// Build the document and store it: pinned when a pin service is configured,
    /// otherwise inlined as a `data:` URI.
    pub async fn package(&self, claim: &AchievementClaim, proof: &GeneratedProof) -> Result<PackagedMetadata, PipelineError> {
        let document = self.document(claim, proof);

        match &self.pin {
            Some(pin) => {
                let name = format!("{}-{}", claim.context.id(), &proof.commitment_hex()[2..14]);
                let cid = pin.pin_json(&name, &document).await?;
                info!(%cid, context = claim.context.id(), "metadata pinned");
                Ok(PackagedMetadata { uri: format!("ipfs://{cid}"), gateway_url: Some(pin.url_for(&cid)), document })
            }
            None => {
                let bytes = serde_json::to_vec(&document).map_err(|e| PipelineError::Metadata(e.to_string()))?;
                let uri = format!("data:application/json;base64,{}", STANDARD.encode(bytes));
                Ok(PackagedMetadata { uri, gateway_url: None, document })
            }
        }
    }
}
