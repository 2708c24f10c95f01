use async_trait::async_trait;
use serde::Deserialize;

use super::{ExtractionOutput, Extractor, ExtractorChunk, SourceRef, SourceType};
use crate::error::{IngestError, Result};

#[derive(Debug, Deserialize)]
struct RemoteExtractionResponse {
    markdown: String,
    chunks: Vec<ExtractorChunk>,
}

async fn call_remote(client: &reqwest::Client, endpoint: &str, url: &str) -> Result<ExtractionOutput> {
    let response = client
        .post(endpoint)
        .json(&serde_json::json!({ "url": url }))
        .send()
        .await
        .map_err(|e| IngestError::Fetch {
            source: url.to_string(),
            detail: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(IngestError::RemoteExtractor(format!(
            "status {}",
            response.status()
        )));
    }

    let parsed: RemoteExtractionResponse = response
        .json()
        .await
        .map_err(|e| IngestError::RemoteExtractor(e.to_string()))?;

    Ok(ExtractionOutput {
        markdown: parsed.markdown,
        extractor_chunks: parsed.chunks,
    })
}

/// Capability contract for Docling, a layout-aware PDF/office-document
/// extractor run as a sidecar service. Not exercised end to end here — the
/// local extractors carry the tested path — but the wire contract (POST a
/// source URL, get back markdown plus bbox-bearing chunks) is real.
#[derive(Debug, Clone)]
pub struct RemoteDoclingExtractor {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteDoclingExtractor {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Extractor for RemoteDoclingExtractor {
    fn source_type(&self) -> SourceType {
        SourceType::RemoteDocling
    }

    async fn extract(&self, source: &SourceRef) -> Result<ExtractionOutput> {
        let SourceRef::Remote { url } = source else {
            return Err(IngestError::Parse {
                source: "remote_docling".to_string(),
                detail: "expected SourceRef::Remote".to_string(),
            });
        };
        call_remote(&self.client, &self.endpoint, url).await
    }
}

/// Capability contract for Chonkie, a remote semantic-chunking service used
/// as an alternate source of extractor chunks for sources the local
/// extractors can't parse (e.g. exotic office formats).
#[derive(Debug, Clone)]
pub struct RemoteChonkieExtractor {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteChonkieExtractor {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Extractor for RemoteChonkieExtractor {
    fn source_type(&self) -> SourceType {
        SourceType::RemoteChonkie
    }

    async fn extract(&self, source: &SourceRef) -> Result<ExtractionOutput> {
        let SourceRef::Remote { url } = source else {
            return Err(IngestError::Parse {
                source: "remote_chonkie".to_string(),
                detail: "expected SourceRef::Remote".to_string(),
            });
        };
        call_remote(&self.client, &self.endpoint, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wrong_source_variant_is_parse_error() {
        let extractor = RemoteDoclingExtractor::new("http://localhost:9/docling");
        let err = extractor
            .extract(&SourceRef::PlainText("x".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Parse { .. }));
    }
}
