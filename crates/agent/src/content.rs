//! Content builder: turns client image references into provider parts.
//!
//! A message without images keeps its text content. A message with images
//! becomes `[text, image, image, ...]` in input order, every image as an
//! inline `data:` URI. Remote references are fetched; one failed fetch fails
//! the whole build.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use futures::future::try_join_all;
use neonchat_core::error::ContentError;
use neonchat_core::message::{ContentPart, Message, MessageContent};
use tracing::{debug, warn};

/// Content type assumed when a server does not send one.
pub const FALLBACK_CONTENT_TYPE: &str = "image/jpeg";

/// Raw bytes of a fetched image. Dropped as soon as it is encoded.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// Retrieves remote images.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, ContentError>;
}

/// Fetches images over HTTP(S) with reqwest.
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpImageFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, ContentError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ContentError::FetchFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContentError::BadStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty());

        let bytes = response.bytes().await.map_err(|e| ContentError::FetchFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(FetchedImage { bytes, content_type })
    }
}

/// Encode image bytes as a `data:` URI.
pub fn to_data_uri(content_type: Option<&str>, bytes: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{};base64,{encoded}", content_type.unwrap_or(FALLBACK_CONTENT_TYPE))
}

pub struct ContentBuilder {
    fetcher: Arc<dyn ImageFetcher>,
}

impl ContentBuilder {
    pub fn new(fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Build provider content from text and image references.
    pub async fn build(&self, text: MessageContent, images: &[String]) -> Result<MessageContent, ContentError> {
        if images.is_empty() {
            return Ok(text);
        }

        let resolved = try_join_all(images.iter().map(|reference| self.resolve(reference))).await?;

        let mut parts = match text {
            MessageContent::Text(text) => vec![ContentPart::text(text)],
            MessageContent::Parts(parts) => parts,
        };
        parts.extend(resolved.into_iter().map(ContentPart::image));
        Ok(MessageContent::Parts(parts))
    }

    /// Resolve the images of every message. History order is preserved.
    pub async fn prepare(&self, messages: Vec<Message>) -> Result<Vec<Message>, ContentError> {
        let mut prepared = Vec::with_capacity(messages.len());
        for mut message in messages {
            if message.has_images() {
                let images = std::mem::take(&mut message.images);
                message.content = self.build(message.content, &images).await?;
            }
            prepared.push(message);
        }
        Ok(prepared)
    }

    async fn resolve(&self, reference: &str) -> Result<String, ContentError> {
        let reference = reference.trim();
        if reference.starts_with("data:") {
            return Ok(reference.to_string());
        }
        if !(reference.starts_with("http://") || reference.starts_with("https://")) {
            return Err(ContentError::InvalidReference(reference.chars().take(64).collect()));
        }

        let image = self.fetcher.fetch(reference).await.inspect_err(|e| {
            warn!(url = reference, error = %e, "Image fetch failed");
        })?;
        debug!(url = reference, bytes = image.bytes.len(), "Fetched image");
        Ok(to_data_uri(image.content_type.as_deref(), &image.bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapFetcher {
        images: HashMap<String, FetchedImage>,
    }

    impl MapFetcher {
        fn with(entries: &[(&str, &[u8], Option<&str>)]) -> Arc<Self> {
            let images = entries
                .iter()
                .map(|(url, bytes, ct)| {
                    (
                        url.to_string(),
                        FetchedImage {
                            bytes: Bytes::copy_from_slice(bytes),
                            content_type: ct.map(str::to_string),
                        },
                    )
                })
                .collect();
            Arc::new(Self { images })
        }
    }

    #[async_trait]
    impl ImageFetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedImage, ContentError> {
            self.images.get(url).cloned().ok_or_else(|| ContentError::BadStatus {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    #[tokio::test]
    async fn text_only_is_unchanged() {
        let builder = ContentBuilder::new(MapFetcher::with(&[]));
        let content = builder.build("hello".into(), &[]).await.unwrap();
        assert_eq!(content, MessageContent::Text("hello".into()));
    }

    #[tokio::test]
    async fn images_follow_text_in_input_order() {
        let builder = ContentBuilder::new(MapFetcher::with(&[
            ("https://img.example/a.png", b"png-bytes", Some("image/png")),
            ("https://img.example/b", b"raw", None),
        ]));
        let images = vec![
            "https://img.example/a.png".to_string(),
            "data:image/gif;base64,R0lG".to_string(),
            "https://img.example/b".to_string(),
        ];

        let content = builder.build("what is this?".into(), &images).await.unwrap();
        let MessageContent::Parts(parts) = content else {
            panic!("expected parts");
        };
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], ContentPart::text("what is this?"));
        assert_eq!(parts[1], ContentPart::image("data:image/png;base64,cG5nLWJ5dGVz"));
        assert_eq!(parts[2], ContentPart::image("data:image/gif;base64,R0lG"));
        assert_eq!(parts[3], ContentPart::image("data:image/jpeg;base64,cmF3"));
    }

    #[tokio::test]
    async fn one_failed_fetch_fails_the_build() {
        let builder = ContentBuilder::new(MapFetcher::with(&[("https://img.example/a.png", b"x", None)]));
        let images = vec![
            "https://img.example/a.png".to_string(),
            "https://img.example/missing.png".to_string(),
        ];
        let err = builder.build("look".into(), &images).await.unwrap_err();
        assert!(matches!(err, ContentError::BadStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn unsupported_reference_is_rejected() {
        let builder = ContentBuilder::new(MapFetcher::with(&[]));
        let err = builder
            .build("look".into(), &["file:///etc/passwd".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn prepare_clears_images_and_keeps_order() {
        let builder = ContentBuilder::new(MapFetcher::with(&[]));
        let messages = vec![
            Message::user("first"),
            Message::assistant("reply"),
            Message::user("see").with_images(vec!["data:image/png;base64,AAAA".into()]),
        ];

        let prepared = builder.prepare(messages).await.unwrap();
        assert_eq!(prepared.len(), 3);
        assert_eq!(prepared[0].content.text(), "first");
        assert!(prepared.iter().all(|m| m.images.is_empty()));
        assert!(matches!(prepared[2].content, MessageContent::Parts(ref p) if p.len() == 2));
    }

    #[test]
    fn data_uri_defaults_to_jpeg() {
        assert_eq!(to_data_uri(None, b"hi"), "data:image/jpeg;base64,aGk=");
        assert_eq!(to_data_uri(Some("image/webp"), b"hi"), "data:image/webp;base64,aGk=");
    }
}
