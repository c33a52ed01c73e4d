//! Image download for backends that cannot read storage themselves.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::image::MAX_IMAGE_BYTES;

use super::error::{VisionError, VisionResult};
use super::provider::StorageLocator;

/// Resolves a [`StorageLocator`] to raw image bytes.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, locator: &StorageLocator) -> VisionResult<Vec<u8>>;
}

/// Fetches `Url` locators over HTTP(S).
///
/// Object locators are rejected; wire an object-store fetcher in front of
/// this one when a deployment needs them.
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

const FETCHER_NAME: &str = "http-fetcher";

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> VisionResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                VisionError::provider_with_source(FETCHER_NAME, "failed to create HTTP client", e)
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, locator: &StorageLocator) -> VisionResult<Vec<u8>> {
        let url = match locator {
            StorageLocator::Url { url } => url,
            StorageLocator::Object { .. } => {
                return Err(VisionError::provider(
                    FETCHER_NAME,
                    format!("cannot fetch object locator {locator} over HTTP"),
                ))
            }
        };

        tracing::debug!(url = %url, "downloading image");
        let mut response = self.client.get(url).send().await.map_err(|e| {
            VisionError::provider_with_source(FETCHER_NAME, format!("GET {url} failed"), e)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(VisionError::provider(
                FETCHER_NAME,
                format!("GET {url} returned {status}"),
            ));
        }

        let too_large = |size: u64| {
            VisionError::provider(
                FETCHER_NAME,
                format!("image at {url} is {size} bytes or more, limit is {MAX_IMAGE_BYTES}"),
            )
        };
        if let Some(declared) = response.content_length() {
            if declared > MAX_IMAGE_BYTES {
                return Err(too_large(declared));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            VisionError::provider_with_source(FETCHER_NAME, "failed to read image body", e)
        })? {
            if (body.len() + chunk.len()) as u64 > MAX_IMAGE_BYTES {
                return Err(too_large((body.len() + chunk.len()) as u64));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a local port and return its URL.
    async fn serve_once(head: String, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/image.jpg")
    }

    #[tokio::test]
    async fn test_small_image_downloaded() {
        let body = b"jpeg-bytes".to_vec();
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let url = serve_once(head, body.clone()).await;

        let fetcher = HttpImageFetcher::new(Duration::from_secs(5)).unwrap();
        let bytes = fetcher.fetch(&StorageLocator::url(url)).await.unwrap();
        assert_eq!(bytes, body);
    }

    #[tokio::test]
    async fn test_declared_oversize_rejected_before_body() {
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            MAX_IMAGE_BYTES + 1
        );
        let url = serve_once(head, Vec::new()).await;

        let fetcher = HttpImageFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch(&StorageLocator::url(url)).await.unwrap_err();
        assert!(err.to_string().contains("limit is"));
    }

    #[tokio::test]
    async fn test_undeclared_oversize_stops_at_limit() {
        let head = "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_string();
        let url = serve_once(head, vec![0u8; MAX_IMAGE_BYTES as usize + 1]).await;

        let fetcher = HttpImageFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch(&StorageLocator::url(url)).await.unwrap_err();
        assert!(err.to_string().contains("limit is"));
    }

    #[tokio::test]
    async fn test_object_locator_rejected() {
        let fetcher = HttpImageFetcher::new(Duration::from_secs(1)).unwrap();
        let err = fetcher
            .fetch(&StorageLocator::object("bucket", "key.jpg"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("s3://bucket/key.jpg"));
    }
}
