//! Image download and collision-resistant local naming.
//!
//! All pages of a section share one `images/` directory, so local names
//! must stay unique across concurrent workers without any coordination.
//! The name combines three independent components:
//!
//! ```text
//! {page-slug}_image_{8-hex sha256(url)}_{counter}{ext}
//! ```
//!
//! The slug separates pages from each other, the URL hash separates
//! distinct remote images within a page, and the per-page counter
//! separates repeated occurrences of the same URL. The counter is owned
//! by the fetcher instance (one per page conversion) — never shared
//! state — and advances on every fetch attempt.
//!
//! Failure policy: an image that cannot be downloaded or written logs a
//! warning and yields `None`; the page is converted without it.

use crate::graph::GraphClient;
use crate::pipeline::normalize::ImageSource;
use crate::sanitize::{sanitize_image_name, sanitize_title};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, warn};

/// Default extension when neither the URL nor a probe yields one.
const FALLBACK_EXT: &str = ".png";

/// Downloads the images of a single page into the section image store.
pub struct ImageFetcher<'a> {
    client: &'a GraphClient,
    images_dir: &'a Path,
    page_slug: String,
    /// `../images/…` instead of `images/…` — child pages write their
    /// Markdown one directory below the image store.
    nested: bool,
    counter: u32,
}

impl<'a> ImageFetcher<'a> {
    pub fn new(
        client: &'a GraphClient,
        images_dir: &'a Path,
        page_title: &str,
        nested: bool,
    ) -> Self {
        Self {
            client,
            images_dir,
            page_slug: sanitize_image_name(page_title),
            nested,
            counter: 0,
        }
    }

    /// Download one image and return its path relative to the page's
    /// Markdown file, or `None` on any failure.
    pub async fn fetch(&mut self, source: &ImageSource) -> Option<String> {
        let counter = self.counter;
        self.counter += 1;

        let ext = match extension_from_url(&source.url) {
            Some(ext) => ext,
            None => self.probe_extension(source).await,
        };
        let name = image_file_name(&self.page_slug, &source.url, counter, &ext);
        let path = self.images_dir.join(&name);

        let bytes = match self.client.fetch_bytes(&source.url, source.needs_auth).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("failed to download image {}: {e}", source.url);
                return None;
            }
        };
        if let Err(e) = tokio::fs::write(&path, &bytes).await {
            warn!("failed to write image {}: {e}", path.display());
            return None;
        }

        debug!("saved image {} ({} bytes)", path.display(), bytes.len());
        if self.nested {
            Some(format!("../images/{name}"))
        } else {
            Some(format!("images/{name}"))
        }
    }

    /// HEAD the resource and map `image/<subtype>` to an extension.
    async fn probe_extension(&self, source: &ImageSource) -> String {
        if let Some(content_type) = self
            .client
            .probe_content_type(&source.url, source.needs_auth)
            .await
        {
            if let Some(subtype) = content_type.strip_prefix("image/") {
                let subtype = subtype.split(';').next().unwrap_or(subtype).trim();
                if !subtype.is_empty() {
                    return format!(".{}", sanitize_image_name(subtype));
                }
            }
        }
        FALLBACK_EXT.to_string()
    }
}

/// Extension (including the dot) taken from the URL path, if any.
fn extension_from_url(source_url: &str) -> Option<String> {
    let parsed = url::Url::parse(source_url).ok()?;
    let last_segment = parsed.path_segments()?.next_back()?.to_string();
    let (stem, ext) = last_segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    // Sanitized with the title policy, the original behaviour: the
    // extension keeps its case-insensitive value but loses anything a
    // filesystem would object to.
    Some(format!(".{}", sanitize_title(ext)))
}

/// Deterministic local file name for one image occurrence.
pub fn image_file_name(page_slug: &str, source_url: &str, counter: u32, ext: &str) -> String {
    let digest = Sha256::digest(source_url.as_bytes());
    let mut hash = String::with_capacity(8);
    for byte in &digest[..4] {
        // Writing to a String cannot fail.
        let _ = write!(hash, "{byte:02x}");
    }
    format!("{page_slug}_image_{hash}_{counter}{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn extension_from_plain_url() {
        assert_eq!(
            extension_from_url("https://x.example/pics/photo.JPG").as_deref(),
            Some(".JPG")
        );
    }

    #[test]
    fn extension_ignores_query_string() {
        assert_eq!(
            extension_from_url("https://x.example/photo.png?width=400").as_deref(),
            Some(".png")
        );
    }

    #[test]
    fn extension_absent_when_path_has_none() {
        assert_eq!(
            extension_from_url("https://graph.microsoft.com/v1.0/resources/abc/$value"),
            None
        );
        assert_eq!(extension_from_url("https://x.example/"), None);
        assert_eq!(extension_from_url("not a url"), None);
    }

    #[test]
    fn hidden_file_style_segment_is_not_an_extension() {
        assert_eq!(extension_from_url("https://x.example/.hidden"), None);
    }

    #[test]
    fn names_are_unique_per_counter_and_url() {
        let urls = [
            "https://x.example/a.png",
            "https://x.example/b.png",
            "https://x.example/a.png", // repeated URL, new counter
        ];
        let names: HashSet<String> = urls
            .iter()
            .enumerate()
            .map(|(i, url)| image_file_name("my-page", url, i as u32, ".png"))
            .collect();
        assert_eq!(names.len(), urls.len());
    }

    #[test]
    fn name_shape() {
        let name = image_file_name("notes", "https://x.example/a.png", 0, ".png");
        assert!(name.starts_with("notes_image_"), "got: {name}");
        assert!(name.ends_with("_0.png"), "got: {name}");
        // 8 hex chars between the markers.
        let hash = name
            .trim_start_matches("notes_image_")
            .trim_end_matches("_0.png");
        assert_eq!(hash.len(), 8);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn same_url_same_counter_is_deterministic() {
        let a = image_file_name("p", "https://x.example/a.png", 3, ".png");
        let b = image_file_name("p", "https://x.example/a.png", 3, ".png");
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn fetch_writes_file_and_counts_up() {
        use crate::auth::StaticToken;
        use crate::graph::GraphClient;
        use std::sync::Arc;

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/img/a.png")
            .with_body([137u8, 80, 78, 71].as_slice())
            .expect(2)
            .create_async()
            .await;

        let client = GraphClient::new(Arc::new(StaticToken::new("t")), 1, 1, 100).expect("client");
        let dir = tempfile::tempdir().expect("tempdir");
        let mut fetcher = ImageFetcher::new(&client, dir.path(), "My Page", false);

        let source = ImageSource {
            url: format!("{}/img/a.png", server.url()),
            needs_auth: false,
        };
        let first = fetcher.fetch(&source).await.expect("first fetch");
        let second = fetcher.fetch(&source).await.expect("second fetch");

        assert!(first.starts_with("images/my-page_image_"));
        assert!(first.ends_with("_0.png"), "got: {first}");
        assert!(second.ends_with("_1.png"), "got: {second}");
        assert_ne!(first, second);

        for rel in [&first, &second] {
            let on_disk = dir.path().join(rel.trim_start_matches("images/"));
            assert!(on_disk.exists(), "missing {}", on_disk.display());
        }
    }

    #[tokio::test]
    async fn fetch_failure_yields_none() {
        use crate::auth::StaticToken;
        use crate::graph::GraphClient;
        use std::sync::Arc;

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/img/missing.png")
            .with_status(404)
            .create_async()
            .await;

        let client = GraphClient::new(Arc::new(StaticToken::new("t")), 1, 1, 100).expect("client");
        let dir = tempfile::tempdir().expect("tempdir");
        let mut fetcher = ImageFetcher::new(&client, dir.path(), "p", false);

        let source = ImageSource {
            url: format!("{}/img/missing.png", server.url()),
            needs_auth: false,
        };
        assert!(fetcher.fetch(&source).await.is_none());
    }

    #[tokio::test]
    async fn nested_pages_get_parent_traversal_prefix() {
        use crate::auth::StaticToken;
        use crate::graph::GraphClient;
        use std::sync::Arc;

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/img/a.png")
            .with_body("x")
            .create_async()
            .await;

        let client = GraphClient::new(Arc::new(StaticToken::new("t")), 1, 1, 100).expect("client");
        let dir = tempfile::tempdir().expect("tempdir");
        let mut fetcher = ImageFetcher::new(&client, dir.path(), "child", true);

        let source = ImageSource {
            url: format!("{}/img/a.png", server.url()),
            needs_auth: false,
        };
        let rel = fetcher.fetch(&source).await.expect("fetch");
        assert!(rel.starts_with("../images/"), "got: {rel}");
    }

    #[tokio::test]
    async fn probe_fallback_defaults_to_png() {
        use crate::auth::StaticToken;
        use crate::graph::GraphClient;
        use std::sync::Arc;

        let mut server = mockito::Server::new_async().await;
        // No extension in the path; HEAD fails → fallback.
        server
            .mock("HEAD", "/resource/abc/value")
            .with_status(500)
            .create_async()
            .await;
        server
            .mock("GET", "/resource/abc/value")
            .with_body("bytes")
            .create_async()
            .await;

        let client = GraphClient::new(Arc::new(StaticToken::new("t")), 1, 1, 100).expect("client");
        let dir = tempfile::tempdir().expect("tempdir");
        let mut fetcher = ImageFetcher::new(&client, dir.path(), "p", false);

        let source = ImageSource {
            url: format!("{}/resource/abc/value", server.url()),
            needs_auth: false,
        };
        let rel = fetcher.fetch(&source).await.expect("fetch");
        assert!(rel.ends_with(".png"), "got: {rel}");
    }

    #[tokio::test]
    async fn probe_content_type_drives_extension() {
        use crate::auth::StaticToken;
        use crate::graph::GraphClient;
        use std::sync::Arc;

        let mut server = mockito::Server::new_async().await;
        server
            .mock("HEAD", "/resource/abc/value")
            .with_header("content-type", "image/jpeg")
            .create_async()
            .await;
        server
            .mock("GET", "/resource/abc/value")
            .with_body("bytes")
            .create_async()
            .await;

        let client = GraphClient::new(Arc::new(StaticToken::new("t")), 1, 1, 100).expect("client");
        let dir = tempfile::tempdir().expect("tempdir");
        let mut fetcher = ImageFetcher::new(&client, dir.path(), "p", false);

        let source = ImageSource {
            url: format!("{}/resource/abc/value", server.url()),
            needs_auth: false,
        };
        let rel = fetcher.fetch(&source).await.expect("fetch");
        assert!(rel.ends_with(".jpeg"), "got: {rel}");
    }
}
