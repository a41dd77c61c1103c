//! Tumblr v1 read API. `GET https://<host>/api/read/json?start=N&num=M` answers with
//! `var tumblr_api_read = {...};`, a JSON object wrapped in a script assignment.

use crate::model::{opt_count, Post};
use crate::tumblr::error::{AssetDownloadError, FetchError};
use crate::tumblr::{BlogId, Page, PostFeed, PostType};
use crate::PoliteClient;
use serde::Deserialize;
use std::io::{Read, Write};

/// Largest `num` the read endpoint honours.
pub const MAX_PAGE_SIZE: u32 = 50;

/// Top-level object of the read response. Only the keys we use are modelled.
#[derive(Debug, Deserialize)]
struct ReadResponse {
    #[serde(rename = "posts-total", default, deserialize_with = "opt_count")]
    total: Option<u64>,
    #[serde(default)]
    posts: Vec<Post>,
}

/// Post feed for one blog, backed by the shared polite client.
pub struct TumblrApi<'a> {
    client: &'a mut PoliteClient,
    blog: BlogId,
    post_type: Option<PostType>,
}

impl<'a> TumblrApi<'a> {
    pub fn new(client: &'a mut PoliteClient, blog: BlogId) -> Self {
        Self {
            client,
            blog,
            post_type: None,
        }
    }

    /// Only list posts of this type.
    pub fn with_post_type(mut self, post_type: Option<PostType>) -> Self {
        self.post_type = post_type;
        self
    }

    pub fn blog(&self) -> &BlogId {
        &self.blog
    }

    fn read_url(&self, start: u64, num: u32) -> String {
        read_url(&self.blog, start, num, self.post_type)
    }
}

pub(crate) fn read_url(
    blog: &BlogId,
    start: u64,
    num: u32,
    post_type: Option<PostType>,
) -> String {
    let mut url = format!(
        "https://{}/api/read/json?start={}&num={}",
        blog.host(),
        start,
        num
    );
    if let Some(t) = post_type {
        url.push_str("&type=");
        url.push_str(t.as_query());
    }
    url
}

/// Strip the `var tumblr_api_read = ...;` wrapper and decode the listing.
pub(crate) fn parse_read_response(body: &str, url: &str) -> Result<Page, FetchError> {
    let decode_err = |reason: String| FetchError::Decode {
        url: url.to_string(),
        reason,
    };
    let start = body
        .find('{')
        .ok_or_else(|| decode_err("no JSON object in response".to_string()))?;
    let end = body
        .rfind('}')
        .filter(|&end| end > start)
        .ok_or_else(|| decode_err("unterminated JSON object in response".to_string()))?;
    let response: ReadResponse =
        serde_json::from_str(&body[start..=end]).map_err(|e| decode_err(e.to_string()))?;
    Ok(Page {
        posts: response.posts,
        total: response.total,
    })
}

impl PostFeed for TumblrApi<'_> {
    fn fetch_page(&mut self, start: u64, num: u32) -> Result<Page, FetchError> {
        let url = self.read_url(start, num);
        tracing::debug!(%url, "requesting page");
        let response = self.client.get(&url).map_err(|e| FetchError::Network {
            url: url.clone(),
            source: e,
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }
        let body = response.text().map_err(|e| FetchError::BodyRead {
            url: url.clone(),
            source: e,
        })?;
        parse_read_response(&body, &url)
    }

    fn download(&mut self, url: &str, out: &mut dyn Write) -> Result<u64, AssetDownloadError> {
        tracing::debug!(%url, "downloading asset");
        let mut response = self
            .client
            .get(url)
            .map_err(|e| AssetDownloadError::Network {
                url: url.to_string(),
                source: e,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(AssetDownloadError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        stream_body(&mut response, out, url)
    }
}

/// Passes writes through and remembers whether one of them failed.
struct SinkWriter<'a> {
    inner: &'a mut dyn Write,
    failed: bool,
}

impl Write for SinkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf).map_err(|e| self.record(e))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush().map_err(|e| self.record(e))
    }
}

impl SinkWriter<'_> {
    fn record(&mut self, e: std::io::Error) -> std::io::Error {
        if e.kind() != std::io::ErrorKind::Interrupted {
            self.failed = true;
        }
        e
    }
}

/// Copy a response body into `out`. A failing read is a network error, a failing write is not.
pub(crate) fn stream_body(
    body: &mut dyn Read,
    out: &mut dyn Write,
    url: &str,
) -> Result<u64, AssetDownloadError> {
    let mut sink = SinkWriter {
        inner: out,
        failed: false,
    };
    std::io::copy(body, &mut sink).map_err(|e| {
        let url = url.to_string();
        if sink.failed {
            AssetDownloadError::Write { url, source: e }
        } else {
            AssetDownloadError::BodyRead { url, source: e }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://example.tumblr.com/api/read/json?start=0&num=2";

    #[test]
    fn read_url_includes_paging_and_type() {
        let blog = BlogId::parse("example").unwrap();
        assert_eq!(
            read_url(&blog, 40, 20, None),
            "https://example.tumblr.com/api/read/json?start=40&num=20"
        );
        assert_eq!(
            read_url(&blog, 0, 50, Some(PostType::Photo)),
            "https://example.tumblr.com/api/read/json?start=0&num=50&type=photo"
        );
    }

    #[test]
    fn parses_script_wrapped_listing() {
        let body = r#"var tumblr_api_read = {"tumblelog":{"title":"Example","name":"example"},"posts-start":0,"posts-total":"3","posts-type":false,"posts":[{"id":"1","type":"regular","regular-body":"<p>a</p>"},{"id":"2","type":"quote","quote-text":"b"}]};
"#;
        let page = parse_read_response(body, URL).unwrap();
        assert_eq!(page.total, Some(3));
        assert_eq!(page.posts.len(), 2);
        assert_eq!(page.posts[0].id, "1");
        assert_eq!(page.posts[1].kind.name(), "quote");
    }

    #[test]
    fn parses_bare_json_with_numeric_total() {
        let body = r#"{"posts-total":12,"posts":[]}"#;
        let page = parse_read_response(body, URL).unwrap();
        assert_eq!(page.total, Some(12));
        assert!(page.posts.is_empty());
    }

    #[test]
    fn missing_posts_key_is_an_empty_page() {
        let page = parse_read_response("var tumblr_api_read = {};", URL).unwrap();
        assert!(page.posts.is_empty());
        assert_eq!(page.total, None);
    }

    #[test]
    fn html_error_page_is_a_decode_error() {
        let result = parse_read_response("<html><body>Not found</body></html>", URL);
        match result {
            Err(FetchError::Decode { url, .. }) => assert_eq!(url, URL),
            other => panic!("expected Decode, got {:?}", other),
        }
    }

    #[test]
    fn malformed_post_is_a_decode_error() {
        let body = r#"{"posts":[{"type":"regular"}]}"#;
        assert!(matches!(
            parse_read_response(body, URL),
            Err(FetchError::Decode { .. })
        ));
    }

    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "no space left on device"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct DroppedConnection;

    impl Read for DroppedConnection {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            ))
        }
    }

    const ASSET: &str = "https://media.example/a.jpg";

    #[test]
    fn stream_body_copies_all_bytes() {
        let mut body = std::io::Cursor::new(b"jpeg bytes".to_vec());
        let mut out = Vec::new();
        let n = stream_body(&mut body, &mut out, ASSET).unwrap();
        assert_eq!(n, 10);
        assert_eq!(out, b"jpeg bytes");
    }

    #[test]
    fn local_write_failure_is_not_a_network_error() {
        let mut body = std::io::Cursor::new(b"jpeg".to_vec());
        match stream_body(&mut body, &mut FullDisk, ASSET) {
            Err(AssetDownloadError::Write { url, source }) => {
                assert_eq!(url, ASSET);
                assert!(source.to_string().contains("no space"));
            }
            other => panic!("expected Write, got {:?}", other),
        }
    }

    #[test]
    fn read_failure_is_a_network_error() {
        let mut out = Vec::new();
        let result = stream_body(&mut DroppedConnection, &mut out, ASSET);
        assert!(matches!(
            result,
            Err(AssetDownloadError::BodyRead { ref source, .. })
                if source.kind() == std::io::ErrorKind::ConnectionReset
        ));
    }
}
