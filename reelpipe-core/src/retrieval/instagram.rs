use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

use crate::config::RetrievalSection;
use crate::session::{cookie_header, cookie_value, SessionStore, StoredCookie};

use super::error::{RetrievalError, RetrievalResult};
use super::types::RetrievedPost;
use super::MediaRetriever;

/// Post metadata resolved from the web API, before any bytes are fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct PostContent {
    pub shortcode: String,
    pub caption: Option<String>,
    pub video_url: Option<String>,
}

/// Retrieves reels through the Instagram web endpoints using the saved
/// browser session cookies.
#[derive(Debug, Clone)]
pub struct InstagramRetriever {
    client: Client,
    api_base: Url,
    session_headers: HeaderMap,
    extension: String,
}

impl InstagramRetriever {
    pub fn new(config: &RetrievalSection, cookies: &[StoredCookie]) -> RetrievalResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value(&config.user_agent)?);
        headers.insert(
            HeaderName::from_static("x-ig-app-id"),
            header_value(&config.app_id)?,
        );
        // Session headers go to the API only, never to the media host.
        let mut session_headers = HeaderMap::new();
        if !cookies.is_empty() {
            session_headers.insert(COOKIE, header_value(&cookie_header(cookies))?);
        }
        if let Some(csrf) = cookie_value(cookies, "csrftoken") {
            session_headers.insert(HeaderName::from_static("x-csrftoken"), header_value(csrf)?);
        }
        let api_base = Url::parse(config.api_base.trim_end_matches('/')).map_err(|err| {
            RetrievalError::Configuration(format!("invalid retrieval api_base: {err}"))
        })?;
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            api_base,
            session_headers,
            extension: config.media_extension.trim_start_matches('.').to_string(),
        })
    }

    pub async fn from_session(
        config: &RetrievalSection,
        store: &SessionStore,
    ) -> RetrievalResult<Self> {
        let cookies = store.load().await?;
        Self::new(config, &cookies)
    }

    pub async fn resolve(&self, shortcode: &str) -> RetrievalResult<PostContent> {
        let url = post_info_url(&self.api_base, shortcode)?;
        debug!(shortcode, url = %url, "resolving post");
        let resp = self
            .client
            .get(url)
            .headers(self.session_headers.clone())
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(RetrievalError::Api {
                status: status.as_u16(),
                message: truncate_message(&message),
            });
        }
        let body = resp.text().await?;
        parse_media_info(shortcode, &body)
    }

    async fn download(&self, url: &str, path: &Path) -> RetrievalResult<()> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RetrievalError::Api {
                status: status.as_u16(),
                message: format!("media download failed for {url}"),
            });
        }
        let mut file = fs::File::create(path)
            .await
            .map_err(|source| RetrievalError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let data = chunk?;
            file.write_all(&data)
                .await
                .map_err(|source| RetrievalError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        file.flush().await.map_err(|source| RetrievalError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}

#[async_trait]
impl MediaRetriever for InstagramRetriever {
    async fn retrieve(&self, shortcode: &str, workdir: &Path) -> RetrievalResult<RetrievedPost> {
        let content = self.resolve(shortcode).await?;
        let video_url = content
            .video_url
            .as_deref()
            .ok_or_else(|| RetrievalError::NoMedia {
                shortcode: shortcode.to_string(),
            })?;
        let media_path: PathBuf = workdir.join(format!("{}.{}", content.shortcode, self.extension));
        self.download(video_url, &media_path).await?;
        Ok(RetrievedPost {
            shortcode: content.shortcode,
            caption: content.caption,
            media_path,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MediaInfoResponse {
    #[serde(default)]
    items: Vec<MediaItem>,
    graphql: Option<GraphqlEnvelope>,
}

#[derive(Debug, Deserialize)]
struct MediaItem {
    code: Option<String>,
    caption: Option<CaptionNode>,
    #[serde(default)]
    video_versions: Vec<VideoVersion>,
}

#[derive(Debug, Deserialize)]
struct CaptionNode {
    text: String,
}

#[derive(Debug, Deserialize)]
struct VideoVersion {
    url: String,
    #[serde(default)]
    width: u32,
}

#[derive(Debug, Deserialize)]
struct GraphqlEnvelope {
    shortcode_media: ShortcodeMedia,
}

#[derive(Debug, Deserialize)]
struct ShortcodeMedia {
    shortcode: Option<String>,
    video_url: Option<String>,
    edge_media_to_caption: Option<CaptionEdges>,
}

#[derive(Debug, Deserialize)]
struct CaptionEdges {
    #[serde(default)]
    edges: Vec<CaptionEdge>,
}

#[derive(Debug, Deserialize)]
struct CaptionEdge {
    node: CaptionNode,
}

/// Accepts both the `items[]` layout and the older `graphql.shortcode_media` one.
pub fn parse_media_info(shortcode: &str, body: &str) -> RetrievalResult<PostContent> {
    let response: MediaInfoResponse = serde_json::from_str(body)?;
    if let Some(item) = response.items.into_iter().next() {
        let video_url = item
            .video_versions
            .into_iter()
            .max_by_key(|version| version.width)
            .map(|version| version.url);
        return Ok(PostContent {
            shortcode: item.code.unwrap_or_else(|| shortcode.to_string()),
            caption: item.caption.map(|caption| caption.text),
            video_url,
        });
    }
    if let Some(graphql) = response.graphql {
        let media = graphql.shortcode_media;
        let caption = media
            .edge_media_to_caption
            .and_then(|edges| edges.edges.into_iter().next())
            .map(|edge| edge.node.text);
        return Ok(PostContent {
            shortcode: media.shortcode.unwrap_or_else(|| shortcode.to_string()),
            caption,
            video_url: media.video_url,
        });
    }
    Err(RetrievalError::Parse(format!(
        "no media payload for post {shortcode}"
    )))
}

/// `{api_base}/p/{shortcode}/?__a=1&__d=dis`
fn post_info_url(api_base: &Url, shortcode: &str) -> RetrievalResult<Url> {
    let mut url = api_base.clone();
    url.path_segments_mut()
        .map_err(|_| RetrievalError::Configuration("api_base cannot be a base url".into()))?
        .pop_if_empty()
        .extend(["p", shortcode, ""]);
    url.query_pairs_mut()
        .append_pair("__a", "1")
        .append_pair("__d", "dis");
    Ok(url)
}

fn header_value(value: &str) -> RetrievalResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|err| RetrievalError::Configuration(format!("invalid header value: {err}")))
}

fn truncate_message(message: &str) -> String {
    message.chars().take(300).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_info_url_has_expected_shape() {
        let base = Url::parse("https://www.instagram.com").unwrap();
        assert_eq!(
            post_info_url(&base, "C1abc").unwrap().as_str(),
            "https://www.instagram.com/p/C1abc/?__a=1&__d=dis"
        );
        let nested = Url::parse("http://127.0.0.1:8080/mirror/").unwrap();
        assert_eq!(
            post_info_url(&nested, "C1abc").unwrap().as_str(),
            "http://127.0.0.1:8080/mirror/p/C1abc/?__a=1&__d=dis"
        );
    }

    #[test]
    fn items_layout_picks_widest_video() {
        let body = r#"{"items":[{"code":"C1abc","caption":{"text":"sunset run"},
            "video_versions":[{"url":"https://cdn/low.mp4","width":480},
                              {"url":"https://cdn/high.mp4","width":1080}]}]}"#;
        let content = parse_media_info("C1abc", body).unwrap();
        assert_eq!(content.shortcode, "C1abc");
        assert_eq!(content.caption.as_deref(), Some("sunset run"));
        assert_eq!(content.video_url.as_deref(), Some("https://cdn/high.mp4"));
    }

    #[test]
    fn graphql_layout_is_supported() {
        let body = r#"{"graphql":{"shortcode_media":{"shortcode":"C2def",
            "video_url":"https://cdn/v.mp4",
            "edge_media_to_caption":{"edges":[{"node":{"text":"hello"}}]}}}}"#;
        let content = parse_media_info("C2def", body).unwrap();
        assert_eq!(content.caption.as_deref(), Some("hello"));
        assert_eq!(content.video_url.as_deref(), Some("https://cdn/v.mp4"));
    }

    #[test]
    fn image_post_has_no_video() {
        let body = r#"{"items":[{"code":"C3ghi","caption":null}]}"#;
        let content = parse_media_info("C3ghi", body).unwrap();
        assert!(content.video_url.is_none());
        assert!(content.caption.is_none());
    }

    #[test]
    fn empty_payload_is_an_error() {
        assert!(matches!(
            parse_media_info("C4", r#"{"status":"fail"}"#),
            Err(RetrievalError::Parse(_))
        ));
    }

    #[test]
    fn session_cookies_stay_off_the_shared_client() {
        let section: RetrievalSection = toml::from_str(
            r#"
            api_base = "https://www.instagram.com"
            app_id = "936619743392459"
            user_agent = "test-agent"
            request_timeout_seconds = 5
            max_retries = 3
            backoff_seconds = [5, 15]
            caption_words = 6
            max_name_length = 50
            media_extension = "mp4"
            sidecar = "source_url"
            "#,
        )
        .unwrap();
        let cookies: Vec<StoredCookie> = serde_json::from_str(
            r#"[{"name":"sessionid","value":"s1"},{"name":"csrftoken","value":"tok"}]"#,
        )
        .unwrap();

        let retriever = InstagramRetriever::new(&section, &cookies).unwrap();

        assert_eq!(retriever.session_headers.len(), 2);
        assert!(retriever.session_headers[COOKIE]
            .to_str()
            .unwrap()
            .contains("sessionid=s1"));
        assert_eq!(retriever.session_headers["x-csrftoken"], "tok");
    }

    #[test]
    fn anonymous_retriever_has_no_session_headers() {
        let section: RetrievalSection = toml::from_str(
            r#"
            api_base = "https://www.instagram.com"
            app_id = "936619743392459"
            user_agent = "test-agent"
            request_timeout_seconds = 5
            max_retries = 3
            backoff_seconds = [5, 15]
            caption_words = 6
            max_name_length = 50
            media_extension = "mp4"
            sidecar = "none"
            "#,
        )
        .unwrap();

        let retriever = InstagramRetriever::new(&section, &[]).unwrap();

        assert!(retriever.session_headers.is_empty());
    }
}
