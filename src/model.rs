//! Canonical data model for scraped posts.
//!
//! Posts are decoded from the v1 read feed into a tagged union over the known post
//! types. Anything the feed labels with a type we do not model is kept as
//! [PostKind::Unknown] with its raw fields so nothing is lost on export.

use crate::formats::html_escape_attr;
use reqwest::Url;
use scraper::{Html, Selector};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Longest asset filename we will write, in characters (extension included).
const MAX_FILENAME_CHARS: usize = 120;

/// One blog entry as returned by the feed. Immutable once decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawPost")]
pub struct Post {
    /// Platform-assigned identifier. Always non-empty and filesystem-safe after sanitizing.
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Unix timestamp (seconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// GMT date string as reported by the feed (e.g. "2012-01-01 00:00:00 GMT").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub kind: PostKind,
}

/// Post content by type. Feed type names: regular, photo, video, audio, link, quote, conversation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PostKind {
    Text(TextPost),
    Photo(PhotoPost),
    Video(VideoPost),
    Audio(AudioPost),
    Link(LinkPost),
    Quote(QuotePost),
    Chat(ChatPost),
    /// A type we do not model. `kind` is the feed's type string; `fields` the remaining raw keys.
    Unknown {
        kind: String,
        fields: Map<String, Value>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TextPost {
    pub regular_title: Option<String>,
    pub regular_body: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PhotoPost {
    pub photo_caption: Option<String>,
    #[serde(rename = "photo-url-1280")]
    pub photo_url: Option<String>,
    /// Photoset entries. Empty for single-photo posts.
    #[serde(default)]
    pub photos: Vec<Photo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Photo {
    #[serde(rename = "photo-url-1280")]
    pub url: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VideoPost {
    pub video_caption: Option<String>,
    /// Either a direct media URL or embed HTML.
    pub video_source: Option<String>,
    pub video_player: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AudioPost {
    pub audio_caption: Option<String>,
    pub audio_player: Option<String>,
    pub id3_artist: Option<String>,
    pub id3_title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LinkPost {
    pub link_text: Option<String>,
    pub link_url: Option<String>,
    pub link_description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct QuotePost {
    pub quote_text: Option<String>,
    pub quote_source: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChatPost {
    pub conversation_title: Option<String>,
    pub conversation_text: Option<String>,
    #[serde(default)]
    pub conversation: Vec<ChatLine>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatLine {
    pub name: Option<String>,
    pub label: Option<String>,
    pub phrase: Option<String>,
}

/// A downloadable file referenced by exactly one post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Asset {
    pub url: String,
    /// Filename inside the post directory. Unique within the post.
    pub filename: String,
}

/// Wire shape of one post. Common keys are pulled out; the rest stays raw until
/// the type is known.
#[derive(Deserialize)]
struct RawPost {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    url: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "unix-timestamp")]
    unix_timestamp: Option<i64>,
    #[serde(rename = "date-gmt")]
    date_gmt: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl TryFrom<RawPost> for Post {
    type Error = String;

    fn try_from(raw: RawPost) -> Result<Self, Self::Error> {
        let id = raw.id.trim().to_string();
        if sanitize_filename_component(&id).is_empty() {
            return Err(format!("post has unusable id {:?}", raw.id));
        }
        let kind = PostKind::from_fields(&raw.kind, raw.fields)
            .map_err(|e| format!("post {}: invalid {} fields: {}", id, raw.kind, e))?;
        Ok(Post {
            id,
            url: raw.url,
            timestamp: raw.unix_timestamp,
            date: raw.date_gmt,
            tags: raw.tags,
            kind,
        })
    }
}

fn decode<T: DeserializeOwned>(fields: Map<String, Value>) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(fields))
}

impl PostKind {
    /// Decode the type-specific fields for a feed type name.
    pub fn from_fields(kind: &str, fields: Map<String, Value>) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            "regular" | "text" => PostKind::Text(decode(fields)?),
            "photo" => PostKind::Photo(decode(fields)?),
            "video" => PostKind::Video(decode(fields)?),
            "audio" => PostKind::Audio(decode(fields)?),
            "link" => PostKind::Link(decode(fields)?),
            "quote" => PostKind::Quote(decode(fields)?),
            "conversation" | "chat" => PostKind::Chat(decode(fields)?),
            other => PostKind::Unknown {
                kind: other.to_string(),
                fields,
            },
        })
    }

    pub fn name(&self) -> &str {
        match self {
            PostKind::Text(_) => "text",
            PostKind::Photo(_) => "photo",
            PostKind::Video(_) => "video",
            PostKind::Audio(_) => "audio",
            PostKind::Link(_) => "link",
            PostKind::Quote(_) => "quote",
            PostKind::Chat(_) => "chat",
            PostKind::Unknown { kind, .. } => kind,
        }
    }
}

/// Accept `"123"` or `123`; the feed is not consistent about it.
fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// Lenient optional count: number, numeric string, or absent/null/false.
pub(crate) fn opt_count<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Post {
    /// Directory name for this post: the sanitized id.
    pub fn dir_name(&self) -> String {
        sanitize_filename_component(&self.id)
    }

    pub fn title(&self) -> Option<&str> {
        match &self.kind {
            PostKind::Text(p) => non_empty(&p.regular_title),
            PostKind::Link(p) => non_empty(&p.link_text),
            PostKind::Chat(p) => non_empty(&p.conversation_title),
            PostKind::Audio(p) => non_empty(&p.id3_title),
            _ => None,
        }
    }

    /// Main content as an HTML fragment: body for text posts, caption for media posts.
    pub fn body_html(&self) -> String {
        match &self.kind {
            PostKind::Text(p) => p.regular_body.clone().unwrap_or_default(),
            PostKind::Photo(p) => {
                let mut out = p.photo_caption.clone().unwrap_or_default();
                for photo in &p.photos {
                    if let Some(c) = non_empty(&photo.caption) {
                        out.push_str(&format!("<p>{}</p>", html_escape_attr(c)));
                    }
                }
                out
            }
            PostKind::Video(p) => p.video_caption.clone().unwrap_or_default(),
            PostKind::Audio(p) => {
                let mut out = String::new();
                if let Some(artist) = non_empty(&p.id3_artist) {
                    out.push_str(&format!("<p>{}</p>", html_escape_attr(artist)));
                }
                out.push_str(p.audio_caption.as_deref().unwrap_or(""));
                out
            }
            PostKind::Link(p) => {
                let mut out = String::new();
                if let Some(url) = non_empty(&p.link_url) {
                    let text = non_empty(&p.link_text).unwrap_or(url);
                    out.push_str(&format!(
                        "<p><a href=\"{}\">{}</a></p>",
                        html_escape_attr(url),
                        html_escape_attr(text)
                    ));
                }
                out.push_str(p.link_description.as_deref().unwrap_or(""));
                out
            }
            PostKind::Quote(p) => {
                let mut out = format!(
                    "<blockquote>{}</blockquote>",
                    p.quote_text.as_deref().unwrap_or("")
                );
                if let Some(source) = non_empty(&p.quote_source) {
                    out.push_str(&format!("<p>{}</p>", source));
                }
                out
            }
            PostKind::Chat(p) => {
                if p.conversation.is_empty() {
                    let text = p.conversation_text.as_deref().unwrap_or("");
                    return text
                        .lines()
                        .filter(|l| !l.trim().is_empty())
                        .map(|l| format!("<p>{}</p>", html_escape_attr(l.trim())))
                        .collect();
                }
                p.conversation
                    .iter()
                    .map(|line| {
                        let label = line
                            .label
                            .as_deref()
                            .or(line.name.as_deref())
                            .unwrap_or("");
                        format!(
                            "<p><strong>{}</strong> {}</p>",
                            html_escape_attr(label.trim()),
                            html_escape_attr(line.phrase.as_deref().unwrap_or("").trim())
                        )
                    })
                    .collect()
            }
            PostKind::Unknown { fields, .. } => {
                let json = serde_json::to_string_pretty(fields).unwrap_or_default();
                format!("<pre>{}</pre>", html_escape_attr(&json))
            }
        }
    }

    /// Media URLs referenced by this post, in feed order, without duplicates.
    pub fn asset_urls(&self) -> Vec<String> {
        let candidates: Vec<String> = match &self.kind {
            PostKind::Photo(p) => {
                let set: Vec<String> = p.photos.iter().filter_map(|ph| ph.url.clone()).collect();
                if set.is_empty() {
                    p.photo_url.iter().cloned().collect()
                } else {
                    set
                }
            }
            PostKind::Video(p) => match non_empty(&p.video_source) {
                Some(src) if is_http_url(src) => vec![src.to_string()],
                _ => p
                    .video_player
                    .as_deref()
                    .map(|html| select_attr(html, "video[src], video source[src]", "src"))
                    .unwrap_or_default(),
            },
            PostKind::Audio(p) => p
                .audio_player
                .as_deref()
                .map(audio_urls_from_player)
                .unwrap_or_default(),
            PostKind::Text(p) => p
                .regular_body
                .as_deref()
                .map(|html| select_attr(html, "img[src]", "src"))
                .unwrap_or_default(),
            PostKind::Link(_) | PostKind::Quote(_) | PostKind::Chat(_) | PostKind::Unknown { .. } => {
                Vec::new()
            }
        };
        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .map(|u| u.trim().to_string())
            .filter(|u| is_http_url(u) && seen.insert(u.clone()))
            .collect()
    }

    /// [Post::body_html] with every `src` that names one of `assets` pointing at its local file.
    pub fn body_html_local(&self, assets: &[Asset]) -> String {
        let mut body = self.body_html();
        for asset in assets {
            let local = html_escape_attr(&asset.filename);
            for remote in [asset.url.clone(), html_escape_attr(&asset.url)] {
                for q in ['"', '\''] {
                    body = body.replace(
                        &format!("src={q}{remote}{q}"),
                        &format!("src={q}{local}{q}"),
                    );
                }
            }
        }
        body
    }

    /// Assets with filenames unique within the post. `reserved` (the content file) is never reused.
    pub fn assets(&self, reserved: &str) -> Vec<Asset> {
        let mut used: HashSet<String> = HashSet::new();
        used.insert(reserved.to_string());
        self.asset_urls()
            .into_iter()
            .enumerate()
            .map(|(i, url)| {
                let base = filename_from_url(&url).unwrap_or_else(|| format!("asset-{}", i + 1));
                let filename = unique_name(&base, &mut used);
                Asset { url, filename }
            })
            .collect()
    }
}

fn is_http_url(s: &str) -> bool {
    Url::parse(s)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Collect attribute values of elements matching `selector` in an HTML fragment.
fn select_attr(html: &str, selector: &str, attr: &str) -> Vec<String> {
    let Ok(sel) = Selector::parse(selector) else {
        return Vec::new();
    };
    let fragment = Html::parse_fragment(html);
    fragment
        .select(&sel)
        .filter_map(|el| el.value().attr(attr))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Audio player embeds carry the file in an `audio_file` query parameter; newer
/// players use a plain `<audio>`/`<source>` element.
fn audio_urls_from_player(html: &str) -> Vec<String> {
    let mut out = select_attr(html, "audio[src], audio source[src]", "src");
    let base = Url::parse("https://www.tumblr.com/").ok();
    for src in select_attr(html, "embed[src], iframe[src]", "src") {
        let parsed = match &base {
            Some(b) => b.join(&src),
            None => Url::parse(&src),
        };
        if let Ok(u) = parsed {
            if let Some((_, file)) = u.query_pairs().find(|(k, _)| k == "audio_file") {
                out.push(file.into_owned());
            }
        }
    }
    out
}

/// Sanitized last path segment of the URL, or None if it has no usable name.
pub(crate) fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    let name = sanitize_filename_component(last);
    let name = name.trim_start_matches('.');
    if name.is_empty() {
        return None;
    }
    Some(truncate_filename(name))
}

fn truncate_filename(name: &str) -> String {
    if name.chars().count() <= MAX_FILENAME_CHARS {
        return name.to_string();
    }
    let (stem, ext) = split_extension(name);
    let keep = MAX_FILENAME_CHARS.saturating_sub(ext.chars().count()).max(1);
    let stem: String = stem.chars().take(keep).collect();
    format!("{}{}", stem, ext)
}

/// Split "a.tar.gz" into ("a.tar", ".gz"). Names without a dot have an empty extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    }
}

fn unique_name(base: &str, used: &mut HashSet<String>) -> String {
    if used.insert(base.to_string()) {
        return base.to_string();
    }
    let (stem, ext) = split_extension(base);
    let mut n = 2u32;
    loop {
        let candidate = format!("{}-{}{}", stem, n, ext);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Replace path separators, reserved and control characters with `_`, collapsing runs.
pub(crate) fn sanitize_filename_component(value: &str) -> String {
    let mut out = String::new();
    let mut prev_sep = false;
    for ch in value.chars() {
        let mapped = match ch {
            c if c.is_alphanumeric() || matches!(c, '-' | '.') => c,
            _ => '_',
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.chars().all(|c| c == '.') {
        return String::new();
    }
    trimmed.to_string()
}
