//! Per-post content files: HTML, Markdown, plain text, and JSON.
//! Each writer renders one post (plus the local names of its assets) deterministically.

use crate::model::{Asset, Post};
use scraper::Html;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Content file format selector for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Html,
    Markdown,
    Text,
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Markdown => "md",
            OutputFormat::Text => "txt",
            OutputFormat::Json => "json",
        }
    }

    /// Name of the content file inside a post directory.
    pub fn content_filename(self) -> String {
        format!("post.{}", self.extension())
    }
}

/// Errors from the content writers.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Failed to write output: {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write output: {0}")]
    Write(#[from] std::io::Error),

    #[error("Failed to encode post as JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub(crate) fn html_escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Strip HTML from a post body to plain text using scraper.
pub(crate) fn body_to_plain_text(body: &str) -> String {
    let fragment = Html::parse_fragment(body);
    let root = fragment.root_element();
    let text: String = root.text().collect();
    if text.trim().is_empty() {
        body.to_string().trim().to_string()
    } else {
        text.trim().to_string()
    }
}

fn is_image(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    [".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

fn heading(post: &Post) -> String {
    post.title()
        .map(String::from)
        .unwrap_or_else(|| format!("Post {}", post.id))
}

/// Write the content file for `post` at `path` in the given format.
pub fn write_post(
    post: &Post,
    assets: &[Asset],
    path: &Path,
    format: OutputFormat,
) -> Result<(), FormatError> {
    let file = File::create(path).map_err(|e| FormatError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut f = BufWriter::new(file);
    match format {
        OutputFormat::Html => write_html(post, assets, &mut f)?,
        OutputFormat::Markdown => write_markdown(post, assets, &mut f)?,
        OutputFormat::Text => write_text(post, assets, &mut f)?,
        OutputFormat::Json => write_json(post, assets, &mut f)?,
    }
    f.flush().map_err(|e| FormatError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Standalone HTML page: heading, metadata, body, then the post's local assets.
pub fn write_html<W: Write>(post: &Post, assets: &[Asset], f: &mut W) -> std::io::Result<()> {
    let title_esc = html_escape_attr(&heading(post));

    writeln!(f, r#"<!DOCTYPE html>"#)?;
    writeln!(f, r#"<html lang="en">"#)?;
    writeln!(f, r#"<head>"#)?;
    writeln!(f, r#"  <meta charset="UTF-8"/>"#)?;
    writeln!(f, r#"  <title>{}</title>"#, title_esc)?;
    writeln!(f, r#"</head>"#)?;
    writeln!(f, r#"<body>"#)?;
    writeln!(f, r#"  <article class="post post-{}">"#, html_escape_attr(post.kind.name()))?;
    writeln!(f, r#"    <header>"#)?;
    writeln!(f, r#"      <h1>{}</h1>"#, title_esc)?;
    if let Some(ref date) = post.date {
        writeln!(f, r#"      <p class="date">{}</p>"#, html_escape_attr(date))?;
    }
    if let Some(ref url) = post.url {
        let url_esc = html_escape_attr(url);
        writeln!(f, r#"      <p class="source"><a href="{}">{}</a></p>"#, url_esc, url_esc)?;
    }
    writeln!(f, r#"    </header>"#)?;
    writeln!(f, r#"    <div class="post-body">"#)?;
    f.write_all(post.body_html_local(assets).as_bytes())?;
    writeln!(f)?;
    writeln!(f, r#"    </div>"#)?;
    if !assets.is_empty() {
        writeln!(f, r#"    <div class="assets">"#)?;
        for asset in assets {
            let name = html_escape_attr(&asset.filename);
            if is_image(&asset.filename) {
                writeln!(f, r#"      <img src="{}" alt="{}"/>"#, name, name)?;
            } else {
                writeln!(f, r#"      <p><a href="{}">{}</a></p>"#, name, name)?;
            }
        }
        writeln!(f, r#"    </div>"#)?;
    }
    if !post.tags.is_empty() {
        writeln!(f, r#"    <ul class="tags">"#)?;
        for tag in &post.tags {
            writeln!(f, r#"      <li>{}</li>"#, html_escape_attr(tag))?;
        }
        writeln!(f, r#"    </ul>"#)?;
    }
    writeln!(f, r#"  </article>"#)?;
    writeln!(f, r#"</body>"#)?;
    writeln!(f, r#"</html>"#)?;
    Ok(())
}

/// Markdown: `# heading`, metadata lines, body converted from HTML, asset links, tags.
pub fn write_markdown<W: Write>(post: &Post, assets: &[Asset], f: &mut W) -> std::io::Result<()> {
    writeln!(f, "# {}", heading(post))?;
    writeln!(f)?;
    if let Some(ref date) = post.date {
        writeln!(f, "Date: {}", date)?;
    }
    if let Some(ref url) = post.url {
        writeln!(f, "Source: <{}>", url)?;
    }
    writeln!(f)?;
    let md = html2md::parse_html(&post.body_html_local(assets));
    if !md.trim().is_empty() {
        writeln!(f, "{}", md.trim())?;
        writeln!(f)?;
    }
    for asset in assets {
        if is_image(&asset.filename) {
            writeln!(f, "![{}]({})", asset.filename, asset.filename)?;
        } else {
            writeln!(f, "[{}]({})", asset.filename, asset.filename)?;
        }
    }
    if !assets.is_empty() {
        writeln!(f)?;
    }
    if !post.tags.is_empty() {
        let tags: Vec<String> = post.tags.iter().map(|t| format!("#{}", t)).collect();
        writeln!(f, "Tags: {}", tags.join(" "))?;
    }
    Ok(())
}

/// Plain text: heading, metadata, stripped body, asset filenames.
pub fn write_text<W: Write>(post: &Post, assets: &[Asset], f: &mut W) -> std::io::Result<()> {
    writeln!(f, "{}", heading(post))?;
    if let Some(ref date) = post.date {
        writeln!(f, "{}", date)?;
    }
    if let Some(ref url) = post.url {
        writeln!(f, "{}", url)?;
    }
    writeln!(f)?;
    let text = body_to_plain_text(&post.body_html());
    if !text.is_empty() {
        writeln!(f, "{}", text)?;
        writeln!(f)?;
    }
    for asset in assets {
        writeln!(f, "[{}]", asset.filename)?;
    }
    if !post.tags.is_empty() {
        writeln!(f, "Tags: {}", post.tags.join(", "))?;
    }
    Ok(())
}

#[derive(Serialize)]
struct PostRecord<'a> {
    post: &'a Post,
    assets: &'a [Asset],
}

/// Pretty JSON of the decoded post and its assets. Map keys are sorted, so output is stable.
pub fn write_json<W: Write>(post: &Post, assets: &[Asset], f: &mut W) -> Result<(), FormatError> {
    serde_json::to_writer_pretty(&mut *f, &PostRecord { post, assets })?;
    writeln!(f)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_post() -> Post {
        serde_json::from_value(json!({
            "id": "101",
            "url": "https://example.tumblr.com/post/101",
            "type": "regular",
            "date-gmt": "2012-01-01 00:00:00 GMT",
            "regular-title": "First & Best",
            "regular-body": "<p>First paragraph.</p><p>Second paragraph.</p>",
            "tags": ["rust"]
        }))
        .unwrap()
    }

    fn assets() -> Vec<Asset> {
        vec![
            Asset {
                url: "https://x.com/a.jpg".to_string(),
                filename: "a.jpg".to_string(),
            },
            Asset {
                url: "https://x.com/b.mp4".to_string(),
                filename: "b.mp4".to_string(),
            },
        ]
    }

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> std::io::Result<()>,
    {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn html_contains_title_body_and_local_assets() {
        let post = text_post();
        let out = render(|w| write_html(&post, &assets(), w));
        assert!(out.contains("<title>First &amp; Best</title>"));
        assert!(out.contains("<p>First paragraph.</p>"));
        assert!(out.contains(r#"<img src="a.jpg" alt="a.jpg"/>"#));
        assert!(out.contains(r#"<a href="b.mp4">b.mp4</a>"#));
        assert!(out.contains("<li>rust</li>"));
        assert!(!out.contains("https://x.com/a.jpg"));
    }

    #[test]
    fn inline_images_link_the_downloaded_copy() {
        let post: Post = serde_json::from_value(json!({
            "id": "7",
            "type": "regular",
            "regular-body": "<p>Look:</p><img src=\"https://media.example/cat.gif\"/>"
        }))
        .unwrap();
        let assets = post.assets("post.html");
        assert_eq!(assets[0].filename, "cat.gif");

        let html = render(|w| write_html(&post, &assets, w));
        assert!(html.contains(r#"<img src="cat.gif"/>"#));
        assert!(!html.contains("https://media.example/cat.gif"));

        let md = render(|w| write_markdown(&post, &assets, w));
        assert!(md.contains("(cat.gif)"));
        assert!(!md.contains("https://media.example/cat.gif"));
    }

    #[test]
    fn markdown_has_heading_and_no_raw_p_tags() {
        let post = text_post();
        let out = render(|w| write_markdown(&post, &assets(), w));
        assert!(out.starts_with("# First & Best"));
        assert!(out.contains("First paragraph"));
        assert!(out.contains("![a.jpg](a.jpg)"));
        assert!(out.contains("[b.mp4](b.mp4)"));
        assert!(out.contains("Tags: #rust"));
        assert!(!out.contains("<p>"));
    }

    #[test]
    fn text_strips_tags() {
        let post = text_post();
        let out = render(|w| write_text(&post, &[], w));
        assert!(out.starts_with("First & Best\n"));
        assert!(out.contains("First paragraph."));
        assert!(!out.contains("<p>"));
    }

    #[test]
    fn heading_falls_back_to_post_id() {
        let post: Post =
            serde_json::from_value(json!({"id": "55", "type": "photo", "photo-caption": "c"}))
                .unwrap();
        let out = render(|w| write_text(&post, &[], w));
        assert!(out.starts_with("Post 55\n"));
    }

    #[test]
    fn json_record_contains_post_and_assets() {
        let post = text_post();
        let mut buf = Vec::new();
        write_json(&post, &assets(), &mut buf).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(v["post"]["id"], "101");
        assert_eq!(v["post"]["type"], "text");
        assert_eq!(v["assets"][1]["filename"], "b.mp4");
    }

    #[test]
    fn write_post_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let post = text_post();
        let a = dir.path().join("a.html");
        let b = dir.path().join("b.html");
        write_post(&post, &assets(), &a, OutputFormat::Html).unwrap();
        write_post(&post, &assets(), &b, OutputFormat::Html).unwrap();
        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    }

    #[test]
    fn write_post_reports_path_on_failure() {
        let path = Path::new("/nonexistent_dir_tumblr_scraper_xyz/post.html");
        let result = write_post(&text_post(), &[], path, OutputFormat::Html);
        assert!(matches!(result, Err(FormatError::Io { .. })));
    }

    #[test]
    fn content_filename_per_format() {
        assert_eq!(OutputFormat::Html.content_filename(), "post.html");
        assert_eq!(OutputFormat::Markdown.content_filename(), "post.md");
        assert_eq!(OutputFormat::Text.content_filename(), "post.txt");
        assert_eq!(OutputFormat::Json.content_filename(), "post.json");
    }

    #[test]
    fn body_to_plain_text_multiple_p() {
        let out = body_to_plain_text("<p>A</p><p>B</p>");
        assert!(out.contains('A'));
        assert!(out.contains('B'));
    }

    #[test]
    fn body_to_plain_text_plain_text_fallback() {
        assert_eq!(body_to_plain_text("No tags here."), "No tags here.");
    }

    #[test]
    fn html_escape_attr_escapes_special_chars() {
        assert_eq!(html_escape_attr("a & b"), "a &amp; b");
        assert_eq!(html_escape_attr("<tag>"), "&lt;tag&gt;");
        assert_eq!(html_escape_attr(r#"say "hi""#), "say &quot;hi&quot;");
    }
}
