//! Optional config file loading. Search order: ./tumblr-scraper.toml, then
//! $XDG_CONFIG_HOME/tumblr-scraper/config.toml (or ~/.config/tumblr-scraper/config.toml).

use serde::Deserialize;
use std::path::PathBuf;

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Parent directory for exports when no destination is given. Each blog gets a
    /// subdirectory named after it. Paths are relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Delay in seconds between requests.
    pub request_delay_secs: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Posts per page request (1-50).
    pub page_size: Option<u32>,
    /// Download photos, videos and audio (default true).
    pub include_media: Option<bool>,
    /// Content file format: html (default), markdown, text, or json.
    pub format: Option<String>,
}

/// Search order: (1) ./tumblr-scraper.toml, (2) $XDG_CONFIG_HOME/tumblr-scraper/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("tumblr-scraper.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("tumblr-scraper").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            tracing::debug!(path = %path.display(), "loaded config");
            return Ok(Some(config));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let c: Config = toml::from_str("").unwrap();
        assert!(c.output_dir.is_none());
        assert!(c.user_agent.is_none());
        assert!(c.request_delay_secs.is_none());
        assert!(c.timeout_secs.is_none());
        assert!(c.page_size.is_none());
        assert!(c.include_media.is_none());
        assert!(c.format.is_none());
    }

    #[test]
    fn parse_full_config() {
        let s = r#"
            output_dir = "exports"
            user_agent = "Custom/1.0"
            request_delay_secs = 1
            timeout_secs = 120
            page_size = 20
            include_media = false
            format = "markdown"
        "#;
        let c: Config = toml::from_str(s).unwrap();
        assert_eq!(c.output_dir.as_deref(), Some(std::path::Path::new("exports")));
        assert_eq!(c.user_agent.as_deref(), Some("Custom/1.0"));
        assert_eq!(c.request_delay_secs, Some(1));
        assert_eq!(c.timeout_secs, Some(120));
        assert_eq!(c.page_size, Some(20));
        assert_eq!(c.include_media, Some(false));
        assert_eq!(c.format.as_deref(), Some("markdown"));
    }

    #[test]
    fn parse_partial_config() {
        let c: Config = toml::from_str("page_size = 10").unwrap();
        assert_eq!(c.page_size, Some(10));
        assert!(c.include_media.is_none());
    }

    #[test]
    fn invalid_toml_errors() {
        assert!(toml::from_str::<Config>("output_dir = [").is_err());
        assert!(toml::from_str::<Config>("page_size = \"many\"").is_err());
    }
}
