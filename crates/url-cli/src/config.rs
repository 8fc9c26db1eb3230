//! JSON watch-list schema and parsing.
//!
//! Example config file:
//!
//! ```json
//! [
//!   { "url": "https://example.com", "interval": 300 },
//!   { "url": "https://example.org", "interval": 600 }
//! ]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use url_core::WatchItem;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchDef {
    pub url: String,

    /// Check interval in seconds.
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    300
}

fn sample_config() -> Vec<WatchDef> {
    vec![
        WatchDef {
            url: "https://example.com".to_string(),
            interval: 300,
        },
        WatchDef {
            url: "https://example.org".to_string(),
            interval: 600,
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchList {
    pub entries: Vec<WatchDef>,
}

/// Outcome of loading the config file path given on the command line.
#[derive(Debug)]
pub enum LoadResult {
    Loaded(WatchList),
    /// The file was missing; a sample was written for the user to edit.
    SampleCreated,
}

impl WatchList {
    pub fn load(path: &Path) -> Result<LoadResult, String> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Self::write_sample(path)?;
                return Ok(LoadResult::SampleCreated);
            }
            Err(e) => {
                return Err(format!(
                    "Failed to read config file {}: {}",
                    path.display(),
                    e
                ));
            }
        };

        let list: WatchList = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

        list.validate()?;
        Ok(LoadResult::Loaded(list))
    }

    fn write_sample(path: &Path) -> Result<(), String> {
        let sample = serde_json::to_string_pretty(&sample_config())
            .expect("sample config serializes");
        std::fs::write(path, sample).map_err(|e| {
            format!(
                "Failed to write sample config {}: {}",
                path.display(),
                e
            )
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.entries.is_empty() {
            return Err("Config file lists no URLs".into());
        }

        for (i, def) in self.entries.iter().enumerate() {
            let parsed = url::Url::parse(&def.url)
                .map_err(|e| format!("Invalid URL at index {}: {} ({})", i, def.url, e))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(format!("URL must use http or https: {}", def.url));
            }
            if def.interval == 0 {
                return Err(format!("Interval must be positive for {}", def.url));
            }
        }

        let urls: Vec<&str> = self.entries.iter().map(|d| d.url.as_str()).collect();
        let unique: std::collections::HashSet<&str> = urls.iter().copied().collect();
        if unique.len() != urls.len() {
            return Err("Duplicate URLs in config file".into());
        }

        Ok(())
    }

    pub fn to_watch_items(&self) -> Vec<WatchItem> {
        self.entries
            .iter()
            .map(|d| WatchItem::new(&d.url, Duration::from_secs(d.interval)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_watch_list() {
        let json = r#"
[
  { "url": "https://example.com", "interval": 60 },
  { "url": "https://example.org" }
]
"#;
        let list: WatchList = serde_json::from_str(json).unwrap();
        list.validate().unwrap();
        assert_eq!(list.entries.len(), 2);
        assert_eq!(list.entries[0].interval, 60);
        assert_eq!(list.entries[1].interval, 300); // default

        let items = list.to_watch_items();
        assert_eq!(items[0].url, "https://example.com");
        assert_eq!(items[1].interval, Duration::from_secs(300));
    }

    #[test]
    fn validate_rejects_empty_list() {
        let list: WatchList = serde_json::from_str("[]").unwrap();
        let err = list.validate().unwrap_err();
        assert!(err.contains("no URLs"), "{}", err);
    }

    #[test]
    fn validate_rejects_bad_scheme() {
        let json = r#"[{ "url": "ftp://example.com", "interval": 60 }]"#;
        let list: WatchList = serde_json::from_str(json).unwrap();
        let err = list.validate().unwrap_err();
        assert!(err.contains("http or https"), "{}", err);
    }

    #[test]
    fn validate_rejects_invalid_url() {
        let json = r#"[{ "url": "not-a-url", "interval": 60 }]"#;
        let list: WatchList = serde_json::from_str(json).unwrap();
        let err = list.validate().unwrap_err();
        assert!(err.contains("Invalid URL"), "{}", err);
    }

    #[test]
    fn validate_rejects_duplicates() {
        let json = r#"
[
  { "url": "https://example.com", "interval": 60 },
  { "url": "https://example.com", "interval": 120 }
]
"#;
        let list: WatchList = serde_json::from_str(json).unwrap();
        let err = list.validate().unwrap_err();
        assert!(err.contains("Duplicate"), "{}", err);
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let json = r#"[{ "url": "https://example.com", "interval": 0 }]"#;
        let list: WatchList = serde_json::from_str(json).unwrap();
        let err = list.validate().unwrap_err();
        assert!(err.contains("positive"), "{}", err);
    }

    #[test]
    fn missing_file_creates_sample() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("urls.json");

        match WatchList::load(&path).unwrap() {
            LoadResult::SampleCreated => {}
            LoadResult::Loaded(_) => panic!("expected sample creation"),
        }
        assert!(path.exists());

        // The sample round-trips as a valid config.
        match WatchList::load(&path).unwrap() {
            LoadResult::Loaded(list) => {
                assert_eq!(list.entries.len(), 2);
                assert_eq!(list.entries[0].url, "https://example.com");
            }
            LoadResult::SampleCreated => panic!("sample should load"),
        }
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("urls.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = WatchList::load(&path).unwrap_err();
        assert!(err.contains("Failed to parse"), "{}", err);
    }
}
