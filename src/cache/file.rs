//! One JSON document per feed, named by the MD5 of the feed URI so every run
//! lands in the same slot.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use md5::{Digest, Md5};

use crate::app::Result;
use crate::domain::Feed;

/// Lowercase hex MD5 of the UTF-8 URI.
pub fn cache_file_name(uri: &str) -> String {
    hex::encode(Md5::digest(uri.as_bytes()))
}

/// Writes the whole feed, read items included. Goes through a temporary file
/// so a crash never leaves a truncated document behind.
pub fn write_feed(path: &Path, feed: &Feed) -> Result<()> {
    let json = serde_json::to_vec_pretty(feed)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// `Ok(None)` when there is no cache file yet.
pub fn read_feed(path: &Path) -> Result<Option<Feed>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Item, ItemStatus};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_file_name_is_md5_hex() {
        // md5("") is a well known constant
        assert_eq!(cache_file_name(""), "d41d8cd98f00b204e9800998ecf8427e");
        let name = cache_file_name("https://a.example/feed");
        assert_eq!(name.len(), 32);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(name, cache_file_name("https://a.example/feed"));
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_feed(&dir.path().join("nope")).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad");
        fs::write(&path, b"{ not json").unwrap();
        assert!(read_feed(&path).is_err());
    }

    #[test]
    fn test_document_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(cache_file_name("u"));
        let mut feed = Feed::new("u");
        feed.title = "T".into();
        feed.last_checked = Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        let mut item = Item::new("a", "https://a");
        item.status = ItemStatus::Read;
        feed.items.push(item);

        write_feed(&path, &feed).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();

        assert_eq!(value["Title"], "T");
        assert_eq!(value["Uri"], "u");
        assert_eq!(value["LastChecked"], "2024-03-01T12:00:00Z");
        assert!(value["LastPublished"].is_null());
        assert_eq!(value["Items"][0]["Status"], "Read");
        assert!(value["Items"][0]["Categories"].is_array());
        assert!(!path.with_extension("tmp").exists());
    }
}
