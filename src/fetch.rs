//! The boundary to whatever transports calendar bytes onto the device.
//!
//! The parser never performs I/O itself; it only consumes byte chunks. A
//! fetcher turns a configured source URL into those bytes, and everything
//! about sockets, TLS and redirects stays on its side of the trait.

use std::fs;

use crate::provider::{Error, Result};

pub trait Fetchlike {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetcher for local `.ics` files, with or without a `file://` prefix.
/// Stands in for the network client during development and in tests.
#[derive(Debug, Default)]
pub struct FileFetcher;

impl Fetchlike for FileFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let path = url.strip_prefix("file://").unwrap_or(url);
        fs::read(path).map_err(|source| Error::Fetch {
            url: url.to_owned(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_plain_paths_and_file_urls() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"BEGIN:VCALENDAR").unwrap();
        let path = file.path().to_str().unwrap().to_owned();

        let fetcher = FileFetcher;
        assert_eq!(fetcher.fetch(&path).unwrap(), b"BEGIN:VCALENDAR");
        assert_eq!(
            fetcher.fetch(&format!("file://{}", path)).unwrap(),
            b"BEGIN:VCALENDAR"
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let fetcher = FileFetcher;
        assert!(fetcher.fetch("/no/such/calendar.ics").is_err());
    }
}
