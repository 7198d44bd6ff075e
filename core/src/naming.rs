//! Output filename derivation from a resource URL.

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use url::Url;

pub const FALLBACK_FILENAME: &str = "download.bin";

/// Last path segment of `url`, percent-decoded, without query or fragment.
///
/// Input that does not parse as an absolute URL is treated as a bare path.
pub fn filename_from_url(url: &str) -> Option<String> {
    let raw = match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or("")
            .to_string(),
        Err(_) => {
            let path = url.split(['?', '#']).next().unwrap_or("");
            path.rsplit('/').next().unwrap_or("").to_string()
        }
    };

    let decoded = percent_decode_str(&raw).decode_utf8_lossy();
    let name: String = decoded
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | '\0' => '_',
            _ => ch,
        })
        .collect();
    let name = name.trim();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

pub fn output_path(url: &str, dir: impl AsRef<Path>) -> PathBuf {
    let name = filename_from_url(url).unwrap_or_else(|| FALLBACK_FILENAME.to_string());
    dir.as_ref().join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_from_urls() {
        assert_eq!(
            filename_from_url("https://godown.me/resource1.jpg").as_deref(),
            Some("resource1.jpg")
        );
        assert_eq!(
            filename_from_url("https://godown.me/resource1.jpg?q=1").as_deref(),
            Some("resource1.jpg")
        );
        assert_eq!(
            filename_from_url("resource1.jpg").as_deref(),
            Some("resource1.jpg")
        );
        assert_eq!(
            filename_from_url("https://godown.me/this%20is%20a%20resource.jpg?q=1").as_deref(),
            Some("this is a resource.jpg")
        );
    }

    #[test]
    fn encoded_separators_do_not_escape_the_directory() {
        assert_eq!(
            filename_from_url("https://host/a%2F..%2Fetc").as_deref(),
            Some("a_.._etc")
        );
        assert_eq!(filename_from_url("https://host/%2E%2E"), None);
    }

    #[test]
    fn falls_back_when_no_name() {
        assert_eq!(filename_from_url("https://host/"), None);
        assert_eq!(
            output_path("https://host/", "/tmp/dl"),
            PathBuf::from("/tmp/dl").join(FALLBACK_FILENAME)
        );
    }
}
