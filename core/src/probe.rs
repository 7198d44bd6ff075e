//! Range capability and size discovery.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};
use crate::net::{DownloadRequest, NetClient};

/// Last byte requested by the fallback probe, `bytes=0-10` asks for 11 bytes.
const PROBE_RANGE_END: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRange {
    pub supports_range: bool,
    pub content_length: u64,
}

/// Determines the size of the resource at `url` and whether it serves byte ranges.
///
/// An `Accept-Ranges` header settles the question directly. Without one, a
/// second HEAD with `Range: bytes=0-10` is sent and the server is considered
/// range capable only if it answers with an 11 byte length.
pub fn probe(net: &dyn NetClient, url: &str) -> CoreResult<FileRange> {
    let head = net.head(&DownloadRequest::new(url))?;
    if !head.is_success() {
        return Err(CoreError::UnreachableResource {
            url: url.to_string(),
            status: head.status_code,
        });
    }

    let content_length = head
        .content_length
        .ok_or_else(|| CoreError::MissingLength(url.to_string()))?;

    let supports_range = match head.accept_ranges.as_deref() {
        Some(value) => value.eq_ignore_ascii_case("bytes"),
        None => {
            debug!(url, "no Accept-Ranges header, probing with a small range");
            let partial = net.head(&DownloadRequest::new(url).with_range(0, PROBE_RANGE_END))?;
            partial.content_length == Some(PROBE_RANGE_END + 1)
        }
    };

    info!(url, content_length, supports_range, "probed resource");
    Ok(FileRange {
        supports_range,
        content_length,
    })
}
