//! Input validation before any fetch work.
//!
//! [`UrlValidator`] decides whether a candidate URL is an in-scope image
//! reference. The private-network check is lexical: it inspects the hostname
//! as written and never resolves it, so a public name that resolves to a
//! private address (DNS rebinding) passes. Treat it as a fast pre-filter, not
//! as an SSRF boundary.

use url::Url;

use crate::config::IngestConfig;

/// Classifies candidate URLs against the scheme and host allow-lists.
#[derive(Debug, Clone)]
pub struct UrlValidator {
    allowed_domains: Vec<String>,
}

impl UrlValidator {
    /// Create a validator from the ingestion settings.
    pub fn new(config: &IngestConfig) -> Self {
        Self::with_domains(config.allowed_domains.iter().cloned())
    }

    /// Create a validator for an explicit allow-list.
    pub fn with_domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_domains: domains
                .into_iter()
                .map(|d| d.into().trim().to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    /// Check whether `url` may be fetched.
    ///
    /// Checks:
    /// - URL parses and uses http or https
    /// - Host equals, or is a subdomain of, an allow-listed domain
    /// - Host is not a loopback or private-range literal
    pub fn is_valid(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };

        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }

        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();

        if !self.is_allowed_host(&host) {
            return false;
        }

        !is_private_host(&host)
    }

    /// Count the URLs in `urls` that fail [`is_valid`](Self::is_valid).
    pub fn count_invalid<S: AsRef<str>>(&self, urls: &[S]) -> usize {
        urls.iter().filter(|u| !self.is_valid(u.as_ref())).count()
    }

    fn is_allowed_host(&self, host: &str) -> bool {
        self.allowed_domains.iter().any(|domain| {
            host == domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// Check if the leading bytes match a known raster image signature.
    ///
    /// Run against fetched bodies so a server that labels arbitrary bytes as
    /// `image/*` is turned away before decoding.
    pub fn is_valid_image_header(header: &[u8]) -> bool {
        if header.len() < 4 {
            return false;
        }

        // JPEG: FF D8 FF
        if header.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return true;
        }

        // PNG: 89 50 4E 47
        if header.starts_with(&[0x89, b'P', b'N', b'G']) {
            return true;
        }

        // GIF: GIF8
        if header.starts_with(b"GIF8") {
            return true;
        }

        // WebP: RIFF....WEBP
        if header.starts_with(b"RIFF") {
            return header.len() < 12 || &header[8..12] == b"WEBP";
        }

        // BMP: BM
        if header.starts_with(b"BM") {
            return true;
        }

        // TIFF: II*\0 or MM\0*
        if header.starts_with(&[b'I', b'I', 0x2A, 0x00])
            || header.starts_with(&[b'M', b'M', 0x00, 0x2A])
        {
            return true;
        }

        // AVIF/HEIF: ftyp box at offset 4
        header.len() >= 12 && &header[4..8] == b"ftyp"
    }
}

/// Loopback and RFC 1918 literals, matched on the hostname text.
fn is_private_host(host: &str) -> bool {
    if matches!(host, "localhost" | "127.0.0.1" | "[::1]") {
        return true;
    }
    if host.starts_with("10.") || host.starts_with("192.168.") {
        return true;
    }
    (16..=31).any(|octet| host.starts_with(&format!("172.{octet}.")))
}
