//! Binary ↔ text conversions used at the store boundary
//!
//! 证书使用带 `CERTIFICATE` 头的 base64，证书请求使用
//! `NEW CERTIFICATE REQUEST` 头，PKCS#12 使用不带头的 base64。

use base64::{engine::general_purpose, Engine as _};

use crate::error::{BackendError, BackendResult, PkiError, Result};

/// Largest payload the backend can address (32-bit lengths)
pub const MAX_INPUT_LEN: usize = u32::MAX as usize;

const CERTIFICATE_LABEL: &str = "CERTIFICATE";
const REQUEST_LABEL: &str = "NEW CERTIFICATE REQUEST";
const LINE_WIDTH: usize = 64;

/// Text framing of base64 payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `-----BEGIN CERTIFICATE-----`
    Header,
    /// `-----BEGIN NEW CERTIFICATE REQUEST-----`
    RequestHeader,
    /// Bare base64, 64 columns, CRLF line ends
    Plain,
}

/// Encode binary data as base64 text with the requested framing
pub fn encode(data: &[u8], framing: Framing) -> String {
    match framing {
        Framing::Header => pem::encode(&pem::Pem::new(CERTIFICATE_LABEL, data.to_vec())),
        Framing::RequestHeader => pem::encode(&pem::Pem::new(REQUEST_LABEL, data.to_vec())),
        Framing::Plain => {
            let b64 = general_purpose::STANDARD.encode(data);
            let mut out = String::with_capacity(b64.len() + b64.len() / LINE_WIDTH * 2 + 2);
            for chunk in b64.as_bytes().chunks(LINE_WIDTH) {
                // chunks of an ASCII string are valid UTF-8
                out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
                out.push_str("\r\n");
            }
            out
        }
    }
}

/// Decode header-framed base64 (any PEM label)
pub fn decode_header(text: &str) -> BackendResult<Vec<u8>> {
    let parsed = pem::parse(text)
        .map_err(|e| BackendError::invalid_data(format!("Failed to parse PEM: {}", e)))?;
    Ok(parsed.into_contents())
}

/// Decode base64 with or without header framing
pub fn decode_any(text: &str) -> BackendResult<Vec<u8>> {
    if text.trim_start().starts_with("-----BEGIN") {
        return decode_header(text);
    }

    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(BackendError::invalid_data("Empty base64 input"));
    }
    general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| BackendError::invalid_data(format!("Failed to decode base64: {}", e)))
}

/// Reject payloads larger than the backend can address
pub fn ensure_addressable(len: usize) -> Result<()> {
    check_len(len, MAX_INPUT_LEN)
}

fn check_len(len: usize, max: usize) -> Result<()> {
    if len > max {
        return Err(PkiError::Overflow { size: len, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_framing() {
        let text = encode(b"\x30\x03\x02\x01\x01", Framing::Header);
        assert!(text.starts_with("-----BEGIN CERTIFICATE-----"));
        assert_eq!(decode_header(&text).unwrap(), b"\x30\x03\x02\x01\x01");
    }

    #[test]
    fn test_request_header_framing() {
        let text = encode(b"request", Framing::RequestHeader);
        assert!(text.starts_with("-----BEGIN NEW CERTIFICATE REQUEST-----"));
        assert!(text.trim_end().ends_with("-----END NEW CERTIFICATE REQUEST-----"));
    }

    #[test]
    fn test_plain_framing_wraps_lines() {
        let data = vec![0xABu8; 100];
        let text = encode(&data, Framing::Plain);

        assert!(!text.contains("-----"));
        let lines: Vec<&str> = text.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.len() <= LINE_WIDTH));
        assert_eq!(decode_any(&text).unwrap(), data);
    }

    #[test]
    fn test_decode_any_accepts_pem() {
        let text = encode(b"payload", Framing::Header);
        assert_eq!(decode_any(&text).unwrap(), b"payload");
    }

    #[test]
    fn test_decode_errors() {
        assert!(decode_header("not pem").is_err());
        assert!(decode_any("   ").is_err());
        assert!(decode_any("@@@@").is_err());
    }

    #[test]
    fn test_overflow_check() {
        assert!(check_len(4, 4).is_ok());
        assert!(matches!(
            check_len(5, 4),
            Err(PkiError::Overflow { size: 5, max: 4 })
        ));
        assert!(ensure_addressable(1024).is_ok());
    }
}
