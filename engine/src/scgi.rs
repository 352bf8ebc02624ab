//! SCGI framing and socket transports.
//!
//! A request is a netstring of NUL separated headers (`CONTENT_LENGTH` first,
//! then `SCGI=1`) followed by the raw body. The daemon answers with HTTP style
//! headers, a blank line and the body, then closes the connection.

use crate::error::RpcError;
use indexmap::IndexMap;
use std::io::{Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

/// Sends one request body and returns the response body.
pub trait Transport: Send + Sync {
    fn request(&self, body: &[u8]) -> Result<Vec<u8>, RpcError>;

    /// Normalized URL of the endpoint, for messages.
    fn url(&self) -> &str;
}

pub fn encode_netstring(data: &[u8]) -> Vec<u8> {
    let mut encoded = format!("{}:", data.len()).into_bytes();
    encoded.extend_from_slice(data);
    encoded.push(b',');
    encoded
}

/// Wrap a body into an SCGI request.
pub fn encode_payload(body: &[u8], headers: &[(String, String)]) -> Vec<u8> {
    let mut prolog = format!("CONTENT_LENGTH\0{}\0SCGI\x001\0", body.len()).into_bytes();
    for (key, value) in headers {
        prolog.extend_from_slice(key.as_bytes());
        prolog.push(0);
        prolog.extend_from_slice(value.as_bytes());
        prolog.push(0);
    }
    let mut payload = encode_netstring(&prolog);
    payload.extend_from_slice(body);
    payload
}

fn parse_headers(block: &[u8]) -> Result<IndexMap<String, String>, RpcError> {
    let text = std::str::from_utf8(block)
        .map_err(|_| RpcError::protocol("SCGI response headers are not valid UTF-8"))?;
    let mut headers = IndexMap::new();
    for line in text.lines().map(str::trim_end).filter(|l| !l.is_empty()) {
        let (key, value) = line
            .split_once(": ")
            .ok_or_else(|| RpcError::protocol(format!("Error in SCGI headers {:?}", text)))?;
        headers.insert(key.to_string(), value.to_string());
    }
    Ok(headers)
}

/// Split an SCGI response into body and headers, checking `Content-Length`.
pub fn parse_response(response: &[u8]) -> Result<(Vec<u8>, IndexMap<String, String>), RpcError> {
    let split = response
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .ok_or_else(|| {
            RpcError::protocol(format!(
                "No header delimiter in SCGI response of length {}",
                response.len()
            ))
        })?;
    let headers = parse_headers(&response[..split])?;
    let body = response[split + 4..].to_vec();

    if let Some(length) = headers.get("Content-Length") {
        let expected: usize = length
            .trim()
            .parse()
            .map_err(|_| RpcError::protocol(format!("Bad Content-Length '{}'", length)))?;
        if expected != body.len() {
            return Err(RpcError::protocol(format!(
                "Content-Length is {} but the body has {} bytes",
                expected,
                body.len()
            )));
        }
    }
    Ok((body, headers))
}

fn exchange<S: Read + Write>(mut stream: S, payload: &[u8]) -> Result<Vec<u8>, RpcError> {
    stream.write_all(payload)?;
    stream.flush()?;
    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;
    let (body, _headers) = parse_response(&response)?;
    Ok(body)
}

#[derive(Debug)]
pub struct TcpTransport {
    url: String,
    address: String,
    headers: Vec<(String, String)>,
    timeout: Duration,
}

impl Transport for TcpTransport {
    fn request(&self, body: &[u8]) -> Result<Vec<u8>, RpcError> {
        let stream = TcpStream::connect(&self.address)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        exchange(stream, &encode_payload(body, &self.headers))
    }

    fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Debug)]
pub struct UnixTransport {
    url: String,
    path: PathBuf,
    headers: Vec<(String, String)>,
    timeout: Duration,
}

impl Transport for UnixTransport {
    #[cfg(unix)]
    fn request(&self, body: &[u8]) -> Result<Vec<u8>, RpcError> {
        let stream = UnixStream::connect(&self.path)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        exchange(stream, &encode_payload(body, &self.headers))
    }

    #[cfg(not(unix))]
    fn request(&self, _body: &[u8]) -> Result<Vec<u8>, RpcError> {
        Err(RpcError::protocol(format!(
            "Unix domain sockets are not supported on this platform ({})",
            self.path.display()
        )))
    }

    fn url(&self) -> &str {
        &self.url
    }
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => format!("{}{}", home.display(), rest),
        _ => path.to_string(),
    }
}

/// Expand the `host:port`, `/path` and `~/path` shorthands into full URLs.
pub fn normalize_url(url: &str) -> String {
    let is_port = |port: &str| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit());
    if !url.contains('/') && url.rsplit_once(':').is_some_and(|(_, port)| is_port(port)) {
        return format!("scgi://{}", url);
    }
    if url.starts_with('/') || url.starts_with('~') {
        return format!("scgi+unix://{}", expand_home(url));
    }
    url.to_string()
}

/// Pick a transport for `scgi://host:port` or `scgi+unix:///path` URLs.
///
/// A query string such as `?rpc=json` is ignored here.
pub fn transport_from_url(
    url: &str,
    headers: Vec<(String, String)>,
    timeout: Duration,
) -> Result<Box<dyn Transport>, RpcError> {
    let url = normalize_url(url);
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| RpcError::protocol(format!("Unsupported URL '{}'", url)))?;
    let target = rest.split('?').next().unwrap_or_default();

    match scheme.to_lowercase().as_str() {
        "scgi" if !target.is_empty() => Ok(Box::new(TcpTransport {
            address: target.trim_end_matches('/').to_string(),
            url: url.clone(),
            headers,
            timeout,
        })),
        "scgi+unix" if !target.is_empty() => Ok(Box::new(UnixTransport {
            path: PathBuf::from(expand_home(target)),
            url: url.clone(),
            headers,
            timeout,
        })),
        _ => Err(RpcError::protocol(format!(
            "Unsupported scheme in URL '{}'",
            url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_netstring() {
        assert_eq!(encode_netstring(b"hello"), b"5:hello,");
        assert_eq!(encode_netstring(b""), b"0:,");
    }

    #[test]
    fn test_payload_framing() {
        let headers = vec![("CONTENT_TYPE".to_string(), "application/json".to_string())];
        let payload = encode_payload(b"{}", &headers);
        let expected: &[u8] = b"54:CONTENT_LENGTH\x002\x00SCGI\x001\x00CONTENT_TYPE\x00application/json\x00,{}";
        assert_eq!(payload, expected);
    }

    #[test]
    fn test_parse_response() {
        let raw = b"Status: 200 OK\r\nContent-Type: text/xml\r\nContent-Length: 5\r\n\r\nhello";
        let (body, headers) = parse_response(raw).unwrap();
        assert_eq!(body, b"hello");
        assert_eq!(headers.get("Content-Type").map(String::as_str), Some("text/xml"));
    }

    #[test]
    fn test_parse_response_errors() {
        assert!(matches!(
            parse_response(b"garbage without delimiter"),
            Err(RpcError::Protocol(_))
        ));
        assert!(matches!(
            parse_response(b"Content-Length: 10\r\n\r\nshort"),
            Err(RpcError::Protocol(_))
        ));
        assert!(matches!(
            parse_response(b"no colon here\r\n\r\nbody"),
            Err(RpcError::Protocol(_))
        ));
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("localhost:5000"), "scgi://localhost:5000");
        assert_eq!(normalize_url("/run/rtorrent.sock"), "scgi+unix:///run/rtorrent.sock");
        assert_eq!(normalize_url("scgi://127.0.0.1:5000"), "scgi://127.0.0.1:5000");
        assert_eq!(normalize_url("http://example.com/RPC2"), "http://example.com/RPC2");
    }

    #[test]
    fn test_transport_from_url() {
        let timeout = Duration::from_secs(1);
        let tcp = transport_from_url("127.0.0.1:5000", vec![], timeout).unwrap();
        assert_eq!(tcp.url(), "scgi://127.0.0.1:5000");
        let unix = transport_from_url("scgi+unix:///tmp/rt.sock?rpc=json", vec![], timeout).unwrap();
        assert_eq!(unix.url(), "scgi+unix:///tmp/rt.sock?rpc=json");
        assert!(transport_from_url("http://example.com/RPC2", vec![], timeout).is_err());
        assert!(transport_from_url("scgi://", vec![], timeout).is_err());
        assert!(transport_from_url("nonsense", vec![], timeout).is_err());
    }
}
