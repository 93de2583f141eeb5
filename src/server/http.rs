//! Minimal HTTP/1.x request parsing and response writing.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::time::Duration;

const MAX_REQUEST_BYTES: usize = 8192;

#[derive(Debug)]
pub(crate) struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
}

/// Read one request head. The body, if any, is ignored.
pub(crate) fn read_request<S: Read>(stream: &mut S) -> Result<HttpRequest> {
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    parse_request(&data)
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

fn parse_request(data: &[u8]) -> Result<HttpRequest> {
    let text = String::from_utf8_lossy(data);
    let mut lines = text.split("\r\n");
    let request_line = lines
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
    })
}

pub(crate) fn status_line(status: u16) -> &'static str {
    match status {
        200 => "HTTP/1.1 200 OK",
        301 => "HTTP/1.1 301 Moved Permanently",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    }
}

pub(crate) fn write_response<S: Write>(
    stream: &mut S,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    write_response_with(stream, status, content_type, &[], body)
}

/// `write_response` plus `extra` headers, written before the standard ones.
fn write_response_with<S: Write>(
    stream: &mut S,
    status: u16,
    content_type: &str,
    extra: &[(&str, &str)],
    body: &[u8],
) -> Result<()> {
    let mut header = format!("{}\r\n", status_line(status));
    for (name, value) in extra {
        header.push_str(&format!("{}: {}\r\n", name, value));
    }
    header.push_str(&format!(
        "Content-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        content_type,
        body.len()
    ));
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}

pub(crate) fn write_redirect<S: Write>(stream: &mut S, location: &str) -> Result<()> {
    let header = format!(
        "{status_line}\r\nLocation: {location}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status_line = status_line(301),
        location = location
    );
    stream.write_all(header.as_bytes())?;
    stream.flush()?;
    Ok(())
}

pub(crate) fn write_error<S: Write>(stream: &mut S, status: u16) -> Result<()> {
    write_error_with(stream, status, &[])
}

/// 405 listing the methods the server accepts.
pub(crate) fn write_method_not_allowed<S: Write>(stream: &mut S, allow: &str) -> Result<()> {
    write_error_with(stream, 405, &[("Allow", allow)])
}

fn write_error_with<S: Write>(stream: &mut S, status: u16, extra: &[(&str, &str)]) -> Result<()> {
    let reason = status_line(status).splitn(3, ' ').nth(2).unwrap_or("Error");
    let body = format!(
        "<html><head><title>{reason}</title></head><body><h1>{reason}</h1></body></html>\n",
        reason = reason
    );
    write_response_with(stream, status, "text/html; charset=utf-8", extra, body.as_bytes())
}

/// Read timeout applied while waiting for the request head.
pub(crate) const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_method_path_and_headers() -> Result<()> {
        let raw = b"GET /stream.mjpg?t=123 HTTP/1.1\r\nHost: cam.local\r\nUser-Agent: test\r\n\r\n";
        let request = read_request(&mut &raw[..])?;
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/stream.mjpg");
        assert_eq!(request.header("host"), Some("cam.local"));
        Ok(())
    }

    #[test]
    fn rejects_empty_requests() {
        assert!(read_request(&mut &b""[..]).is_err());
        assert!(read_request(&mut &b"GET\r\n\r\n"[..]).is_err());
    }

    #[test]
    fn rejects_oversized_heads() {
        let raw = vec![b'a'; MAX_REQUEST_BYTES + 2048];
        assert!(read_request(&mut &raw[..]).is_err());
    }

    #[test]
    fn error_pages_carry_the_reason() -> Result<()> {
        let mut out = Vec::new();
        write_error(&mut out, 404)?;
        let text = String::from_utf8(out)?;
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("<h1>Not Found</h1>"));
        assert!(!text.contains("Allow:"));
        Ok(())
    }

    #[test]
    fn method_not_allowed_lists_allowed_methods() -> Result<()> {
        let mut out = Vec::new();
        write_method_not_allowed(&mut out, "GET")?;
        let text = String::from_utf8(out)?;
        assert!(text.starts_with("HTTP/1.1 405 Method Not Allowed\r\nAllow: GET\r\n"));
        assert!(text.contains("<h1>Method Not Allowed</h1>"));
        Ok(())
    }
}
