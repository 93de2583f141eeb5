use anyhow::{anyhow, Result};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pi_sentinel::server::{ServerConfig, ServerHandle, StreamServer, INDEX_PAGE};
use pi_sentinel::SharedFrameBuffer;

struct TestServer {
    buffer: Arc<SharedFrameBuffer>,
    handle: Option<ServerHandle>,
}

impl TestServer {
    fn start() -> Result<Self> {
        let buffer = Arc::new(SharedFrameBuffer::new());
        let cfg = ServerConfig {
            addr: "127.0.0.1:0".to_string(),
            wait_poll: Duration::from_millis(50),
            write_timeout: Some(Duration::from_secs(2)),
        };
        let handle = StreamServer::new(cfg, buffer.clone()).spawn()?;
        Ok(Self {
            buffer,
            handle: Some(handle),
        })
    }

    fn handle(&self) -> &ServerHandle {
        self.handle.as_ref().expect("server running")
    }

    fn connect(&self) -> Result<TcpStream> {
        let stream = TcpStream::connect(self.handle().addr)?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        Ok(stream)
    }

    fn request(&self, raw: &str) -> Result<(String, String)> {
        let mut stream = self.connect()?;
        stream.write_all(raw.as_bytes())?;
        let mut response = String::new();
        stream.read_to_string(&mut response)?;
        let mut parts = response.splitn(2, "\r\n\r\n");
        let headers = parts.next().unwrap_or("").to_string();
        let body = parts.next().unwrap_or("").to_string();
        Ok((headers, body))
    }

    fn open_stream(&self) -> Result<BufReader<TcpStream>> {
        let mut stream = self.connect()?;
        stream.write_all(b"GET /stream.mjpg HTTP/1.1\r\nHost: test\r\nUser-Agent: it\r\n\r\n")?;
        let mut reader = BufReader::new(stream);
        let head = read_header_block(&mut reader)?;
        if !head[0].starts_with("HTTP/1.1 200") {
            return Err(anyhow!("unexpected status line: {}", head[0]));
        }
        Ok(reader)
    }

    fn wait_for_active(&self, expected: usize) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.handle().active_streams() != expected {
            if Instant::now() > deadline {
                return Err(anyhow!(
                    "expected {} active streams, saw {}",
                    expected,
                    self.handle().active_streams()
                ));
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.buffer.close();
        if let Some(handle) = self.handle.take() {
            let _ = handle.stop();
        }
    }
}

fn read_header_block(reader: &mut BufReader<TcpStream>) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(anyhow!("connection closed inside header block"));
        }
        let line = line.trim_end_matches("\r\n").to_string();
        if line.is_empty() {
            return Ok(lines);
        }
        lines.push(line);
    }
}

fn read_part(reader: &mut BufReader<TcpStream>) -> Result<Vec<u8>> {
    let head = read_header_block(reader)?;
    if head.first().map(String::as_str) != Some("--FRAME") {
        return Err(anyhow!("missing boundary: {:?}", head));
    }
    if !head.iter().any(|line| line == "Content-Type: image/jpeg") {
        return Err(anyhow!("missing part content type: {:?}", head));
    }
    let length: usize = head
        .iter()
        .find_map(|line| line.strip_prefix("Content-Length: "))
        .ok_or_else(|| anyhow!("missing Content-Length: {:?}", head))?
        .parse()?;
    let mut body = vec![0u8; length + 2];
    reader.read_exact(&mut body)?;
    if &body[length..] != b"\r\n" {
        return Err(anyhow!("part not terminated by CRLF"));
    }
    body.truncate(length);
    Ok(body)
}

#[test]
fn root_redirects_to_index() -> Result<()> {
    let server = TestServer::start()?;
    let (headers, _) = server.request("GET / HTTP/1.1\r\nHost: test\r\n\r\n")?;
    assert!(headers.starts_with("HTTP/1.1 301"), "{}", headers);
    assert!(headers.contains("Location: /index.html"), "{}", headers);
    Ok(())
}

#[test]
fn index_serves_the_landing_page() -> Result<()> {
    let server = TestServer::start()?;
    let (headers, body) = server.request("GET /index.html?nocache=1 HTTP/1.1\r\n\r\n")?;
    assert!(headers.starts_with("HTTP/1.1 200"), "{}", headers);
    assert!(headers.contains("Content-Type: text/html"), "{}", headers);
    assert!(headers.contains(&format!("Content-Length: {}", INDEX_PAGE.len())));
    assert_eq!(body, INDEX_PAGE);
    assert!(body.contains(r#"<img src="stream.mjpg""#));
    Ok(())
}

#[test]
fn unknown_paths_are_not_found() -> Result<()> {
    let server = TestServer::start()?;
    let (headers, _) = server.request("GET /favicon.ico HTTP/1.1\r\n\r\n")?;
    assert!(headers.starts_with("HTTP/1.1 404"), "{}", headers);
    Ok(())
}

#[test]
fn other_methods_are_rejected() -> Result<()> {
    let server = TestServer::start()?;
    let (headers, _) = server.request("POST /index.html HTTP/1.1\r\nContent-Length: 0\r\n\r\n")?;
    assert!(headers.starts_with("HTTP/1.1 405"), "{}", headers);
    assert!(headers.contains("Allow: GET"), "{}", headers);
    Ok(())
}

#[test]
fn stream_sends_multipart_headers_and_frames() -> Result<()> {
    let server = TestServer::start()?;
    let mut stream = server.connect()?;
    stream.write_all(b"GET /stream.mjpg HTTP/1.1\r\nHost: test\r\n\r\n")?;
    let mut reader = BufReader::new(stream);
    let head = read_header_block(&mut reader)?;

    assert!(head[0].starts_with("HTTP/1.1 200"));
    assert!(head.contains(&"Age: 0".to_string()));
    assert!(head.contains(&"Cache-Control: no-cache, private".to_string()));
    assert!(head.contains(&"Pragma: no-cache".to_string()));
    assert!(head.contains(&"Content-Type: multipart/x-mixed-replace; boundary=FRAME".to_string()));

    server.wait_for_active(1)?;
    server.buffer.publish(vec![0xFF, 0xD8, 0x01, 0xFF, 0xD9]);
    assert_eq!(read_part(&mut reader)?, vec![0xFF, 0xD8, 0x01, 0xFF, 0xD9]);

    server.buffer.publish(vec![0xFF, 0xD8, 0x02, 0xFF, 0xD9]);
    assert_eq!(read_part(&mut reader)?, vec![0xFF, 0xD8, 0x02, 0xFF, 0xD9]);
    Ok(())
}

#[test]
fn late_viewer_receives_the_current_frame() -> Result<()> {
    let server = TestServer::start()?;
    server.buffer.publish(vec![1u8, 2, 3]);
    let mut reader = server.open_stream()?;
    assert_eq!(read_part(&mut reader)?, vec![1u8, 2, 3]);
    Ok(())
}

#[test]
fn dropped_viewer_does_not_affect_others() -> Result<()> {
    let server = TestServer::start()?;
    let leaving = server.open_stream()?;
    let mut staying = server.open_stream()?;
    server.wait_for_active(2)?;
    drop(leaving);

    // Keep publishing until the server notices the closed socket.
    let deadline = Instant::now() + Duration::from_secs(5);
    while server.handle().active_streams() > 1 {
        if Instant::now() > deadline {
            return Err(anyhow!("closed viewer was never removed"));
        }
        let version = server.buffer.publish(vec![7u8; 64]);
        let part = read_part(&mut staying)?;
        assert_eq!(part, vec![7u8; 64], "frame {} corrupted", version);
        std::thread::sleep(Duration::from_millis(20));
    }

    server.buffer.publish(vec![9u8; 16]);
    assert_eq!(read_part(&mut staying)?, vec![9u8; 16]);
    Ok(())
}

#[test]
fn stop_releases_streaming_clients() -> Result<()> {
    let mut server = TestServer::start()?;
    let mut reader = server.open_stream()?;
    server.wait_for_active(1)?;
    let addr = server.handle().addr;

    server.handle.take().expect("server running").stop()?;
    // Handlers exit within one wait poll once the flag is set.
    let mut rest = Vec::new();
    reader.read_to_end(&mut rest)?;
    assert!(rest.is_empty());
    assert!(TcpStream::connect(addr).is_err());
    Ok(())
}
