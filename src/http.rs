//! HTTP Server for the analyze endpoint
//! Simple HTTP server using tokio and basic HTTP handling

use crate::analyze::{AnalyzeRequest, AnalyzeService};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

const READ_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REQUEST_BYTES: usize = 1_000_000;

/// Accept connections forever, one task per connection.
pub async fn serve(listener: TcpListener, service: Arc<AnalyzeService>) -> std::io::Result<()> {
    info!("Server listening on {}", listener.local_addr()?);
    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("New connection from: {}", addr);
        tokio::spawn(handle_connection(stream, Arc::clone(&service)));
    }
}

async fn handle_connection(mut stream: TcpStream, service: Arc<AnalyzeService>) {
    let mut buffer = Vec::new();
    let mut temp_buf = [0; 8192];

    let read_result = timeout(READ_TIMEOUT, async {
        loop {
            let n = stream.read(&mut temp_buf).await?;
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&temp_buf[..n]);
            if let Some(headers_end) = find_headers_end(&buffer) {
                let head = String::from_utf8_lossy(&buffer[..headers_end]);
                let content_length = extract_content_length(&head).unwrap_or(0);
                if buffer.len() >= headers_end + content_length {
                    break;
                }
            }
            if buffer.len() > MAX_REQUEST_BYTES {
                break;
            }
        }
        Ok::<_, std::io::Error>(())
    })
    .await;

    match read_result {
        Err(_) => {
            warn!("Request read timeout");
            return;
        }
        Ok(Err(e)) => {
            error!("Failed to read from stream: {}", e);
            return;
        }
        Ok(Ok(())) => {}
    }
    if buffer.is_empty() {
        return;
    }

    let response = match String::from_utf8(buffer) {
        Ok(request) => handle_request(&service, &request).await,
        Err(_) => create_response(400, "Bad Request", r#"{"error":"Request is not valid UTF-8"}"#),
    };
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        error!("Failed to write response: {}", e);
    }
}

/// Offset just past the blank line that ends the headers.
fn find_headers_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
}

fn extract_content_length(head: &str) -> Option<usize> {
    head.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

/// Route a complete raw request and render the raw response.
pub async fn handle_request(service: &AnalyzeService, request: &str) -> String {
    let Some(request_line) = request.lines().next() else {
        return create_response(400, "Bad Request", "{}");
    };
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return create_response(400, "Bad Request", "{}");
    }

    let method = parts[0];
    let path = parts[1].split('?').next().unwrap_or("/");
    let path = match path.trim_end_matches('/') {
        "" => "/",
        p => p,
    };
    debug!("Request: {} {}", method, path);

    let body = request.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or("");

    match (method, path) {
        ("GET", "/api/health") => create_response(200, "OK", r#"{"status":"ok","service":"nl-query"}"#),
        ("POST", "/analyze" | "/api/analyze") => handle_analyze(service, body).await,
        (_, "/analyze" | "/api/analyze") => {
            create_response(405, "Method Not Allowed", r#"{"error":"Method not allowed"}"#)
        }
        _ => create_response(404, "Not Found", r#"{"error":"Not found"}"#),
    }
}

async fn handle_analyze(service: &AnalyzeService, body: &str) -> String {
    let req: AnalyzeRequest = match serde_json::from_str(body) {
        Ok(req) => req,
        Err(e) => {
            let body = serde_json::json!({ "success": false, "error": format!("Invalid request body: {}", e) });
            return create_response(400, "Bad Request", &body.to_string());
        }
    };
    if req.nl_input.trim().is_empty() {
        return create_response(400, "Bad Request", r#"{"success":false,"error":"NLInput is required"}"#);
    }

    let response = service.analyze(req.nl_input.trim()).await;
    create_response(response.status, status_text(response.status), &response.body.to_string())
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Internal Server Error",
    }
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_length_is_case_insensitive() {
        let head = "POST /analyze HTTP/1.1\r\ncontent-LENGTH: 42\r\nHost: x\r\n\r\n";
        assert_eq!(extract_content_length(head), Some(42));
        assert_eq!(extract_content_length("GET / HTTP/1.1\r\n\r\n"), None);
    }

    #[test]
    fn test_headers_end() {
        assert_eq!(find_headers_end(b"GET / HTTP/1.1\r\n\r\nbody"), Some(18));
        assert_eq!(find_headers_end(b"GET / HTTP/1.1\r\n"), None);
    }

    #[test]
    fn test_response_framing() {
        let response = create_response(405, "Method Not Allowed", "{}");
        assert!(response.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
        assert!(response.contains("Content-Length: 2\r\n"));
        assert!(response.ends_with("\r\n\r\n{}"));
    }
}
