//! A deliberately tiny HTTP/1.0 client, just enough to talk to a registry:
//! one request, one response, no keep-alive, no body beyond a single
//! optional header carrying a comma-separated server list. The registry is
//! an ambient side-channel, not the RPC transport, so it doesn't earn a
//! full HTTP client dependency.

use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

use quick_error::quick_error;
quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Io(err: io::Error) {
            from()
            display("I/O error talking to registry: {}", err)
        }
        BadUrl(err: url::ParseError) {
            from()
            display("bad registry URL: {}", err)
        }
        UnsupportedScheme(scheme: String) {
            display("unsupported registry URL scheme {:?}, expected http", scheme)
        }
        MissingHost {
            display("registry URL has no host")
        }
        MalformedResponse {
            display("malformed HTTP response from registry")
        }
    }
}

fn host_port(url: &Url) -> Result<String, Error> {
    if url.scheme() != "http" {
        return Err(Error::UnsupportedScheme(url.scheme().to_string()));
    }
    let host = url.host_str().ok_or(Error::MissingHost)?;
    let port = url.port_or_known_default().unwrap_or(80);
    Ok(format!("{}:{}", host, port))
}

fn request_path(url: &Url) -> String {
    let mut path = url.path().to_string();
    if path.is_empty() {
        path = "/".to_string();
    }
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }
    path
}

async fn roundtrip(url: &str, request: String) -> Result<Vec<u8>, Error> {
    let parsed = Url::parse(url)?;
    let addr = host_port(&parsed)?;
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await.ok();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    Ok(response)
}

fn split_response(response: &[u8]) -> Result<(Vec<httparse::Header<'_>>, &[u8]), Error> {
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut parsed = httparse::Response::new(&mut headers);
    let status = parsed
        .parse(response)
        .map_err(|_| Error::MalformedResponse)?;
    match status {
        httparse::Status::Complete(offset) => {
            let headers = parsed.headers.iter().cloned().collect();
            Ok((headers, &response[offset..]))
        }
        httparse::Status::Partial => Err(Error::MalformedResponse),
    }
}

fn find_header(headers: &[httparse::Header<'_>], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| String::from_utf8_lossy(h.value).into_owned())
}

/// Issues a `GET` and returns the value of `header_name` from the response,
/// if present.
pub async fn get_header(url: &str, header_name: &str) -> Result<Option<String>, Error> {
    let parsed = Url::parse(url)?;
    let path = request_path(&parsed);
    let host = parsed.host_str().ok_or(Error::MissingHost)?;
    let request = format!("GET {path} HTTP/1.0\r\nHost: {host}\r\n\r\n");
    let response = roundtrip(url, request).await?;
    let (headers, _body) = split_response(&response)?;
    Ok(find_header(&headers, header_name))
}

/// Issues a `POST` carrying `header_name: header_value` and no body.
/// Used by the server side to send heartbeats to a registry.
pub async fn post_header(url: &str, header_name: &str, header_value: &str) -> Result<(), Error> {
    let parsed = Url::parse(url)?;
    let path = request_path(&parsed);
    let host = parsed.host_str().ok_or(Error::MissingHost)?;
    let request = format!(
        "POST {path} HTTP/1.0\r\nHost: {host}\r\n{header_name}: {header_value}\r\nContent-Length: 0\r\n\r\n"
    );
    let response = roundtrip(url, request).await?;
    split_response(&response)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_response_headers() {
        let raw = b"HTTP/1.0 200 OK\r\nX-rpc-servers: tcp@a:1,tcp@b:2\r\n\r\n";
        let (headers, body) = split_response(raw).unwrap();
        assert_eq!(find_header(&headers, "x-rpc-servers").unwrap(), "tcp@a:1,tcp@b:2");
        assert!(body.is_empty());
    }

    #[test]
    fn host_port_defaults_http_port() {
        let url = Url::parse("http://registry.local/_rpc_").unwrap();
        assert_eq!(host_port(&url).unwrap(), "registry.local:80");
    }
}
