use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;
use tracing::{debug, error, trace};

use crate::error::{Error, Result};
use crate::server::response::Response;
use crate::server::{gemini, http, titan, Wiki};

/// Longest accepted request URL, excluding the CRLF.
pub const MAX_REQUEST_LINE: usize = 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

static HTTP_REQUEST_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]+ \S+ HTTP/1\.[01]$").expect("http request regex"));

/// What we know about the connected client.
#[derive(Debug, Clone, Default)]
pub struct Peer {
    pub ip: String,
    /// SHA-256 of the client certificate, lowercase hex, when one was
    /// presented.
    pub fingerprint: Option<String>,
}

/// A parsed Gemini or Titan request, host verified and space resolved.
#[derive(Debug, Clone)]
pub struct Request {
    pub host: String,
    pub port: Option<u16>,
    pub space: String,
    /// Percent-decoded path segments after the space.
    pub segments: Vec<String>,
    pub query: Option<String>,
    pub peer: Peer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    /// Raw path including the leading slash, still percent-encoded.
    pub path: String,
    pub query: Option<String>,
}

/// Split a URL the way the wire needs it. Titan parameters stay inside
/// `path`; query strings stay encoded.
pub fn parse_url(raw: &str) -> Result<ParsedUrl> {
    let (scheme, rest) = raw
        .split_once("://")
        .ok_or_else(|| Error::BadRequest("Missing scheme".to_string()))?;
    let (before_query, query) = match rest.split_once('?') {
        Some((before, query)) => (before, Some(query.to_string())),
        None => (rest, None),
    };
    let (authority, path) = match before_query.find('/') {
        Some(i) => (&before_query[..i], &before_query[i..]),
        None => (before_query, ""),
    };
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| Error::BadRequest(format!("Bad port: {port}")))?;
            (host, Some(port))
        }
        None => (authority, None),
    };
    if host.is_empty() {
        return Err(Error::BadRequest("Missing host".to_string()));
    }
    Ok(ParsedUrl {
        scheme: scheme.to_string(),
        host: host.to_ascii_lowercase(),
        port,
        path: path.to_string(),
        query,
    })
}

fn decode_segment(segment: &str) -> Result<String> {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .map_err(|_| Error::BadRequest(format!("Bad encoding: {segment}")))
}

/// Split a raw path into decoded segments and peel off a leading segment
/// naming a space declared for this host. Decoding happens exactly once
/// per segment.
pub fn resolve_space_path(
    wiki: &Wiki,
    host: &str,
    raw_path: &str,
) -> Result<(String, Vec<String>)> {
    let mut segments = raw_path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(decode_segment)
        .collect::<Result<Vec<_>>>()?;
    trace!("path {raw_path} -> segments {segments:?}");
    let space = match segments.first() {
        Some(first) => match wiki.config.resolve_space(host, first) {
            Some(space) => {
                let space = space.to_string();
                segments.remove(0);
                space
            }
            None => String::new(),
        },
        None => String::new(),
    };
    Ok((space, segments))
}

/// Turn a request URL into a routed request, or the error that answers it.
pub fn parse_request(url: &ParsedUrl, wiki: &Wiki, peer: &Peer) -> Result<Request> {
    if !wiki.config.is_known_host(&url.host) {
        return Err(Error::UnknownHost(url.host.clone()));
    }
    let (space, segments) = resolve_space_path(wiki, &url.host, &url.path)?;
    Ok(Request {
        host: url.host.clone(),
        port: url.port,
        space,
        segments,
        query: url.query.clone(),
        peer: peer.clone(),
    })
}

async fn read_request_line<R>(reader: &mut R) -> Result<String>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut buf = Vec::new();
    let mut limited = reader.take((MAX_REQUEST_LINE + 2) as u64);
    limited.read_until(b'\n', &mut buf).await?;
    if buf.is_empty() {
        return Err(Error::BadRequest("Empty request".to_string()));
    }
    if !buf.ends_with(b"\n") {
        return Err(Error::BadRequest("Request line too long".to_string()));
    }
    while buf.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
        buf.pop();
    }
    String::from_utf8(buf).map_err(|_| Error::BadRequest("Request is not UTF-8".to_string()))
}

/// Serve one TLS connection: read the request line, sniff the protocol,
/// dispatch, write the response, close.
pub async fn handle_connection<S>(stream: S, peer: Peer, wiki: Arc<Wiki>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let line = match timeout(REQUEST_TIMEOUT, read_request_line(&mut reader)).await {
        Ok(Ok(line)) => line,
        Ok(Err(e)) => {
            let _ = Response::from(e).write(&mut write_half).await;
            return;
        }
        Err(_) => {
            debug!("{}: request line timed out", peer.ip);
            return;
        }
    };
    debug!("{}: {}", peer.ip, line);

    let response = if line.starts_with("gemini://") {
        match parse_url(&line).and_then(|url| parse_request(&url, &wiki, &peer)) {
            Ok(request) => wiki
                .extensions
                .handle(&request, &wiki)
                .unwrap_or_else(|| gemini::handle(&wiki, &request)),
            Err(e) => Response::from(e),
        }
    } else if line.starts_with("titan://") {
        titan::handle(&wiki, &line, &peer, &mut reader).await
    } else if HTTP_REQUEST_LINE.is_match(&line) {
        http::handle(&wiki, &line, &mut reader, &mut write_half).await;
        let _ = write_half.shutdown().await;
        return;
    } else {
        Response::bad_request("Unknown scheme")
    };

    if response.status == 40 {
        error!("{}: {} -> 40 {}", peer.ip, line, response.meta);
    } else if response.status >= 50 {
        debug!("{}: {} -> {} {}", peer.ip, line, response.status, response.meta);
    }
    if let Err(e) = response.write(&mut write_half).await {
        debug!("{}: write failed: {e}", peer.ip);
    }
    let _ = write_half.shutdown().await;
}
