use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;
use tracing::info;

use crate::auth::authorize_write;
use crate::error::{Error, Result};
use crate::server::dispatch::{parse_request, parse_url, Peer, Request};
use crate::server::response::Response;
use crate::server::Wiki;
use crate::store::path::validate_name;
use crate::wiki::changes::contributor_code;

const BODY_TIMEOUT: Duration = Duration::from_secs(60);
const PAGE_MIME: &str = "text/plain";

/// Handle a Titan upload: the request line has been read, the body is
/// still on the wire.
pub async fn handle<R>(wiki: &Wiki, line: &str, peer: &Peer, reader: &mut R) -> Response
where
    R: AsyncRead + Unpin,
{
    upload(wiki, line, peer, reader)
        .await
        .unwrap_or_else(Response::from)
}

#[derive(Debug, Default)]
struct TitanParams {
    mime: Option<String>,
    size: Option<usize>,
    token: Option<String>,
}

/// Parse the semicolon-delimited parameters following the path. Order is
/// free; unknown keys are ignored.
fn parse_params(raw: &str) -> Result<TitanParams> {
    let mut params = TitanParams::default();
    for part in raw.split(';').filter(|p| !p.is_empty()) {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| Error::BadRequest(format!("Bad parameter: {part}")))?;
        let value = urlencoding::decode(value)
            .map_err(|_| Error::BadRequest(format!("Bad parameter encoding: {part}")))?
            .into_owned();
        match key {
            "mime" => params.mime = Some(value),
            "size" => {
                params.size = Some(
                    value
                        .parse()
                        .map_err(|_| Error::BadRequest(format!("Bad size: {value}")))?,
                );
            }
            "token" => params.token = Some(value),
            _ => {}
        }
    }
    Ok(params)
}

enum Target<'a> {
    Page(&'a str),
    File(&'a str),
}

fn resolve_target<'a>(request: &'a Request) -> Result<Target<'a>> {
    let segments: Vec<&str> = request.segments.iter().map(String::as_str).collect();
    let target = match segments.as_slice() {
        ["file", name] => Target::File(name),
        ["raw", name] | ["page", name] | [name] => Target::Page(name),
        _ => {
            return Err(Error::BadRequest(
                "Cannot upload to this path".to_string(),
            ))
        }
    };
    let (Target::Page(name) | Target::File(name)) = &target;
    validate_name(name)?;
    Ok(target)
}

async fn upload<R>(wiki: &Wiki, line: &str, peer: &Peer, reader: &mut R) -> Result<Response>
where
    R: AsyncRead + Unpin,
{
    let mut url = parse_url(line)?;
    let params = match url.path.split_once(';') {
        Some((path, raw)) => {
            let params = parse_params(raw)?;
            url.path = path.to_string();
            params
        }
        None => TitanParams::default(),
    };

    let request = parse_request(&url, wiki, peer)?;
    let target = resolve_target(&request)?;

    let size = params
        .size
        .ok_or_else(|| Error::BadRequest("Missing size parameter".to_string()))?;
    let mime = params.mime.unwrap_or_else(|| PAGE_MIME.to_string());

    match target {
        Target::Page(_) => {
            if size > wiki.config.page_size_limit {
                return Err(Error::SizeLimit(wiki.config.page_size_limit));
            }
            // Pages accept text/plain implicitly and nothing else.
            if mime != PAGE_MIME {
                return Err(Error::MimeNotAllowed(mime));
            }
        }
        Target::File(_) => {
            if !wiki.config.mime_allowed(&mime) {
                return Err(Error::MimeNotAllowed(mime));
            }
        }
    }

    if !authorize_write(
        &wiki.config,
        &request.space,
        params.token.as_deref(),
        peer.fingerprint.as_deref(),
    ) {
        return Err(Error::WrongToken);
    }

    let mut body = vec![0u8; size];
    timeout(BODY_TIMEOUT, reader.read_exact(&mut body))
        .await
        .map_err(|_| Error::BadRequest("Timed out reading upload".to_string()))?
        .map_err(|_| Error::BadRequest("Upload shorter than declared size".to_string()))?;

    let code = contributor_code(&peer.ip);
    let port = request.port.unwrap_or_else(|| wiki.config.primary_port());
    let space_prefix = if request.space.is_empty() {
        String::new()
    } else {
        format!("/{}", request.space)
    };

    let canonical = match target {
        Target::Page(name) => {
            let text = String::from_utf8(body)
                .map_err(|_| Error::BadRequest("Page text is not UTF-8".to_string()))?;
            let revision = wiki.store.write_page(&request.space, name, &text, &code)?;
            info!(
                "{}: wrote {}/{} revision {revision}",
                peer.ip, request.space, name
            );
            format!(
                "gemini://{}:{port}{space_prefix}/page/{}",
                request.host,
                urlencoding::encode(name)
            )
        }
        Target::File(name) => {
            wiki.store
                .write_file(&request.space, name, &body, &mime, &code)?;
            info!("{}: wrote file {}/{}", peer.ip, request.space, name);
            format!(
                "gemini://{}:{port}{space_prefix}/file/{}",
                request.host,
                urlencoding::encode(name)
            )
        }
    };
    Ok(Response::redirect(&canonical))
}
