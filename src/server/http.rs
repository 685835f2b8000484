use std::sync::LazyLock;

use maud::{html, Markup, DOCTYPE};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{Error, Result};
use crate::gemtext;
use crate::server::gemini::{robots_body, SEARCH_LIMIT};
use crate::server::Wiki;
use crate::wiki::{changes, diff, feed};

static REQUEST_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(GET|HEAD) (\S+) HTTP/1\.[01]$").expect("request regex"));

const MAX_HEADER_BYTES: u64 = 8192;
const CHANGES_PAGE_SIZE: usize = 30;
const FEED_SIZE: usize = 30;

/// Stylesheet served at `/default.css` unless an extension overrides it.
pub const DEFAULT_CSS: &str = "\
body{max-width:70ch;margin:auto;padding:1rem;font-family:serif;line-height:1.5}
h1,h2,h3{font-family:sans-serif}
pre{background:#eee;padding:.5rem;overflow-x:auto}
blockquote{border-left:3px solid #999;margin-left:0;padding-left:1rem;color:#444}
a{color:#047}
";

struct HttpResponse {
    status: u16,
    reason: &'static str,
    mime: String,
    body: Vec<u8>,
    cacheable: bool,
}

impl HttpResponse {
    fn ok(mime: &str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            reason: "OK",
            mime: mime.to_string(),
            body,
            cacheable: false,
        }
    }

    fn html(body: String) -> Self {
        Self::ok("text/html; charset=UTF-8", body.into_bytes())
    }

    fn error(status: u16, reason: &'static str) -> Self {
        Self {
            status,
            reason,
            mime: "text/plain; charset=UTF-8".to_string(),
            body: format!("{status} {reason}\n").into_bytes(),
            cacheable: false,
        }
    }
}

impl From<Error> for HttpResponse {
    fn from(error: Error) -> Self {
        match error {
            Error::NotFound => Self::error(404, "Not Found"),
            Error::UnknownHost(_) => Self::error(404, "Not Found"),
            Error::BadRequest(_) | Error::InvalidName(_) => Self::error(400, "Bad Request"),
            _ => Self::error(500, "Internal Server Error"),
        }
    }
}

/// Serve one HTTP request whose request line has already been read from
/// the shared TLS stream.
pub async fn handle<R, W>(wiki: &Wiki, first_line: &str, reader: &mut R, writer: &mut W)
where
    R: AsyncBufReadExt + Unpin,
    W: AsyncWrite + Unpin,
{
    let host_header = read_headers(reader).await;

    let Some(caps) = REQUEST_LINE.captures(first_line) else {
        let response = HttpResponse::error(405, "Method Not Allowed");
        let _ = write_response(writer, &response, false).await;
        return;
    };
    let head_only = &caps[1] == "HEAD";
    let target = &caps[2];

    let host = host_header
        .map(|h| match h.rsplit_once(':') {
            Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name.to_string(),
            _ => h,
        })
        .unwrap_or_else(|| {
            wiki.config
                .hosts
                .first()
                .map(|h| h.name.clone())
                .unwrap_or_default()
        });

    let response = route(wiki, &host, target).unwrap_or_else(HttpResponse::from);
    if let Err(e) = write_response(writer, &response, head_only).await {
        debug!("http write failed: {e}");
    }
}

async fn read_headers<R>(reader: &mut R) -> Option<String>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut host = None;
    let mut limited = reader.take(MAX_HEADER_BYTES);
    loop {
        let mut line = String::new();
        match limited.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            if key.eq_ignore_ascii_case("host") {
                host = Some(value.trim().to_string());
            }
        }
    }
    host
}

async fn write_response<W>(
    writer: &mut W,
    response: &HttpResponse,
    head_only: bool,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        response.reason,
        response.mime,
        response.body.len()
    );
    if response.cacheable {
        head.push_str("Cache-Control: public, max-age=86400, immutable\r\n");
    }
    if response.status == 405 {
        head.push_str("Allow: GET, HEAD\r\n");
    }
    head.push_str("\r\n");
    writer.write_all(head.as_bytes()).await?;
    if !head_only {
        writer.write_all(&response.body).await?;
    }
    writer.flush().await
}

fn route(wiki: &Wiki, host: &str, target: &str) -> Result<HttpResponse> {
    if !wiki.config.is_known_host(host) {
        return Err(Error::UnknownHost(host.to_string()));
    }
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };
    let query = match query {
        Some(q) => Some(
            urlencoding::decode(q)
                .map_err(|_| Error::BadRequest("Bad query encoding".to_string()))?
                .into_owned(),
        ),
        None => None,
    };

    // Host-wide assets before space resolution.
    match path {
        "/default.css" => {
            let css = wiki
                .extensions
                .stylesheet()
                .unwrap_or(DEFAULT_CSS)
                .to_string();
            let mut response = HttpResponse::ok("text/css; charset=UTF-8", css.into_bytes());
            response.cacheable = true;
            return Ok(response);
        }
        "/favicon.ico" => {
            return match wiki.extensions.favicon() {
                Some(bytes) => {
                    let mut response = HttpResponse::ok("image/x-icon", bytes.to_vec());
                    response.cacheable = true;
                    Ok(response)
                }
                None => Err(Error::NotFound),
            };
        }
        _ => {}
    }

    let (space, segments) = super::dispatch::resolve_space_path(wiki, host, path)?;
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
    let space = space.as_str();

    match segments.as_slice() {
        [] => menu_html(wiki, space),
        ["robots.txt"] => Ok(HttpResponse::ok(
            "text/plain; charset=UTF-8",
            robots_body(wiki, host)?.into_bytes(),
        )),
        ["page", name] | ["html", name] => page_html(wiki, space, name, None),
        ["page", name, rev] | ["html", name, rev] => {
            page_html(wiki, space, name, Some(parse_rev(rev)?))
        }
        ["raw", name] => Ok(HttpResponse::ok(
            "text/plain; charset=UTF-8",
            wiki.store.read_page(space, name)?.text.into_bytes(),
        )),
        ["raw", name, rev] => Ok(HttpResponse::ok(
            "text/plain; charset=UTF-8",
            wiki.store
                .read_page_revision(space, name, parse_rev(rev)?)?
                .into_bytes(),
        )),
        ["file", name] => {
            let (data, mime) = wiki.store.read_file(space, name)?;
            Ok(HttpResponse::ok(&mime, data))
        }
        ["history", name] => history_html(wiki, space, name),
        ["diff", name, rev] => diff_html(wiki, space, name, parse_rev(rev)?),
        ["do", "index"] => index_html(wiki, space),
        ["do", "changes"] => changes_html(wiki, space, 0),
        ["do", "more", offset] => changes_html(
            wiki,
            space,
            offset
                .parse()
                .map_err(|_| Error::BadRequest(format!("Bad offset: {offset}")))?,
        ),
        ["do", "match"] => match_html(wiki, space, query.as_deref()),
        ["do", "search"] => search_html(wiki, space, query.as_deref()),
        ["do", "rss"] => feed_http(wiki, host, space, true),
        ["do", "atom"] => feed_http(wiki, host, space, false),
        ["do", "all", "changes"] => all_changes_html(wiki, host),
        ["do", "all", "atom"] => {
            let all = super::gemini::collect_all_changes(wiki, host)?;
            let title = format!("Changes on {host} (all spaces)");
            Ok(HttpResponse::ok(
                "application/atom+xml",
                feed::atom_all(host, wiki.config.primary_port(), &title, &all).into_bytes(),
            ))
        }
        _ => Err(Error::NotFound),
    }
}

fn all_changes_html(wiki: &Wiki, host: &str) -> Result<HttpResponse> {
    let all = super::gemini::collect_all_changes(wiki, host)?;
    let content = html! {
        h1 { "Changes in all spaces" }
        @if all.is_empty() { p { "No changes yet." } }
        ul {
            @for (space, entry) in &all {
                li {
                    (changes::day(entry.timestamp)) " "
                    @if entry.is_file() {
                        a href=(format!("{}/file/{}", base(space), urlencoding::encode(&entry.name))) { (entry.name) }
                        " (file)"
                    } @else {
                        a href=(page_href(space, &entry.name)) { (entry.name) }
                        " (revision " (entry.revision) ")"
                    }
                    " by " (entry.code)
                }
            }
        }
    };
    Ok(HttpResponse::html(shell("Changes in all spaces", content)))
}

fn parse_rev(s: &str) -> Result<u64> {
    s.parse()
        .map_err(|_| Error::BadRequest(format!("Bad revision: {s}")))
}

fn base(space: &str) -> String {
    if space.is_empty() {
        String::new()
    } else {
        format!("/{space}")
    }
}

fn page_href(space: &str, name: &str) -> String {
    format!("{}/page/{}", base(space), urlencoding::encode(name))
}

fn shell(title: &str, content: Markup) -> String {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) }
                link rel="stylesheet" href="/default.css";
            }
            body { (content) }
        }
    }
    .into_string()
}

/// Full HTML document for a page, shared with the Gemini `/html/` route.
#[must_use]
pub fn render_page(space: &str, name: &str, text: &str) -> String {
    let lines = gemtext::parse(text);
    shell(name, gemtext::to_html(&lines, space))
}

fn page_html(wiki: &Wiki, space: &str, name: &str, revision: Option<u64>) -> Result<HttpResponse> {
    let text = match revision {
        None => wiki.store.read_page(space, name)?.text,
        Some(rev) => wiki.store.read_page_revision(space, name, rev)?,
    };
    Ok(HttpResponse::html(render_page(space, name, &text)))
}

fn name_list(space: &str, names: &[String]) -> Markup {
    html! {
        ul {
            @for name in names {
                li { a href=(page_href(space, name)) { (name) } }
            }
        }
    }
}

fn menu_html(wiki: &Wiki, space: &str) -> Result<HttpResponse> {
    let b = base(space);
    let mut blog: Vec<String> = wiki
        .store
        .list_pages(space)?
        .into_iter()
        .filter(|name| super::gemini::is_iso_dated(name))
        .collect();
    blog.sort_unstable_by(|a, b| b.cmp(a));
    blog.truncate(10);

    let content = html! {
        h1 { "Welcome to Phoebe!" }
        @if !wiki.config.pages.is_empty() {
            ul {
                @for name in &wiki.config.pages {
                    li { a href=(page_href(space, name)) { (name) } }
                }
            }
        }
        @if !blog.is_empty() {
            h2 { "Blog" }
            (name_list(space, &blog))
        }
        p {
            a href=(format!("{b}/do/index")) { "All pages" }
            " · "
            a href=(format!("{b}/do/changes")) { "Recent changes" }
        }
    };
    Ok(HttpResponse::html(shell("Welcome to Phoebe!", content)))
}

fn index_html(wiki: &Wiki, space: &str) -> Result<HttpResponse> {
    let names = wiki.store.list_pages(space)?;
    let content = html! {
        h1 { "All pages" }
        (name_list(space, &names))
    };
    Ok(HttpResponse::html(shell("All pages", content)))
}

fn history_html(wiki: &Wiki, space: &str, name: &str) -> Result<HttpResponse> {
    let b = base(space);
    let encoded = urlencoding::encode(name).into_owned();
    let revisions = wiki.store.list_revisions(space, name)?;
    let title = format!("Page history for {name}");
    let content = html! {
        h1 { (title) }
        ul {
            @for rev in &revisions {
                li {
                    a href=(format!("{b}/page/{encoded}/{rev}")) { "Revision " (rev) }
                    @if *rev > 1 {
                        " ("
                        a href=(format!("{b}/diff/{encoded}/{rev}")) { "diff" }
                        ")"
                    }
                }
            }
        }
    };
    Ok(HttpResponse::html(shell(&title, content)))
}

fn diff_html(wiki: &Wiki, space: &str, name: &str, revision: u64) -> Result<HttpResponse> {
    if revision == 0 {
        return Err(Error::BadRequest("Bad revision: 0".to_string()));
    }
    let read = |rev: u64| -> Result<String> {
        if rev == 0 {
            return Ok(String::new());
        }
        match wiki.store.read_page_revision(space, name, rev) {
            Ok(text) => Ok(text),
            Err(Error::NotFound) => Ok(String::new()),
            Err(e) => Err(e),
        }
    };
    let old = read(revision - 1)?;
    let new = read(revision)?;
    if old.is_empty() && new.is_empty() {
        return Err(Error::NotFound);
    }
    let title = format!("Differences for {name}");
    let diff = diff::diff(&old, &new);
    let content = html! {
        h1 { (title) }
        p { "Changes from revision " (revision - 1) " to revision " (revision) ":" }
        @if diff.is_empty() { p { "No changes." } } @else { pre { (diff) } }
    };
    Ok(HttpResponse::html(shell(&title, content)))
}

fn changes_html(wiki: &Wiki, space: &str, offset: usize) -> Result<HttpResponse> {
    let b = base(space);
    let entries = wiki.store.read_changes(space, CHANGES_PAGE_SIZE, offset)?;
    let content = html! {
        h1 { "Changes" }
        @if entries.is_empty() { p { "No changes yet." } }
        ul {
            @for entry in &entries {
                li {
                    (changes::day(entry.timestamp)) " " (changes::time_of_day(entry.timestamp)) " "
                    @if entry.is_file() {
                        a href=(format!("{b}/file/{}", urlencoding::encode(&entry.name))) { (entry.name) }
                        " (file)"
                    } @else {
                        a href=(page_href(space, &entry.name)) { (entry.name) }
                        " (revision " (entry.revision) ")"
                    }
                    " by " (entry.code)
                }
            }
        }
        @if entries.len() == CHANGES_PAGE_SIZE {
            p { a href=(format!("{b}/do/more/{}", offset + CHANGES_PAGE_SIZE)) { "More..." } }
        }
    };
    Ok(HttpResponse::html(shell("Changes", content)))
}

/// Hit list capped like the Gemini search views, with the same
/// truncation notice past the limit.
fn hit_list(space: &str, names: &[String]) -> Markup {
    let shown = &names[..names.len().min(SEARCH_LIMIT)];
    html! {
        (name_list(space, shown))
        @if names.len() > SEARCH_LIMIT {
            p { "Results truncated at " (SEARCH_LIMIT) " hits." }
        }
    }
}

fn match_html(wiki: &Wiki, space: &str, query: Option<&str>) -> Result<HttpResponse> {
    let Some(query) = query else {
        return Err(Error::BadRequest("Query required".to_string()));
    };
    let needle = query.to_lowercase();
    let names: Vec<String> = wiki
        .store
        .list_pages(space)?
        .into_iter()
        .filter(|name| name.to_lowercase().contains(&needle))
        .collect();
    let title = format!("Pages matching {query}");
    let content = html! {
        h1 { (title) }
        (hit_list(space, &names))
    };
    Ok(HttpResponse::html(shell(&title, content)))
}

fn search_html(wiki: &Wiki, space: &str, query: Option<&str>) -> Result<HttpResponse> {
    let Some(query) = query else {
        return Err(Error::BadRequest("Query required".to_string()));
    };
    let needle = query.to_lowercase();
    let mut names = Vec::new();
    for name in wiki.store.list_pages(space)? {
        if name.to_lowercase().contains(&needle) {
            names.push(name);
            continue;
        }
        if let Ok(page) = wiki.store.read_page(space, &name) {
            if page.text.to_lowercase().contains(&needle) {
                names.push(name);
            }
        }
        if names.len() > SEARCH_LIMIT {
            break;
        }
    }
    let title = format!("Search results for {query}");
    let content = html! {
        h1 { (title) }
        (hit_list(space, &names))
    };
    Ok(HttpResponse::html(shell(&title, content)))
}

fn feed_http(wiki: &Wiki, host: &str, space: &str, rss: bool) -> Result<HttpResponse> {
    let entries = wiki.store.read_changes(space, FEED_SIZE, 0)?;
    let ctx = feed::FeedContext {
        host,
        port: wiki.config.primary_port(),
        space,
    };
    let title = if space.is_empty() {
        format!("Changes on {host}")
    } else {
        format!("Changes on {host}/{space}")
    };
    Ok(if rss {
        HttpResponse::ok(
            "application/rss+xml",
            feed::rss(ctx, &title, &entries).into_bytes(),
        )
    } else {
        HttpResponse::ok(
            "application/atom+xml",
            feed::atom(ctx, &title, &entries).into_bytes(),
        )
    })
}
