use crate::error::{Error, Result};
use crate::server::dispatch::Request;
use crate::server::response::Response;
use crate::server::{http, Wiki};
use crate::store::ChangeEntry;
use crate::wiki::{changes, diff, feed};

const CHANGES_PAGE_SIZE: usize = 30;
const FEED_SIZE: usize = 30;
pub(crate) const SEARCH_LIMIT: usize = 100;
const BLOG_LIMIT: usize = 10;

/// Route a Gemini request within its resolved space.
pub fn handle(wiki: &Wiki, request: &Request) -> Response {
    let segments: Vec<&str> = request.segments.iter().map(String::as_str).collect();
    let result = match segments.as_slice() {
        [] => main_menu(wiki, request),
        ["robots.txt"] => robots(wiki, request),
        ["page", name] => page_view(wiki, request, name, None),
        ["page", name, rev] => page_view(wiki, request, name, Some(parse_rev(rev))),
        ["raw", name] => raw_view(wiki, request, name, None),
        ["raw", name, rev] => raw_view(wiki, request, name, Some(parse_rev(rev))),
        ["html", name] => html_view(wiki, request, name, None),
        ["html", name, rev] => html_view(wiki, request, name, Some(parse_rev(rev))),
        ["history", name] => history_view(wiki, request, name),
        ["diff", name, rev] => diff_view(wiki, request, name, parse_rev(rev)),
        ["file", name] => file_view(wiki, request, name),
        ["do", "index"] => index_view(wiki, request),
        ["do", "match"] => match_view(wiki, request),
        ["do", "search"] => search_view(wiki, request),
        ["do", "changes"] => changes_view(wiki, request, Ok(0)),
        ["do", "more", offset] => changes_view(wiki, request, parse_offset(offset)),
        ["do", "all", "changes"] => all_changes_view(wiki, request),
        ["do", "rss"] => feed_view(wiki, request, FeedKind::Rss),
        ["do", "atom"] => feed_view(wiki, request, FeedKind::Atom),
        ["do", "all", "atom"] => all_atom_view(wiki, request),
        ["do", "new"] => new_page(wiki, request),
        _ => Err(Error::NotFound),
    };
    result.unwrap_or_else(Response::from)
}

enum FeedKind {
    Rss,
    Atom,
}

fn parse_rev(s: &str) -> Result<u64> {
    s.parse()
        .map_err(|_| Error::BadRequest(format!("Bad revision: {s}")))
}

fn parse_offset(s: &str) -> Result<usize> {
    s.parse()
        .map_err(|_| Error::BadRequest(format!("Bad offset: {s}")))
}

/// Link prefix for the current space.
fn base(space: &str) -> String {
    if space.is_empty() {
        String::new()
    } else {
        format!("/{space}")
    }
}

fn page_url(space: &str, name: &str) -> String {
    format!("{}/page/{}", base(space), urlencoding::encode(name))
}

fn decoded_query(request: &Request) -> Result<Option<String>> {
    match &request.query {
        Some(query) => urlencoding::decode(query)
            .map(|q| Some(q.into_owned()))
            .map_err(|_| Error::BadRequest("Bad query encoding".to_string())),
        None => Ok(None),
    }
}

fn effective_port(wiki: &Wiki, request: &Request) -> u16 {
    request.port.unwrap_or_else(|| wiki.config.primary_port())
}

/// Pages named like `YYYY-MM-DD…` feed the blog strip on the main menu.
pub(crate) fn is_iso_dated(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 10
        && bytes[0..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[5..7].iter().all(u8::is_ascii_digit)
        && bytes[7] == b'-'
        && bytes[8..10].iter().all(u8::is_ascii_digit)
}

fn main_menu(wiki: &Wiki, request: &Request) -> Result<Response> {
    let space = &request.space;
    let b = base(space);
    let mut body = String::from("Welcome to Phoebe!\n\n");

    if let Some(main_page) = &wiki.config.main_page {
        if let Ok(page) = wiki.store.read_page(space, main_page) {
            body.push_str(&page.text);
            if !body.ends_with('\n') {
                body.push('\n');
            }
            body.push('\n');
        }
    }

    for item in wiki.extensions.menu_items() {
        body.push_str(&format!("=> {} {}\n", item.url, item.label));
    }
    for extra in &wiki.config.pages {
        body.push_str(&format!("=> {} {}\n", page_url(space, extra), extra));
    }

    let mut blog: Vec<String> = wiki
        .store
        .list_pages(space)?
        .into_iter()
        .filter(|name| is_iso_dated(name))
        .collect();
    if !blog.is_empty() {
        blog.sort_unstable_by(|a, b| b.cmp(a));
        body.push_str("\n## Blog\n");
        for name in blog.iter().take(BLOG_LIMIT) {
            body.push_str(&format!("=> {} {}\n", page_url(space, name), name));
        }
    }

    body.push('\n');
    body.push_str(&format!("=> {b}/do/index All pages\n"));
    body.push_str(&format!("=> {b}/do/changes Recent changes\n"));
    body.push_str(&format!("=> {b}/do/rss RSS\n"));
    body.push_str(&format!("=> {b}/do/atom Atom\n"));
    body.push_str(&format!("=> {b}/do/new New page\n"));
    Ok(Response::gemtext(body))
}

fn footer(wiki: &Wiki, space: &str, name: &str, revision: Option<u64>) -> String {
    let b = base(space);
    let encoded = urlencoding::encode(name).into_owned();
    let mut footer = String::from("\n\n");
    match revision {
        None => {
            footer.push_str(&format!("=> {b}/history/{encoded} History\n"));
            footer.push_str(&format!("=> {b}/raw/{encoded} Raw text\n"));
            footer.push_str(&format!("=> {b}/html/{encoded} HTML\n"));
        }
        Some(rev) => {
            footer.push_str(&format!("=> {b}/page/{encoded} Current revision\n"));
            footer.push_str(&format!("=> {b}/raw/{encoded}/{rev} Raw text\n"));
            footer.push_str(&format!("=> {b}/html/{encoded}/{rev} HTML\n"));
        }
    }
    for extra in wiki.extensions.footers(space, name) {
        footer.push_str(&extra);
        if !footer.ends_with('\n') {
            footer.push('\n');
        }
    }
    footer
}

fn page_text(wiki: &Wiki, space: &str, name: &str, revision: Option<Result<u64>>) -> Result<String> {
    match revision {
        None => Ok(wiki.store.read_page(space, name)?.text),
        Some(rev) => wiki.store.read_page_revision(space, name, rev?),
    }
}

fn page_view(
    wiki: &Wiki,
    request: &Request,
    name: &str,
    revision: Option<Result<u64>>,
) -> Result<Response> {
    let revision = revision.transpose()?;
    let mut body = page_text(wiki, &request.space, name, revision.map(Ok))?;
    while body.ends_with('\n') {
        body.pop();
    }
    body.push_str(&footer(wiki, &request.space, name, revision));
    Ok(Response::gemtext(body))
}

fn raw_view(
    wiki: &Wiki,
    request: &Request,
    name: &str,
    revision: Option<Result<u64>>,
) -> Result<Response> {
    Ok(Response::plain(page_text(
        wiki,
        &request.space,
        name,
        revision,
    )?))
}

fn html_view(
    wiki: &Wiki,
    request: &Request,
    name: &str,
    revision: Option<Result<u64>>,
) -> Result<Response> {
    let text = page_text(wiki, &request.space, name, revision)?;
    Ok(Response::html(http::render_page(&request.space, name, &text)))
}

fn history_view(wiki: &Wiki, request: &Request, name: &str) -> Result<Response> {
    let space = &request.space;
    let b = base(space);
    let encoded = urlencoding::encode(name).into_owned();
    let revisions = wiki.store.list_revisions(space, name)?;
    let mut body = format!("# Page history for {name}\n");
    for &rev in &revisions {
        body.push_str(&format!("=> {b}/page/{encoded}/{rev} Revision {rev}\n"));
        if rev > 1 {
            body.push_str(&format!(
                "=> {b}/diff/{encoded}/{rev} Differences to revision {}\n",
                rev - 1
            ));
        }
    }
    Ok(Response::gemtext(body))
}

fn revision_or_empty(wiki: &Wiki, space: &str, name: &str, revision: u64) -> Result<String> {
    if revision == 0 {
        return Ok(String::new());
    }
    match wiki.store.read_page_revision(space, name, revision) {
        Ok(text) => Ok(text),
        Err(Error::NotFound) => Ok(String::new()),
        Err(e) => Err(e),
    }
}

fn diff_view(wiki: &Wiki, request: &Request, name: &str, revision: Result<u64>) -> Result<Response> {
    let revision = revision?;
    if revision == 0 {
        return Err(Error::BadRequest("Bad revision: 0".to_string()));
    }
    let space = &request.space;
    let old = revision_or_empty(wiki, space, name, revision - 1)?;
    let new = revision_or_empty(wiki, space, name, revision)?;
    if old.is_empty() && new.is_empty() {
        return Err(Error::NotFound);
    }
    let mut body = format!(
        "# Differences for {name}\nChanges from revision {} to revision {revision}:\n",
        revision - 1
    );
    let diff = diff::diff(&old, &new);
    if diff.is_empty() {
        body.push_str("No changes.\n");
    } else {
        body.push_str("```\n");
        body.push_str(&diff);
        body.push_str("```\n");
    }
    Ok(Response::gemtext(body))
}

fn file_view(wiki: &Wiki, request: &Request, name: &str) -> Result<Response> {
    let (data, mime) = wiki.store.read_file(&request.space, name)?;
    Ok(Response::success(&mime, data))
}

fn index_view(wiki: &Wiki, request: &Request) -> Result<Response> {
    let space = &request.space;
    let mut body = String::from("# All pages\n");
    let names = wiki.store.list_pages(space)?;
    if names.is_empty() {
        body.push_str("No pages yet.\n");
    }
    for name in &names {
        body.push_str(&format!("=> {} {}\n", page_url(space, name), name));
    }
    Ok(Response::gemtext(body))
}

fn match_view(wiki: &Wiki, request: &Request) -> Result<Response> {
    let Some(query) = decoded_query(request)? else {
        return Ok(Response::input("Page name to match"));
    };
    let space = &request.space;
    let needle = query.to_lowercase();
    let names: Vec<String> = wiki
        .store
        .list_pages(space)?
        .into_iter()
        .filter(|name| name.to_lowercase().contains(&needle))
        .collect();
    let mut body = format!("# Pages matching {query}\n");
    list_hits(&mut body, space, &names);
    Ok(Response::gemtext(body))
}

fn search_view(wiki: &Wiki, request: &Request) -> Result<Response> {
    let Some(query) = decoded_query(request)? else {
        return Ok(Response::input("Search term"));
    };
    let space = &request.space;
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
    let mut body = format!("# Search results for {query}\n");
    list_hits(&mut body, space, &names);
    Ok(Response::gemtext(body))
}

fn list_hits(body: &mut String, space: &str, names: &[String]) {
    if names.is_empty() {
        body.push_str("Nothing found.\n");
        return;
    }
    for name in names.iter().take(SEARCH_LIMIT) {
        body.push_str(&format!("=> {} {}\n", page_url(space, name), name));
    }
    if names.len() > SEARCH_LIMIT {
        body.push_str(&format!("Results truncated at {SEARCH_LIMIT} hits.\n"));
    }
}

fn change_line(space: &str, entry: &ChangeEntry) -> String {
    let b = base(space);
    let encoded = urlencoding::encode(&entry.name).into_owned();
    if entry.is_file() {
        format!(
            "=> {b}/file/{encoded} {} {} (file) by {}\n",
            changes::time_of_day(entry.timestamp),
            entry.name,
            entry.code
        )
    } else {
        format!(
            "=> {b}/page/{encoded} {} {} (revision {}) by {}\n",
            changes::time_of_day(entry.timestamp),
            entry.name,
            entry.revision,
            entry.code
        )
    }
}

fn changes_view(wiki: &Wiki, request: &Request, offset: Result<usize>) -> Result<Response> {
    let offset = offset?;
    let space = &request.space;
    let entries = wiki
        .store
        .read_changes(space, CHANGES_PAGE_SIZE, offset)?;
    let mut body = String::from("# Changes\n");
    if entries.is_empty() {
        body.push_str("No changes yet.\n");
        return Ok(Response::gemtext(body));
    }
    let mut current_day = String::new();
    for entry in &entries {
        let day = changes::day(entry.timestamp);
        if day != current_day {
            body.push_str(&format!("## {day}\n"));
            current_day = day;
        }
        body.push_str(&change_line(space, entry));
    }
    if entries.len() == CHANGES_PAGE_SIZE {
        body.push_str(&format!(
            "=> {}/do/more/{} More...\n",
            base(space),
            offset + CHANGES_PAGE_SIZE
        ));
    }
    Ok(Response::gemtext(body))
}

/// Spaces visible on this host, the root space first.
fn host_spaces(wiki: &Wiki, host: &str) -> Vec<String> {
    let mut spaces = vec![String::new()];
    spaces.extend(
        wiki.config
            .spaces_for_host(host)
            .into_iter()
            .map(String::from),
    );
    spaces
}

pub(crate) fn collect_all_changes(wiki: &Wiki, host: &str) -> Result<Vec<(String, ChangeEntry)>> {
    let mut all = Vec::new();
    for space in host_spaces(wiki, host) {
        for entry in wiki.store.read_changes(&space, CHANGES_PAGE_SIZE, 0)? {
            all.push((space.clone(), entry));
        }
    }
    all.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp));
    all.truncate(CHANGES_PAGE_SIZE);
    Ok(all)
}

fn all_changes_view(wiki: &Wiki, request: &Request) -> Result<Response> {
    let mut body = String::from("# Changes in all spaces\n");
    let all = collect_all_changes(wiki, &request.host)?;
    if all.is_empty() {
        body.push_str("No changes yet.\n");
        return Ok(Response::gemtext(body));
    }
    let mut current_day = String::new();
    for (space, entry) in &all {
        let day = changes::day(entry.timestamp);
        if day != current_day {
            body.push_str(&format!("## {day}\n"));
            current_day = day;
        }
        body.push_str(&change_line(space, entry));
    }
    Ok(Response::gemtext(body))
}

fn feed_title(host: &str, space: &str) -> String {
    if space.is_empty() {
        format!("Changes on {host}")
    } else {
        format!("Changes on {host}/{space}")
    }
}

fn feed_view(wiki: &Wiki, request: &Request, kind: FeedKind) -> Result<Response> {
    let entries = wiki.store.read_changes(&request.space, FEED_SIZE, 0)?;
    let ctx = feed::FeedContext {
        host: &request.host,
        port: effective_port(wiki, request),
        space: &request.space,
    };
    let title = feed_title(&request.host, &request.space);
    Ok(match kind {
        FeedKind::Rss => Response::success(
            "application/rss+xml",
            feed::rss(ctx, &title, &entries).into_bytes(),
        ),
        FeedKind::Atom => Response::success(
            "application/atom+xml",
            feed::atom(ctx, &title, &entries).into_bytes(),
        ),
    })
}

fn all_atom_view(wiki: &Wiki, request: &Request) -> Result<Response> {
    let all = collect_all_changes(wiki, &request.host)?;
    let title = format!("Changes on {} (all spaces)", request.host);
    let body = feed::atom_all(
        &request.host,
        effective_port(wiki, request),
        &title,
        &all,
    );
    Ok(Response::success("application/atom+xml", body.into_bytes()))
}

fn new_page(wiki: &Wiki, request: &Request) -> Result<Response> {
    let Some(name) = decoded_query(request)? else {
        return Ok(Response::input("Name of the new page"));
    };
    crate::store::path::validate_name(&name)?;
    let url = format!(
        "titan://{}:{}{}/raw/{}",
        request.host,
        effective_port(wiki, request),
        base(&request.space),
        urlencoding::encode(&name)
    );
    Ok(Response::redirect(&url))
}

fn robots_stanza(space: &str) -> String {
    let b = base(space);
    let mut stanza = String::from("User-agent: *\n");
    for path in [
        "raw/*",
        "html/*",
        "diff/*",
        "history/*",
        "do/changes*",
        "do/all/changes*",
        "do/rss",
        "do/atom",
        "do/all/atom",
        "do/new",
        "do/more/*",
        "do/match",
        "do/search",
    ] {
        stanza.push_str(&format!("Disallow: {b}/{path}\n"));
    }
    stanza.push_str("Crawl-delay: 10\n");
    stanza
}

/// The robots policy for a host, decided space by space: a space's
/// `robots` page is used verbatim when one exists, a stanza is
/// synthesised when not, and the results are concatenated.
pub(crate) fn robots_body(wiki: &Wiki, host: &str) -> Result<String> {
    let mut stanzas = Vec::new();
    for space in host_spaces(wiki, host) {
        match wiki.store.read_page(&space, "robots") {
            Ok(page) => stanzas.push(page.text),
            Err(Error::NotFound) => stanzas.push(robots_stanza(&space)),
            Err(e) => return Err(e),
        }
    }
    Ok(stanzas.join("\n"))
}

fn robots(wiki: &Wiki, request: &Request) -> Result<Response> {
    Ok(Response::plain(robots_body(wiki, &request.host)?))
}
