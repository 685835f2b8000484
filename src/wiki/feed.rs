use chrono::{DateTime, SecondsFormat, Utc};

use crate::store::ChangeEntry;

/// Where a feed is rooted: one host, one space.
#[derive(Debug, Clone, Copy)]
pub struct FeedContext<'a> {
    pub host: &'a str,
    pub port: u16,
    pub space: &'a str,
}

impl FeedContext<'_> {
    fn base(&self) -> String {
        let mut base = format!("gemini://{}:{}", self.host, self.port);
        if !self.space.is_empty() {
            base.push('/');
            base.push_str(self.space);
        }
        base
    }

    fn entry_url(&self, entry: &ChangeEntry) -> String {
        let kind = if entry.is_file() { "file" } else { "page" };
        format!(
            "{}/{}/{}",
            self.base(),
            kind,
            urlencoding::encode(&entry.name)
        )
    }

    /// Stable entry identifier in tag-URI form.
    fn guid(&self, entry: &ChangeEntry) -> String {
        format!(
            "tag:{},{}:{}/{}?rev={}",
            self.host,
            super::changes::day(entry.timestamp),
            self.space,
            entry.name,
            entry.revision
        )
    }
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn rfc2822(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .unwrap_or_default()
        .to_rfc2822()
}

fn rfc3339(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// RSS 2.0 rendition of change-log entries, newest first.
#[must_use]
pub fn rss(ctx: FeedContext<'_>, title: &str, entries: &[ChangeEntry]) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<rss version=\"2.0\">\n<channel>\n");
    out.push_str(&format!("<title>{}</title>\n", xml_escape(title)));
    out.push_str(&format!("<link>{}/</link>\n", xml_escape(&ctx.base())));
    out.push_str("<description>Recent changes</description>\n");
    if let Some(newest) = entries.first() {
        out.push_str(&format!(
            "<lastBuildDate>{}</lastBuildDate>\n",
            rfc2822(newest.timestamp)
        ));
    }
    for entry in entries {
        out.push_str("<item>\n");
        out.push_str(&format!("<title>{}</title>\n", xml_escape(&entry.name)));
        out.push_str(&format!("<link>{}</link>\n", xml_escape(&ctx.entry_url(entry))));
        out.push_str(&format!(
            "<guid isPermaLink=\"false\">{}</guid>\n",
            xml_escape(&ctx.guid(entry))
        ));
        out.push_str(&format!("<pubDate>{}</pubDate>\n", rfc2822(entry.timestamp)));
        out.push_str(&format!(
            "<description>Change by {}</description>\n",
            xml_escape(&entry.code)
        ));
        out.push_str("</item>\n");
    }
    out.push_str("</channel>\n</rss>\n");
    out
}

fn atom_entry(ctx: FeedContext<'_>, entry: &ChangeEntry) -> String {
    let mut out = String::from("<entry>\n");
    out.push_str(&format!("<title>{}</title>\n", xml_escape(&entry.name)));
    out.push_str(&format!(
        "<link href=\"{}\"/>\n",
        xml_escape(&ctx.entry_url(entry))
    ));
    out.push_str(&format!("<id>{}</id>\n", xml_escape(&ctx.guid(entry))));
    out.push_str(&format!("<updated>{}</updated>\n", rfc3339(entry.timestamp)));
    out.push_str(&format!(
        "<author><name>{}</name></author>\n",
        xml_escape(&entry.code)
    ));
    out.push_str("</entry>\n");
    out
}

fn atom_shell(id: &str, title: &str, updated: i64, entries: &str) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<feed xmlns=\"http://www.w3.org/2005/Atom\">\n");
    out.push_str(&format!("<title>{}</title>\n", xml_escape(title)));
    out.push_str(&format!(
        "<link href=\"{id}\"/>\n<id>{id}</id>\n",
        id = xml_escape(id)
    ));
    out.push_str(&format!("<updated>{}</updated>\n", rfc3339(updated)));
    out.push_str(entries);
    out.push_str("</feed>\n");
    out
}

/// Atom 1.0 rendition of change-log entries, newest first.
#[must_use]
pub fn atom(ctx: FeedContext<'_>, title: &str, entries: &[ChangeEntry]) -> String {
    let body: String = entries.iter().map(|e| atom_entry(ctx, e)).collect();
    let updated = entries.first().map_or(0, |e| e.timestamp);
    atom_shell(&format!("{}/", ctx.base()), title, updated, &body)
}

/// Atom feed aggregating entries from several spaces of one host.
#[must_use]
pub fn atom_all(host: &str, port: u16, title: &str, items: &[(String, ChangeEntry)]) -> String {
    let body: String = items
        .iter()
        .map(|(space, entry)| {
            let ctx = FeedContext {
                host,
                port,
                space: space.as_str(),
            };
            atom_entry(ctx, entry)
        })
        .collect();
    let updated = items.first().map_or(0, |(_, e)| e.timestamp);
    atom_shell(
        &format!("gemini://{host}:{port}/do/all/atom"),
        title,
        updated,
        &body,
    )
}
