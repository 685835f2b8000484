use maud::{html, Markup};

/// One classified line of gemtext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    Text(&'a str),
    Link { url: &'a str, label: Option<&'a str> },
    Heading { level: u8, text: &'a str },
    Item(&'a str),
    Quote(&'a str),
    /// A line between fences, kept verbatim.
    Pre(&'a str),
    /// The ``` fence itself.
    PreToggle,
}

/// Classify gemtext line by line.
///
/// Inside a preformatted block no other classification applies; the block
/// is toggled by a line consisting of exactly three backticks.
pub fn parse(text: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut preformatted = false;
    for raw in text.lines() {
        if raw == "```" {
            preformatted = !preformatted;
            lines.push(Line::PreToggle);
            continue;
        }
        if preformatted {
            lines.push(Line::Pre(raw));
            continue;
        }
        lines.push(classify(raw));
    }
    lines
}

fn classify(raw: &str) -> Line<'_> {
    if let Some(rest) = raw.strip_prefix("=>") {
        if rest.starts_with([' ', '\t']) {
            let rest = rest.trim_start_matches([' ', '\t']);
            if !rest.is_empty() {
                let (url, label) = match rest.split_once([' ', '\t']) {
                    Some((url, label)) => {
                        let label = label.trim_matches([' ', '\t']);
                        (url, (!label.is_empty()).then_some(label))
                    }
                    None => (rest, None),
                };
                return Line::Link { url, label };
            }
        }
    }
    for (prefix, level) in [("### ", 3), ("## ", 2), ("# ", 1)] {
        if let Some(text) = raw.strip_prefix(prefix) {
            return Line::Heading { level, text };
        }
    }
    if let Some(text) = raw.strip_prefix("* ") {
        return Line::Item(text);
    }
    if let Some(text) = raw.strip_prefix("> ") {
        return Line::Quote(text);
    }
    Line::Text(raw)
}

/// Rewrite a gemtext link target for the HTML view. Absolute URLs pass
/// through; space-absolute paths gain the space prefix; anything else is
/// a page name.
#[must_use]
pub fn rewrite_link(url: &str, space: &str) -> String {
    let prefix = if space.is_empty() {
        String::new()
    } else {
        format!("/{space}")
    };
    if is_absolute(url) {
        url.to_string()
    } else if url.starts_with('/') {
        format!("{prefix}{url}")
    } else {
        format!("{prefix}/page/{url}")
    }
}

fn is_absolute(url: &str) -> bool {
    url.split('/').next().is_some_and(|first| first.contains(':'))
}

/// Render parsed gemtext as an escaped HTML fragment. Consecutive
/// preformatted lines collapse into one `<pre>`, consecutive list items
/// into one `<ul>`.
#[must_use]
pub fn to_html(lines: &[Line<'_>], space: &str) -> Markup {
    let mut blocks: Vec<Markup> = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        match &lines[i] {
            Line::PreToggle => i += 1,
            Line::Pre(_) => {
                let mut body = String::new();
                while let Some(Line::Pre(text)) = lines.get(i) {
                    body.push_str(text);
                    body.push('\n');
                    i += 1;
                }
                blocks.push(html! { pre { (body) } });
            }
            Line::Item(_) => {
                let mut items = Vec::new();
                while let Some(Line::Item(text)) = lines.get(i) {
                    items.push(*text);
                    i += 1;
                }
                blocks.push(html! { ul { @for item in &items { li { (item) } } } });
            }
            Line::Link { url, label } => {
                let href = rewrite_link(url, space);
                blocks.push(html! { p { a href=(href) { (label.unwrap_or(url)) } } });
                i += 1;
            }
            Line::Heading { level, text } => {
                blocks.push(match level {
                    1 => html! { h1 { (text) } },
                    2 => html! { h2 { (text) } },
                    _ => html! { h3 { (text) } },
                });
                i += 1;
            }
            Line::Quote(text) => {
                blocks.push(html! { blockquote { (text) } });
                i += 1;
            }
            Line::Text(text) => {
                if !text.is_empty() {
                    blocks.push(html! { p { (text) } });
                }
                i += 1;
            }
        }
    }
    html! { @for block in &blocks { (block) } }
}
