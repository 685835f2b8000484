mod common;

use common::{body_text, status_line, TestWiki};
use phoebe::config::Overrides;

#[tokio::test]
async fn test_main_menu() {
    let wiki = TestWiki::new();
    let response = wiki.request("gemini://localhost/").await;
    assert_eq!(status_line(&response), "20 text/gemini; charset=UTF-8");
    let body = body_text(&response);
    assert!(body.starts_with("Welcome to Phoebe!"));
    assert!(body.contains("=> /do/index All pages"));
    assert!(body.contains("=> /do/changes Recent changes"));
}

#[tokio::test]
async fn test_main_menu_without_path() {
    let wiki = TestWiki::new();
    let response = wiki.request("gemini://localhost").await;
    assert_eq!(status_line(&response), "20 text/gemini; charset=UTF-8");
}

#[tokio::test]
async fn test_blog_strip_lists_dated_pages() {
    let wiki = TestWiki::new();
    let store = &wiki.wiki().store;
    store
        .write_page("", "2024-03-01 Spring", "spring\n", "0000")
        .unwrap();
    store
        .write_page("", "2024-06-01 Summer", "summer\n", "0000")
        .unwrap();
    store.write_page("", "NotDated", "x\n", "0000").unwrap();

    let body = body_text(&wiki.request("gemini://localhost/").await);
    assert!(body.contains("## Blog"));
    let summer = body.find("2024-06-01 Summer").unwrap();
    let spring = body.find("2024-03-01 Spring").unwrap();
    assert!(summer < spring, "newest entries come first");
    assert!(!body.contains("=> /page/NotDated"));
}

#[tokio::test]
async fn test_main_page_transcluded() {
    let wiki = TestWiki::with_overrides(Overrides {
        main_page: Some("Intro".to_string()),
        ..Default::default()
    });
    wiki.wiki()
        .store
        .write_page("", "Intro", "This wiki is about birds.\n", "0000")
        .unwrap();
    let body = body_text(&wiki.request("gemini://localhost/").await);
    assert!(body.starts_with("Welcome to Phoebe!"));
    assert!(body.contains("This wiki is about birds."));
}

#[tokio::test]
async fn test_page_footer_links() {
    let wiki = TestWiki::new();
    wiki.wiki()
        .store
        .write_page("", "Topic", "# Topic\nBody.\n", "0000")
        .unwrap();
    let body = body_text(&wiki.request("gemini://localhost/page/Topic").await);
    assert!(body.contains("=> /history/Topic History"));
    assert!(body.contains("=> /raw/Topic Raw text"));
    assert!(body.contains("=> /html/Topic HTML"));
}

#[tokio::test]
async fn test_historical_revision_footer_omits_history() {
    let wiki = TestWiki::new();
    let store = &wiki.wiki().store;
    store.write_page("", "Topic", "one\n", "0000").unwrap();
    store.write_page("", "Topic", "two\n", "0000").unwrap();

    let body = body_text(&wiki.request("gemini://localhost/page/Topic/1").await);
    assert!(body.starts_with("one"));
    assert!(body.contains("=> /page/Topic Current revision"));
    assert!(!body.contains("History\n"));
}

#[tokio::test]
async fn test_html_view_renders_gemtext() {
    let wiki = TestWiki::new();
    wiki.wiki()
        .store
        .write_page("", "Topic", "# Title\n=> Other Link label\n", "0000")
        .unwrap();
    let response = wiki.request("gemini://localhost/html/Topic").await;
    assert_eq!(status_line(&response), "20 text/html; charset=UTF-8");
    let body = body_text(&response);
    assert!(body.contains("<h1>Title</h1>"));
    assert!(body.contains("href=\"/page/Other\""));
}

#[tokio::test]
async fn test_missing_page_is_51() {
    let wiki = TestWiki::new();
    let response = wiki.request("gemini://localhost/page/Nothing").await;
    assert_eq!(status_line(&response), "51 Not found");
}

#[tokio::test]
async fn test_unknown_host_is_53() {
    let wiki = TestWiki::new();
    let response = wiki.request("gemini://elsewhere.example/").await;
    assert!(status_line(&response).starts_with("53"));
}

#[tokio::test]
async fn test_unknown_scheme_is_59() {
    let wiki = TestWiki::new();
    let response = wiki.request("gopher://localhost/").await;
    assert!(status_line(&response).starts_with("59"));
}

#[tokio::test]
async fn test_oversized_request_line_is_59() {
    let wiki = TestWiki::new();
    let line = format!("gemini://localhost/page/{}", "x".repeat(1100));
    let response = wiki.request(&line).await;
    assert!(status_line(&response).starts_with("59"));
}

#[tokio::test]
async fn test_search_and_match() {
    let wiki = TestWiki::new();
    let store = &wiki.wiki().store;
    store
        .write_page("", "Cooking", "All about pots.\n", "0000")
        .unwrap();
    store
        .write_page("", "Gardening", "All about soil.\n", "0000")
        .unwrap();

    let response = wiki.request("gemini://localhost/do/match?cook").await;
    let body = body_text(&response);
    assert!(body.contains("Cooking"));
    assert!(!body.contains("Gardening"));

    let response = wiki.request("gemini://localhost/do/search?soil").await;
    let body = body_text(&response);
    assert!(body.contains("Gardening"));
    assert!(!body.contains("Cooking"));
}

#[tokio::test]
async fn test_search_without_query_prompts() {
    let wiki = TestWiki::new();
    let response = wiki.request("gemini://localhost/do/search").await;
    assert!(status_line(&response).starts_with("10 "));
}

#[tokio::test]
async fn test_do_new_prompts_then_redirects_to_titan() {
    let wiki = TestWiki::new();
    let response = wiki.request("gemini://localhost/do/new").await;
    assert!(status_line(&response).starts_with("10 "));

    let response = wiki.request("gemini://localhost/do/new?New%20Page").await;
    assert_eq!(
        status_line(&response),
        "30 titan://localhost:1965/raw/New%20Page"
    );
}

#[tokio::test]
async fn test_changes_listing_and_pagination_link() {
    let wiki = TestWiki::new();
    let store = &wiki.wiki().store;
    for i in 0..31 {
        store
            .write_page("", &format!("Page{i}"), "x\n", "0000")
            .unwrap();
    }
    let body = body_text(&wiki.request("gemini://localhost/do/changes").await);
    assert!(body.starts_with("# Changes"));
    assert!(body.contains("Page30"));
    assert!(body.contains("=> /do/more/30 More..."));

    let more = body_text(&wiki.request("gemini://localhost/do/more/30").await);
    assert!(more.contains("Page0"));
}

#[tokio::test]
async fn test_feeds() {
    let wiki = TestWiki::new();
    wiki.wiki()
        .store
        .write_page("", "News", "fresh\n", "0000")
        .unwrap();

    let response = wiki.request("gemini://localhost/do/rss").await;
    assert_eq!(status_line(&response), "20 application/rss+xml");
    assert!(body_text(&response).contains("<rss version=\"2.0\">"));

    let response = wiki.request("gemini://localhost/do/atom").await;
    assert_eq!(status_line(&response), "20 application/atom+xml");
    let body = body_text(&response);
    assert!(body.contains("http://www.w3.org/2005/Atom"));
    assert!(body.contains("News"));

    let response = wiki.request("gemini://localhost/do/all/atom").await;
    assert_eq!(status_line(&response), "20 application/atom+xml");
}

#[tokio::test]
async fn test_robots_synthesised_per_space() {
    let wiki = TestWiki::with_overrides(Overrides {
        spaces: vec!["docs".to_string()],
        ..Default::default()
    });
    let response = wiki.request("gemini://localhost/robots.txt").await;
    assert_eq!(status_line(&response), "20 text/plain; charset=UTF-8");
    let body = body_text(&response);
    assert!(body.contains("Disallow: /raw/*"));
    assert!(body.contains("Disallow: /docs/raw/*"));
    assert!(body.contains("Crawl-delay: 10"));
    assert_eq!(body.matches("User-agent: *").count(), 2);
}

#[tokio::test]
async fn test_robots_page_served_verbatim() {
    let wiki = TestWiki::new();
    wiki.wiki()
        .store
        .write_page("", "robots", "User-agent: *\nDisallow: /\n", "0000")
        .unwrap();
    let response = wiki.request("gemini://localhost/robots.txt").await;
    assert_eq!(body_text(&response), "User-agent: *\nDisallow: /\n");
}

#[tokio::test]
async fn test_robots_mixes_verbatim_and_synthesised_per_space() {
    let wiki = TestWiki::with_overrides(Overrides {
        spaces: vec!["docs".to_string()],
        ..Default::default()
    });
    wiki.wiki()
        .store
        .write_page("docs", "robots", "User-agent: gus\nDisallow: /docs/secret\n", "0000")
        .unwrap();

    let body = body_text(&wiki.request("gemini://localhost/robots.txt").await);
    // The root space has no robots page and gets a synthesised stanza.
    assert!(body.contains("Disallow: /raw/*"));
    // The docs space has one and is served verbatim, not synthesised.
    assert!(body.contains("User-agent: gus\nDisallow: /docs/secret"));
    assert!(!body.contains("Disallow: /docs/raw/*"));
}

#[tokio::test]
async fn test_space_menu_and_isolation() {
    let wiki = TestWiki::with_overrides(Overrides {
        spaces: vec!["docs".to_string()],
        ..Default::default()
    });
    wiki.wiki()
        .store
        .write_page("docs", "Guide", "guide\n", "0000")
        .unwrap();

    let body = body_text(&wiki.request("gemini://localhost/docs/do/index").await);
    assert!(body.contains("=> /docs/page/Guide Guide"));

    let body = body_text(&wiki.request("gemini://localhost/do/index").await);
    assert!(!body.contains("Guide"));
}

#[tokio::test]
async fn test_diff_of_identical_revisions_is_empty() {
    let wiki = TestWiki::new();
    let store = &wiki.wiki().store;
    store.write_page("", "Same", "text\n", "0000").unwrap();
    store.write_page("", "Same", "text\n", "0000").unwrap();
    let body = body_text(&wiki.request("gemini://localhost/diff/Same/2").await);
    assert!(body.contains("No changes."));
}
