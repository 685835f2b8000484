mod common;

use common::{body_of, body_text, status_line, TestWiki};
use phoebe::config::Overrides;

const WELCOME: &[u8] = b"Welcome to the wiki!\nPlease be kind.";

#[tokio::test]
async fn test_page_write_then_read() {
    let wiki = TestWiki::new();
    let response = wiki
        .titan(
            "titan://localhost/raw/Welcome;mime=text/plain;size=36;token=hello",
            WELCOME,
        )
        .await;
    assert_eq!(
        status_line(&response),
        "30 gemini://localhost:1965/page/Welcome"
    );

    let response = wiki.request("gemini://localhost/page/Welcome").await;
    assert_eq!(status_line(&response), "20 text/gemini; charset=UTF-8");
    assert!(body_text(&response).starts_with("Welcome to the wiki!\nPlease be kind."));

    let response = wiki.request("gemini://localhost/raw/Welcome").await;
    assert_eq!(status_line(&response), "20 text/plain; charset=UTF-8");
    assert_eq!(body_of(&response), WELCOME);
}

#[tokio::test]
async fn test_wrong_token_leaves_store_unchanged() {
    let wiki = TestWiki::new();
    let response = wiki
        .titan(
            "titan://localhost/raw/Welcome;mime=text/plain;size=36;token=wrong",
            WELCOME,
        )
        .await;
    assert_eq!(status_line(&response), "59 Your token is the wrong token");

    let response = wiki.request("gemini://localhost/page/Welcome").await;
    assert_eq!(status_line(&response), "51 Not found");
}

#[tokio::test]
async fn test_missing_token_rejected() {
    let wiki = TestWiki::new();
    let response = wiki
        .titan("titan://localhost/raw/X;mime=text/plain;size=1", b"x")
        .await;
    assert!(status_line(&response).starts_with("59"));
}

#[tokio::test]
async fn test_file_upload_roundtrip() {
    let wiki = TestWiki::with_overrides(Overrides {
        mime_types: vec!["image/jpeg".to_string()],
        ..Default::default()
    });
    let payload: Vec<u8> = (0..40_960u32).map(|i| (i % 251) as u8).collect();
    let line = format!(
        "titan://localhost/file/jupiter.jpg;mime=image/jpeg;size={};token=hello",
        payload.len()
    );
    let response = wiki.titan(&line, &payload).await;
    assert_eq!(
        status_line(&response),
        "30 gemini://localhost:1965/file/jupiter.jpg"
    );

    let response = wiki.request("gemini://localhost/file/jupiter.jpg").await;
    assert_eq!(status_line(&response), "20 image/jpeg");
    assert_eq!(body_of(&response), payload);
}

#[tokio::test]
async fn test_disallowed_mime_named_in_rejection() {
    let wiki = TestWiki::with_overrides(Overrides {
        mime_types: vec!["image/jpeg".to_string()],
        ..Default::default()
    });
    let response = wiki
        .titan(
            "titan://localhost/file/jupiter.png;mime=image/png;size=4;token=hello",
            b"\x89PNG",
        )
        .await;
    assert_eq!(
        status_line(&response),
        "59 This wiki does not allow image/png"
    );
}

#[tokio::test]
async fn test_mime_wildcard_matches_subtypes() {
    let wiki = TestWiki::with_overrides(Overrides {
        mime_types: vec!["image".to_string()],
        ..Default::default()
    });
    let response = wiki
        .titan(
            "titan://localhost/file/pic.webp;mime=image/webp;size=4;token=hello",
            b"RIFF",
        )
        .await;
    assert!(status_line(&response).starts_with("30 "));
}

#[tokio::test]
async fn test_sequential_writes_make_consecutive_revisions() {
    let wiki = TestWiki::new();
    for content in [b"A\n" as &[u8], b"B\n"] {
        let line = format!(
            "titan://localhost/raw/X;mime=text/plain;size={};token=hello",
            content.len()
        );
        let response = wiki.titan(&line, content).await;
        assert!(status_line(&response).starts_with("30 "));
    }

    let history = body_text(&wiki.request("gemini://localhost/history/X").await);
    assert!(history.contains("Revision 1"));
    assert!(history.contains("Revision 2"));

    let rev1 = wiki.request("gemini://localhost/raw/X/1").await;
    assert_eq!(body_of(&rev1), b"A\n");
    let rev2 = wiki.request("gemini://localhost/raw/X/2").await;
    assert_eq!(body_of(&rev2), b"B\n");

    let diff = body_text(&wiki.request("gemini://localhost/diff/X/2").await);
    assert!(diff.contains("< A\n"));
    assert!(diff.contains("> B\n"));
}

#[tokio::test]
async fn test_parallel_writes_are_totally_ordered() {
    let wiki = TestWiki::new();
    let (first, second) = tokio::join!(
        wiki.titan(
            "titan://localhost/raw/X;mime=text/plain;size=2;token=hello",
            b"A\n",
        ),
        wiki.titan(
            "titan://localhost/raw/X;mime=text/plain;size=2;token=hello",
            b"B\n",
        ),
    );
    assert!(status_line(&first).starts_with("30 "));
    assert!(status_line(&second).starts_with("30 "));

    let history = body_text(&wiki.request("gemini://localhost/history/X").await);
    assert!(history.contains("Revision 1"));
    assert!(history.contains("Revision 2"));

    let rev1 = body_text(&wiki.request("gemini://localhost/raw/X/1").await);
    let rev2 = body_text(&wiki.request("gemini://localhost/raw/X/2").await);
    let mut contents = vec![rev1, rev2];
    contents.sort();
    assert_eq!(contents, vec!["A\n".to_string(), "B\n".to_string()]);
}

#[tokio::test]
async fn test_size_limit_boundary() {
    let wiki = TestWiki::new();

    let at_limit = vec![b'x'; 10_000];
    let line = format!(
        "titan://localhost/raw/Big;mime=text/plain;size={};token=hello",
        at_limit.len()
    );
    let response = wiki.titan(&line, &at_limit).await;
    assert!(status_line(&response).starts_with("30 "));

    let response = wiki
        .titan(
            "titan://localhost/raw/Big;mime=text/plain;size=10001;token=hello",
            &vec![b'x'; 10_001],
        )
        .await;
    assert_eq!(
        status_line(&response),
        "59 This wiki does not allow more than 10000 bytes per page"
    );
}

#[tokio::test]
async fn test_empty_body_deletes_but_keeps_history() {
    let wiki = TestWiki::new();
    let response = wiki
        .titan(
            "titan://localhost/raw/Doomed;mime=text/plain;size=8;token=hello",
            b"content\n",
        )
        .await;
    assert!(status_line(&response).starts_with("30 "));

    let response = wiki
        .titan(
            "titan://localhost/raw/Doomed;mime=text/plain;size=0;token=hello",
            b"",
        )
        .await;
    assert!(status_line(&response).starts_with("30 "));

    let response = wiki.request("gemini://localhost/page/Doomed").await;
    assert_eq!(status_line(&response), "51 Not found");

    let history = body_text(&wiki.request("gemini://localhost/history/Doomed").await);
    assert!(history.contains("Revision 1"));
}

#[tokio::test]
async fn test_exactly_declared_size_consumed() {
    let wiki = TestWiki::new();
    let response = wiki
        .titan(
            "titan://localhost/raw/Exact;mime=text/plain;size=5;token=hello",
            b"12345TRAILING GARBAGE",
        )
        .await;
    assert!(status_line(&response).starts_with("30 "));

    let response = wiki.request("gemini://localhost/raw/Exact").await;
    assert_eq!(body_of(&response), b"12345");
}

#[tokio::test]
async fn test_short_body_rejected() {
    let wiki = TestWiki::new();
    let response = wiki
        .titan(
            "titan://localhost/raw/Short;mime=text/plain;size=100;token=hello",
            b"only a little",
        )
        .await;
    assert!(status_line(&response).starts_with("59"));
}

#[tokio::test]
async fn test_non_plain_mime_rejected_for_pages() {
    let wiki = TestWiki::new();
    let response = wiki
        .titan(
            "titan://localhost/raw/X;mime=text/html;size=1;token=hello",
            b"x",
        )
        .await;
    assert_eq!(status_line(&response), "59 This wiki does not allow text/html");
}

#[tokio::test]
async fn test_writes_into_space() {
    let wiki = TestWiki::with_overrides(Overrides {
        spaces: vec!["docs".to_string()],
        ..Default::default()
    });
    let response = wiki
        .titan(
            "titan://localhost/docs/raw/Guide;mime=text/plain;size=6;token=hello",
            b"guide\n",
        )
        .await;
    assert_eq!(
        status_line(&response),
        "30 gemini://localhost:1965/docs/page/Guide"
    );

    let response = wiki.request("gemini://localhost/docs/page/Guide").await;
    assert!(body_text(&response).starts_with("guide"));

    // The root space does not see it.
    let response = wiki.request("gemini://localhost/page/Guide").await;
    assert_eq!(status_line(&response), "51 Not found");
}

#[tokio::test]
async fn test_percent_encoded_names_roundtrip() {
    let wiki = TestWiki::new();
    let response = wiki
        .titan(
            "titan://localhost/raw/My%20Page;mime=text/plain;size=3;token=hello",
            b"hi\n",
        )
        .await;
    assert_eq!(
        status_line(&response),
        "30 gemini://localhost:1965/page/My%20Page"
    );

    let index = body_text(&wiki.request("gemini://localhost/do/index").await);
    assert!(index.contains("=> /page/My%20Page My Page"));

    let changes = body_text(&wiki.request("gemini://localhost/do/changes").await);
    assert!(changes.contains("My Page"));
}

#[tokio::test]
async fn test_malformed_size_rejected() {
    let wiki = TestWiki::new();
    let response = wiki
        .titan(
            "titan://localhost/raw/X;mime=text/plain;size=nope;token=hello",
            b"",
        )
        .await;
    assert!(status_line(&response).starts_with("59"));
}
