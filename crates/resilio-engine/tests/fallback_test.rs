mod common;

use common::{MockPage, MockReasoner};
use resilio_engine::fallback::{FallbackAdapter, FallbackUnavailable, SnapshotLimits};
use resilio_engine::schema::FallbackConfig;

#[tokio::test]
async fn test_disabled_adapter_never_calls_service() {
    let reasoner = MockReasoner::replying("SELECTOR: #x");
    let adapter = FallbackAdapter::from_config(&FallbackConfig::default());
    let mut page = MockPage::new().with("#x", "button");

    let result = adapter.discover(&mut page, "login.button", &[]).await;

    assert_eq!(result, Err(FallbackUnavailable::Disabled));
    assert_eq!(reasoner.call_count(), 0);
    assert!(page.queries.is_empty());
}

#[tokio::test]
async fn test_enabled_without_key_has_no_service() {
    let config = FallbackConfig {
        enabled: true,
        ..FallbackConfig::default()
    };
    let adapter = FallbackAdapter::from_config(&config);
    assert!(adapter.is_enabled());

    let result = adapter
        .discover(&mut MockPage::new(), "login.button", &[])
        .await;
    assert_eq!(result, Err(FallbackUnavailable::NoService));
}

#[tokio::test]
async fn test_valid_suggestion_is_returned() {
    let reasoner = MockReasoner::replying("I found it.\nSELECTOR: `#acessar`");
    let mut page = MockPage::new().with("#acessar", "button");

    let selector = reasoner
        .adapter()
        .discover(&mut page, "login.button", &["#sbmLogin".to_string()])
        .await
        .unwrap();

    assert_eq!(selector, "#acessar");
    assert_eq!(page.queried("#acessar"), 1);
    let request = reasoner.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(request.action_key, "login.button");
    assert!(request.prompt().contains("#sbmLogin"));
    assert!(request.snapshot.structure.contains("#acessar"));
    assert_eq!(
        request.snapshot.url.as_deref(),
        Some("https://portal.example/controlador.php")
    );
}

#[tokio::test]
async fn test_unparseable_reply_is_rejected() {
    let reasoner = MockReasoner::replying("Sorry, I cannot see a login button on this page.");
    let result = reasoner
        .adapter()
        .discover(&mut MockPage::new(), "login.button", &[])
        .await;
    assert_eq!(result, Err(FallbackUnavailable::Unparseable));
}

#[tokio::test]
async fn test_already_tried_suggestion_is_rejected() {
    let reasoner = MockReasoner::replying("SELECTOR: #sbmLogin");
    let mut page = MockPage::new().with("#sbmLogin", "button");

    let result = reasoner
        .adapter()
        .discover(&mut page, "login.button", &["#sbmLogin".to_string()])
        .await;

    assert_eq!(
        result,
        Err(FallbackUnavailable::AlreadyAttempted("#sbmLogin".into()))
    );
    assert!(page.queries.is_empty());
}

#[tokio::test]
async fn test_suggestion_missing_from_page_is_rejected() {
    let reasoner = MockReasoner::replying("SELECTOR: #imaginary");
    let result = reasoner
        .adapter()
        .discover(&mut MockPage::new(), "login.button", &[])
        .await;
    assert_eq!(
        result,
        Err(FallbackUnavailable::NotOnPage("#imaginary".into()))
    );
}

#[tokio::test]
async fn test_service_error_is_unavailable() {
    let reasoner = MockReasoner::failing("boom");
    let result = reasoner
        .adapter()
        .discover(&mut MockPage::new(), "login.button", &[])
        .await;
    assert!(matches!(result, Err(FallbackUnavailable::Service(_))));
}

#[tokio::test]
async fn test_crashed_page_is_snapshot_failure() {
    let reasoner = MockReasoner::replying("SELECTOR: #x");
    let mut page = MockPage::new();
    page.crashed = true;

    let result = reasoner
        .adapter()
        .discover(&mut page, "login.button", &[])
        .await;

    assert!(matches!(result, Err(FallbackUnavailable::Snapshot(_))));
    assert_eq!(reasoner.call_count(), 0);
}

#[tokio::test]
async fn test_snapshot_respects_limits() {
    let reasoner = MockReasoner::replying("SELECTOR: #a");
    let adapter = reasoner.adapter().with_limits(SnapshotLimits {
        jpeg_quality: 50,
        max_structure_chars: 10,
        max_screenshot_bytes: 2,
    });
    let mut page = MockPage::new().with("#a", "button").with("#b", "button");

    adapter.discover(&mut page, "doc.save", &[]).await.unwrap();

    let request = reasoner.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(request.snapshot.structure.chars().count(), 10);
    // The mock JPEG is 4 bytes, over budget.
    assert!(request.snapshot.screenshot_jpeg.is_none());
}
