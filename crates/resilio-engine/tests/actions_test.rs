mod common;

use common::{MockPage, MockReasoner, engine, memory_store};
use resilio_engine::actions::{ActionError, ResilientPage, RetryPolicy};
use resilio_engine::fallback::FallbackAdapter;
use resilio_engine::resolution::AttemptOutcome;
use resilio_engine::{Origin, SelectChoice};
use std::sync::Arc;
use std::time::Duration;

fn quick_retries() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        backoff: Duration::from_millis(5),
    }
}

#[tokio::test]
async fn test_click_retries_next_candidate_after_execution_failure() {
    let store = memory_store();
    store.register_builtins("doc.save", ["#btnSalvar", "button[name=sbmSalvar]"]);
    let engine = Arc::new(engine(store.clone(), FallbackAdapter::disabled()));
    let page = MockPage::new()
        .with("#btnSalvar", "button")
        .with("button[name=sbmSalvar]", "button")
        .failing_clicks("#btnSalvar", usize::MAX);
    let mut page = ResilientPage::new(page, engine).with_retry_policy(quick_retries());

    let resolution = page.click("doc.save").await.unwrap();

    assert_eq!(resolution.selector, "button[name=sbmSalvar]");
    assert_eq!(resolution.attempts.len(), 2);
    assert!(matches!(
        resolution.attempts[0].outcome,
        AttemptOutcome::ExecutionFailed(_)
    ));
    assert_eq!(page.page().clicks, vec!["button[name=sbmSalvar]".to_string()]);

    assert_eq!(store.get("doc.save", "#btnSalvar").unwrap().failure_count, 1);
    assert_eq!(
        store
            .get("doc.save", "button[name=sbmSalvar]")
            .unwrap()
            .success_count,
        1
    );
}

#[tokio::test]
async fn test_execution_failure_surfaces_after_retries() {
    let store = memory_store();
    store.register_builtins("doc.save", ["#btnSalvar"]);
    let engine = Arc::new(engine(store, FallbackAdapter::disabled()));
    let page = MockPage::new()
        .with("#btnSalvar", "button")
        .failing_clicks("#btnSalvar", usize::MAX);
    let mut page = ResilientPage::new(page, engine).with_retry_policy(quick_retries());

    let err = page.click("doc.save").await.unwrap_err();

    match &err {
        ActionError::ExecutionFailed { cause, attempts, .. } => {
            assert!(cause.contains("overlay"));
            assert_eq!(attempts.len(), 1);
        }
        other => panic!("expected execution failure, got {other:?}"),
    }
    assert_eq!(err.action_key(), "doc.save");
}

#[tokio::test]
async fn test_transient_click_failure_recovers_on_retry_with_fallback() {
    let store = memory_store();
    store.register_builtins("doc.save", ["#btnSalvar"]);
    let reasoner = MockReasoner::replying("SELECTOR: #btnSalvarAlt");
    let engine = Arc::new(engine(store.clone(), reasoner.adapter()));
    let page = MockPage::new()
        .with("#btnSalvar", "button")
        .with("#btnSalvarAlt", "button")
        .failing_clicks("#btnSalvar", 1);
    let mut page = ResilientPage::new(page, engine).with_retry_policy(quick_retries());

    let resolution = page.click("doc.save").await.unwrap();

    assert_eq!(resolution.selector, "#btnSalvarAlt");
    assert_eq!(resolution.origin, Origin::Reasoning);
    assert_eq!(reasoner.call_count(), 1);
    let request = reasoner.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(request.tried, vec!["#btnSalvar".to_string()]);
}

#[tokio::test]
async fn test_unresolvable_action_is_resolution_failure() {
    let store = memory_store();
    store.register_builtins("doc.save", ["#btnSalvar"]);
    let engine = Arc::new(engine(store, FallbackAdapter::disabled()));
    let mut page = ResilientPage::new(MockPage::new(), engine).with_retry_policy(quick_retries());

    let err = page.click("doc.save").await.unwrap_err();

    assert!(matches!(err, ActionError::Resolution(_)));
    assert_eq!(err.attempts().len(), 1);
    assert!(page.page().clicks.is_empty());
}

#[tokio::test]
async fn test_fill_types_into_resolved_input() {
    let store = memory_store();
    store.register_builtins("login.user", ["#txtUsuario"]);
    let engine = Arc::new(engine(store, FallbackAdapter::disabled()));
    let mut page = ResilientPage::new(MockPage::new().with("#txtUsuario", "input"), engine);

    page.fill("login.user", "joao.silva").await.unwrap();

    assert_eq!(
        page.page().fills,
        vec![("#txtUsuario".to_string(), "joao.silva".to_string())]
    );
}

#[tokio::test]
async fn test_choose_selects_option_on_select() {
    let store = memory_store();
    store.register_builtins("login.org", ["#selOrgao"]);
    let engine = Arc::new(engine(store, FallbackAdapter::disabled()));
    let mut page = ResilientPage::new(MockPage::new().with("#selOrgao", "select"), engine);
    let choice = SelectChoice::Label("TRF4".into());

    page.choose("login.org", &choice).await.unwrap();

    assert_eq!(page.page().selections, vec![("#selOrgao".to_string(), choice)]);
    assert!(page.page().fills.is_empty());
}

#[tokio::test]
async fn test_choose_fills_autocomplete_input() {
    let store = memory_store();
    store.register_builtins("process.type", ["#txtTipoProcesso"]);
    let engine = Arc::new(engine(store, FallbackAdapter::disabled()));
    let mut page = ResilientPage::new(MockPage::new().with("#txtTipoProcesso", "input"), engine);

    page.choose("process.type", &SelectChoice::Value("Licitação".into()))
        .await
        .unwrap();

    assert_eq!(
        page.page().fills,
        vec![("#txtTipoProcesso".to_string(), "Licitação".to_string())]
    );
}

#[tokio::test]
async fn test_choose_on_other_tag_fails() {
    let store = memory_store();
    store.register_builtins("login.org", ["#selOrgao"]);
    let engine = Arc::new(engine(store, FallbackAdapter::disabled()));
    let mut page = ResilientPage::new(MockPage::new().with("#selOrgao", "div"), engine)
        .with_retry_policy(quick_retries());

    let err = page
        .choose("login.org", &SelectChoice::Label("TRF4".into()))
        .await
        .unwrap_err();

    assert!(matches!(err, ActionError::ExecutionFailed { .. }));
}

#[tokio::test]
async fn test_cancelled_page_performs_nothing() {
    let store = memory_store();
    store.register_builtins("doc.save", ["#btnSalvar"]);
    let engine = Arc::new(engine(store.clone(), FallbackAdapter::disabled()));
    let mut page = ResilientPage::new(MockPage::new().with("#btnSalvar", "button"), engine);

    page.cancellation_token().cancel();
    let err = page.click("doc.save").await.unwrap_err();
    assert!(matches!(err, ActionError::Cancelled(_)));
    assert!(page.page().clicks.is_empty());
    assert!(store.is_empty());

    page.reset_cancellation();
    assert!(page.click("doc.save").await.is_ok());
}

#[tokio::test]
async fn test_teach_adds_learned_candidate() {
    let store = memory_store();
    let engine = Arc::new(engine(store.clone(), FallbackAdapter::disabled()));
    let mut page = ResilientPage::new(MockPage::new().with("#novo", "button"), engine);

    page.teach("doc.sign", "#novo").await.unwrap();
    let resolution = page.click("doc.sign").await.unwrap();

    assert_eq!(resolution.origin, Origin::Learned);
    assert_eq!(store.get("doc.sign", "#novo").unwrap().success_count, 1);
}

#[tokio::test]
async fn test_locate_accepts_hidden_elements() {
    let store = memory_store();
    store.register_builtins("doc.token", ["#hdnToken"]);
    let engine = Arc::new(engine(store, FallbackAdapter::disabled()));
    let mut page = ResilientPage::new(MockPage::new().with_hidden("#hdnToken", "input"), engine);

    let resolution = page.locate("doc.token").await.unwrap();
    assert!(!resolution.element.visible);
}
