//! # Controller Tests
//!
//! End-to-end flows of the evaluation panel: opening against a host page,
//! rating, adding and editing metrics, and reacting to page events. Sheets
//! come from an in-memory source; webhooks are served by a mock server.

mod common;

use common::{
    closed_page, configuration_row, fixture_source, setup_tracing, MockSheetSource, CONVERSATION,
    SKILL,
};
use evalpanel::constants::CONFIGURATION_SHEET;
use evalpanel::controller::add::AddPhase;
use evalpanel::controller::panel::AlertKind;
use evalpanel::controller::{ADD_SUCCESS, RATE_SUCCESS, UPDATE_SUCCESS};
use evalpanel::{
    EvalController, EvalError, OpenOutcome, PageEvent, StaticHostPage, Tab, ValidationError,
    WatchConfig, WebhookClient, WebhookConfig,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn controller(
    page: Arc<StaticHostPage>,
    source: &MockSheetSource,
    server: &MockServer,
) -> EvalController {
    let webhooks = WebhookClient::new(WebhookConfig {
        add_metric_url: format!("{}/add-metric", server.uri()),
        rate_url: format!("{}/rate", server.uri()),
        auth_token: "token".to_string(),
    })
    .unwrap();
    EvalController::new(page, Arc::new(source.clone()), webhooks, WatchConfig::default())
}

async fn mount_ok(server: &MockServer, route: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn request_body(server: &MockServer, index: usize) -> Value {
    let requests = server.received_requests().await.unwrap();
    requests[index].body_json().unwrap()
}

#[tokio::test]
async fn test_rate_flow_submits_grouped_ratings() {
    // --- 1. Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    mount_ok(&server, "/rate", 1).await;
    let source = fixture_source();
    let mut controller = controller(closed_page(), &source, &server);

    // --- 2. Act ---
    let outcome = controller.open().await.unwrap();
    assert_eq!(outcome, OpenOutcome::Opened);
    assert_eq!(controller.tabs(), vec![Tab::Rate, Tab::View, Tab::Add]);
    assert_eq!(controller.submit_button().unwrap().label, "Submit");

    let rate = controller.rate_tab_mut().unwrap();
    assert_eq!(rate.cards().len(), 2, "shared template renders one card");
    rate.inputs_mut().choose("greeting.Opening.greeted", true);
    rate.inputs_mut().enter_text("greeting.Opening.tone", "Warm");
    rate.inputs_mut().choose("escalated", false);
    controller.submit().await.unwrap();

    // --- 3. Assert ---
    let alert = controller.alert(Tab::Rate).unwrap();
    assert_eq!(alert.kind, AlertKind::Success);
    assert_eq!(alert.message, RATE_SUCCESS);

    let body = request_body(&server, 0).await;
    assert_eq!(body["conversationId"], "conv-1001");
    assert_eq!(body["skill"], "Sales");
    let opening = json!({"Opening": {"greeted": true, "tone": "Warm"}});
    assert_eq!(
        body["ratings"],
        json!([{"greeting": opening}, {"closingLine": opening}, {"escalated": false}])
    );
    assert_eq!(source.fetch_count(), 6, "sheets reload after submission");
    controller.close().await;
}

#[tokio::test]
async fn test_incomplete_rating_is_rejected_without_request() {
    // --- 1. Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    mount_ok(&server, "/rate", 0).await;
    let mut controller = controller(closed_page(), &fixture_source(), &server);
    controller.open().await.unwrap();

    // --- 2. Act ---
    let empty = controller.submit().await;
    controller
        .rate_tab_mut()
        .unwrap()
        .inputs_mut()
        .enter_text("greeting.Opening.tone", "Cold");
    let partial = controller.submit().await;

    // --- 3. Assert ---
    assert!(matches!(
        empty,
        Err(EvalError::Validation(ValidationError::NoRatings))
    ));
    match partial {
        Err(EvalError::Validation(ValidationError::IncompleteMetrics(names))) => {
            assert_eq!(names, vec!["Greeting", "Closing Line"])
        }
        other => panic!("expected incomplete metrics, got {other:?}"),
    }
    let alert = controller.alert(Tab::Rate).unwrap();
    assert_eq!(alert.kind, AlertKind::Error);
    assert!(alert.message.contains("Greeting, Closing Line"));
    assert!(controller.is_open(), "the panel stays usable after a rejection");
    controller.close().await;
}

#[tokio::test]
async fn test_negative_count_is_reported_inline() {
    setup_tracing();
    let server = MockServer::start().await;
    let mut controller = controller(closed_page(), &fixture_source(), &server);
    controller.open().await.unwrap();

    let result = controller.enter_count("escalated", "-3");

    assert!(matches!(
        result,
        Err(EvalError::Validation(ValidationError::NegativeCount(_)))
    ));
    assert_eq!(controller.alert(Tab::Rate).unwrap().kind, AlertKind::Error);
    controller.close().await;
}

#[tokio::test]
async fn test_open_refuses_open_conversation() {
    setup_tracing();
    let server = MockServer::start().await;
    let source = fixture_source();
    let page = closed_page();
    page.set_text("Chat in progress");
    let mut controller = controller(page, &source, &server);

    let result = controller.open().await;

    assert!(matches!(result, Err(EvalError::ConversationStillOpen)));
    assert!(!controller.is_open());
    assert_eq!(source.fetch_count(), 0, "no sheets are read for open conversations");
}

#[tokio::test]
async fn test_already_rated_requires_confirmation() {
    // --- 1. Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    let source = fixture_source();
    source.set_sheet(
        CONFIGURATION_SHEET,
        vec![configuration_row("Sales", ""), configuration_row("sales", "conv-1001")],
    );
    let mut controller = controller(closed_page(), &source, &server);

    // --- 2. Act ---
    let outcome = controller.open().await.unwrap();

    // --- 3. Assert ---
    assert_eq!(outcome, OpenOutcome::AlreadyRated);
    assert!(!controller.is_open());
    assert!(controller.diagnose().already_rated);

    controller.open_anyway();
    assert!(controller.is_open());
    assert_eq!(controller.active_tab(), Some(Tab::Rate));
    controller.close().await;
    controller.close().await;
    assert!(!controller.is_open());
}

#[tokio::test]
async fn test_sheet_failure_aborts_open() {
    setup_tracing();
    let server = MockServer::start().await;
    let source = fixture_source();
    source.set_failing(true);
    let mut controller = controller(closed_page(), &source, &server);

    let result = controller.open().await;

    assert!(matches!(result, Err(EvalError::SheetLoad(_))));
    assert!(!controller.is_open());
}

#[tokio::test]
async fn test_add_tab_requires_permission() {
    setup_tracing();
    let server = MockServer::start().await;
    let page = closed_page();
    page.set_user("Sam");
    let mut controller = controller(page, &fixture_source(), &server);
    controller.open().await.unwrap();

    assert_eq!(controller.tabs(), vec![Tab::Rate, Tab::View]);
    let result = controller.switch_tab(Tab::Add);
    assert!(matches!(
        result,
        Err(EvalError::Validation(ValidationError::PermissionDenied))
    ));
    assert!(controller.save_metric_update(0).await.is_err());
    controller.close().await;
}

#[tokio::test]
async fn test_switch_tab_when_closed() {
    setup_tracing();
    let server = MockServer::start().await;
    let mut controller = controller(closed_page(), &fixture_source(), &server);
    assert!(matches!(controller.switch_tab(Tab::View), Err(EvalError::NotOpen)));
    assert!(controller.submit_button().is_none());
}

#[tokio::test]
async fn test_add_flow_processes_previews_and_submits() {
    // --- 1. Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    mount_ok(&server, "/add-metric", 1).await;
    let source = fixture_source();
    let mut controller = controller(closed_page(), &source, &server);
    controller.open().await.unwrap();
    controller.switch_tab(Tab::Add).unwrap();
    assert_eq!(controller.submit_button().unwrap().label, "Process Metric(s)");

    let add = controller.add_tab_mut().unwrap();
    let id = add.forms()[0].id;
    let form = add.form_mut(id).unwrap();
    form.set_row(0, "Hold Count", "Times the client was put on hold");
    form.add_row();
    form.set_row(1, "Transfer Count", "");
    form.template_json = "```json\n{\"holds\": 2, \"resolved\": true}\n```".to_string();
    form.skills.toggle("Sales");

    // --- 2. Act ---
    controller.submit().await.unwrap();
    assert_eq!(controller.submit_button().unwrap().label, "Submit Metric");
    controller.submit().await.unwrap();

    // --- 3. Assert ---
    let alert = controller.alert(Tab::Add).unwrap();
    assert_eq!(alert.kind, AlertKind::Success);
    assert_eq!(alert.message, ADD_SUCCESS);

    let body = request_body(&server, 0).await;
    let rows = body["metrics"].as_array().unwrap();
    assert_eq!(rows.len(), 1, "names sharing a template are grouped");
    assert_eq!(rows[0]["definition"], "Hold Count, Transfer Count");
    assert_eq!(rows[0]["skills"], json!(["Sales"]));
    assert_eq!(rows[0]["enabled"], "TRUE");
    let template: Value = serde_json::from_str(rows[0]["template"].as_str().unwrap()).unwrap();
    assert_eq!(
        template,
        json!({"General": {"holds": "Count", "resolved": "Boolean"}})
    );

    let add = controller.add_tab().unwrap();
    assert_eq!(add.phase(), &AddPhase::Editing);
    assert_eq!(add.forms().len(), 1);
    assert!(add.forms()[0].template_json.is_empty());
    controller.close().await;
}

#[tokio::test]
async fn test_add_flow_rejects_duplicates_and_keeps_form() {
    setup_tracing();
    let server = MockServer::start().await;
    mount_ok(&server, "/add-metric", 0).await;
    let mut controller = controller(closed_page(), &fixture_source(), &server);
    controller.open().await.unwrap();
    controller.switch_tab(Tab::Add).unwrap();

    let add = controller.add_tab_mut().unwrap();
    let id = add.forms()[0].id;
    let form = add.form_mut(id).unwrap();
    form.set_row(0, "escalated", "");
    form.template_json = r#"{"ok": true}"#.to_string();
    form.skills.set_all(true);

    let result = controller.submit().await;

    match result {
        Err(EvalError::Validation(ValidationError::DuplicateMetric(name))) => {
            assert_eq!(name, "escalated")
        }
        other => panic!("expected a duplicate error, got {other:?}"),
    }
    let add = controller.add_tab().unwrap();
    assert!(!add.is_previewing());
    assert_eq!(add.forms()[0].rows[0].name, "escalated");
    assert_eq!(
        controller.alert(Tab::Add).unwrap().message,
        "Metric \"escalated\" already exists"
    );
    controller.close().await;
}

#[tokio::test]
async fn test_view_edit_saves_enabled_flag() {
    // --- 1. Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    mount_ok(&server, "/add-metric", 1).await;
    let mut controller = controller(closed_page(), &fixture_source(), &server);
    controller.open().await.unwrap();
    controller.switch_tab(Tab::View).unwrap();
    assert!(controller.submit_button().is_none());

    // --- 2. Act ---
    let view = controller.view_tab_mut().unwrap();
    view.toggle_edit(0);
    view.toggle_enabled(0);
    controller.save_metric_update(0).await.unwrap();

    // --- 3. Assert ---
    assert_eq!(controller.alert(Tab::View).unwrap().message, UPDATE_SUCCESS);
    assert!(!controller.view_tab().unwrap().is_editing(0));

    let body = request_body(&server, 0).await;
    let row = &body["metrics"][0];
    assert_eq!(row["definition"], "Greeting, Closing Line");
    assert_eq!(row["description"], "Greets the client, Closes politely");
    assert_eq!(row["enabled"], "FALSE");
    assert_eq!(row["skills"], json!(["Sales", "Support"]));
    controller.close().await;
}

#[tokio::test]
async fn test_conversation_change_refreshes_tabs() {
    // --- 1. Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    let mut controller = controller(closed_page(), &fixture_source(), &server);
    controller.open().await.unwrap();
    assert_eq!(controller.view_tab().unwrap().cards().len(), 2);

    // --- 2. Act ---
    controller
        .handle_page_event(PageEvent::ConversationChanged {
            conversation_id: "conv-0999".to_string(),
            skill: "Support".to_string(),
        })
        .await
        .unwrap();

    // --- 3. Assert ---
    assert_eq!(controller.session().context().conversation_id, "conv-0999");
    assert!(controller.session().is_already_rated());
    assert_eq!(controller.rate_tab().unwrap().cards().len(), 3);
    assert_eq!(controller.view_tab().unwrap().cards().len(), 2, "inactive tab is stale");
    controller.switch_tab(Tab::View).unwrap();
    assert_eq!(controller.view_tab().unwrap().cards().len(), 3);
    controller.close().await;
}

#[tokio::test]
async fn test_detached_modal_closes_panel() {
    setup_tracing();
    let server = MockServer::start().await;
    let page = closed_page();
    let mut controller = controller(page.clone(), &fixture_source(), &server);
    controller.open().await.unwrap();

    page.set_modal_attached(false);
    let event = tokio::time::timeout(
        Duration::from_secs(3),
        controller.next_page_event(),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(event, PageEvent::ModalDetached);
    controller.handle_page_event(event).await.unwrap();

    assert!(!controller.is_open());
}

#[tokio::test]
async fn test_events_from_a_closed_panel_are_dropped() {
    // --- 1. Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    let page = closed_page();
    let webhooks = WebhookClient::new(WebhookConfig {
        add_metric_url: format!("{}/add-metric", server.uri()),
        rate_url: format!("{}/rate", server.uri()),
        auth_token: "token".to_string(),
    })
    .unwrap();
    let fast_watch = WatchConfig {
        poll_interval: Duration::from_millis(20),
        settle_delay: Duration::from_millis(50),
    };
    let mut controller =
        EvalController::new(page.clone(), Arc::new(fixture_source()), webhooks, fast_watch);
    controller.open().await.unwrap();
    page.set_modal_attached(false);
    tokio::time::sleep(Duration::from_millis(200)).await;
    controller.close().await;

    // --- 2. Act ---
    page.set_modal_attached(true);
    assert_eq!(controller.open().await.unwrap(), OpenOutcome::Opened);
    let handled = controller.process_page_events().await.unwrap();

    // --- 3. Assert ---
    assert_eq!(handled, 0);
    assert!(controller.is_open(), "the reopened panel stays open");
    controller.close().await;
}

#[tokio::test]
async fn test_page_events_are_ignored_while_closed() {
    setup_tracing();
    let server = MockServer::start().await;
    let source = fixture_source();
    let mut controller = controller(closed_page(), &source, &server);

    controller
        .handle_page_event(PageEvent::ConversationChanged {
            conversation_id: "conv-0999".to_string(),
            skill: "Support".to_string(),
        })
        .await
        .unwrap();
    controller.handle_page_event(PageEvent::Reinitialize).await.unwrap();

    assert_eq!(source.fetch_count(), 0);
    assert_eq!(controller.session().context().conversation_id, "");
    assert!(!controller.is_open());
}

#[tokio::test]
async fn test_change_to_the_loaded_conversation_is_skipped() {
    // --- 1. Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    let source = fixture_source();
    let mut controller = controller(closed_page(), &source, &server);
    controller.open().await.unwrap();
    controller.handle_page_event(PageEvent::Reinitialize).await.unwrap();
    let fetches = source.fetch_count();

    // --- 2. Act ---
    controller
        .handle_page_event(PageEvent::ConversationChanged {
            conversation_id: CONVERSATION.to_string(),
            skill: SKILL.to_string(),
        })
        .await
        .unwrap();

    // --- 3. Assert ---
    assert_eq!(source.fetch_count(), fetches, "no reload for the loaded context");
    assert_eq!(controller.session().context().conversation_id, CONVERSATION);
    controller.close().await;
}

#[tokio::test]
async fn test_resize_is_clamped() {
    setup_tracing();
    let server = MockServer::start().await;
    let mut controller = controller(closed_page(), &fixture_source(), &server);
    controller.open().await.unwrap();

    controller.begin_resize(1000.0, 500.0);
    assert_eq!(controller.resize(900.0, 1920.0), Some(600.0));
    assert_eq!(controller.resize(1400.0, 1920.0), Some(350.0));
    assert_eq!(controller.resize(-2000.0, 1000.0), Some(800.0));
    controller.end_resize();
    assert_eq!(controller.resize(0.0, 1000.0), None);
    assert_eq!(controller.panel_width(), Some(800.0));
    controller.close().await;
}
