//! End-to-end pipeline tests: page, background and panel contexts wired
//! over the in-process bus, with delivery faults injected where the
//! contract calls for them.

use async_trait::async_trait;
use capture_router::{
    BackgroundService, CaptureRequest, ChaosBus, Config, ContextId, Fault, FragmentElement,
    InProcessBus, Message, MessagePort, PageCaptureController, PanelService, ScreenCaptureError,
    ScreenCapturePort, SelectionFragment, StaticPageDom, TriggerSource,
};
use capture_store::{CaptureKind, CaptureStore, MemoryKeyValue, StoreConfig};
use std::sync::Arc;
use std::time::Duration;

const PNG_URI: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

struct InstantScreen;

#[async_trait]
impl ScreenCapturePort for InstantScreen {
    async fn capture_visible_viewport(&self) -> Result<String, ScreenCaptureError> {
        Ok(PNG_URI.to_string())
    }

    async fn capture_from_stream(&self) -> Result<String, ScreenCaptureError> {
        Ok(PNG_URI.to_string())
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.router.replay_spacing_ms = 0;
    config.router.retry_base_delay_ms = 10;
    config
}

struct Pipeline {
    bus: Arc<InProcessBus>,
    store: Arc<CaptureStore>,
    panel: Arc<PanelService>,
}

/// Wire a full pipeline. The page controller is created per test so it can
/// sit behind a chaos decorator when the test wants delivery faults.
fn pipeline(attach_panel: bool) -> Pipeline {
    let config = test_config();
    let bus = Arc::new(InProcessBus::new());
    let kv = Arc::new(MemoryKeyValue::new());
    let store = Arc::new(CaptureStore::new(kv, StoreConfig::default()));

    let background = Arc::new(BackgroundService::new(&config, store.clone(), bus.clone()));
    let background_rx = bus.attach(ContextId::Background);
    tokio::spawn(background.clone().run(background_rx));

    let panel = Arc::new(PanelService::new(&config, store.clone(), bus.clone()));
    if attach_panel {
        let panel_rx = bus.attach(ContextId::Panel);
        tokio::spawn(panel.clone().run(panel_rx));
    }

    Pipeline { bus, store, panel }
}

fn page_controller(
    pipeline: &Pipeline,
) -> PageCaptureController<InstantScreen> {
    PageCaptureController::new(&test_config(), pipeline.bus.clone(), InstantScreen)
}

fn fox_page() -> StaticPageDom {
    StaticPageDom::new("Test Page", "https://example.com")
        .with_selection(
            SelectionFragment::new(
                "The quick brown fox",
                vec![FragmentElement::plain("span")],
            ),
            "<span>The quick brown fox</span>",
        )
        .with_meta("description", "A test page")
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(80)).await;
}

#[tokio::test]
async fn test_text_capture_flows_to_store_and_panel() {
    let pipeline = pipeline(true);
    let page = page_controller(&pipeline);

    let record = page
        .handle_trigger(
            CaptureRequest::classified(TriggerSource::Shortcut),
            &fox_page(),
        )
        .await
        .unwrap()
        .expect("capture should not be suppressed");

    assert_eq!(record.kind, CaptureKind::Text);
    assert_eq!(record.content, "The quick brown fox");
    assert_eq!(record.title, "Test Page");
    assert_eq!(record.url, "https://example.com");
    assert!(!record.meta_str("excerpt").unwrap_or("").is_empty());

    settle().await;

    let stored = pipeline.store.list().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, record.id);

    let displayed = pipeline.panel.displayed();
    assert_eq!(displayed.len(), 1);
    assert_eq!(displayed[0].id, record.id);
}

#[tokio::test]
async fn test_transport_redelivery_stores_once() {
    let pipeline = pipeline(false);
    let record = capture_store::CaptureRecord::new(
        CaptureKind::Text,
        "redelivered content".to_string(),
        "Test Page".to_string(),
        "https://example.com".to_string(),
    )
    .unwrap();

    // The same capture-reported message delivered twice within the window,
    // as a flaky transport would.
    let message = Message::capture_reported(ContextId::Page, &record);
    pipeline
        .bus
        .send(ContextId::Background, message.clone())
        .await
        .unwrap();
    pipeline
        .bus
        .send(ContextId::Background, message)
        .await
        .unwrap();

    settle().await;
    assert_eq!(pipeline.store.list().await.len(), 1);
}

#[tokio::test]
async fn test_closed_panel_gets_replay_on_attach() {
    let pipeline = pipeline(false);
    let page = page_controller(&pipeline);

    let record = page
        .handle_trigger(
            CaptureRequest::of(CaptureKind::Text, TriggerSource::Toolbar),
            &fox_page(),
        )
        .await
        .unwrap()
        .unwrap();

    settle().await;

    // The panel never heard the live message; the store did.
    assert!(pipeline.panel.displayed().is_empty());
    assert_eq!(pipeline.store.list().await.len(), 1);

    // Opening the panel replays the store.
    let shown = pipeline.panel.attach().await;
    assert_eq!(shown, 1);
    assert_eq!(pipeline.panel.displayed()[0].id, record.id);
}

#[tokio::test]
async fn test_dropped_delivery_is_absorbed() {
    let pipeline = pipeline(true);

    let chaos = Arc::new(ChaosBus::new(pipeline.bus.clone()));
    chaos.push_fault(Fault::Drop);
    let page = PageCaptureController::new(&test_config(), chaos.clone(), InstantScreen);

    // The send reports success but nothing arrives; the page side cannot
    // tell and must not fail.
    let record = page
        .handle_trigger(
            CaptureRequest::of(CaptureKind::Text, TriggerSource::Shortcut),
            &fox_page(),
        )
        .await
        .unwrap();
    assert!(record.is_some());

    settle().await;
    assert!(pipeline.store.list().await.is_empty());
    assert!(pipeline.panel.displayed().is_empty());
}

#[tokio::test]
async fn test_duplicated_delivery_renders_once() {
    let pipeline = pipeline(true);

    let chaos = Arc::new(ChaosBus::new(pipeline.bus.clone()));
    chaos.push_fault(Fault::Duplicate);
    let page = PageCaptureController::new(&test_config(), chaos.clone(), InstantScreen);

    page.handle_trigger(
        CaptureRequest::of(CaptureKind::Text, TriggerSource::Shortcut),
        &fox_page(),
    )
    .await
    .unwrap();

    settle().await;
    assert_eq!(pipeline.store.list().await.len(), 1);
    assert_eq!(pipeline.panel.displayed().len(), 1);
}

#[tokio::test]
async fn test_panel_request_relays_through_background_to_page() {
    let pipeline = pipeline(true);
    let page = page_controller(&pipeline);
    let mut page_rx = pipeline.bus.attach(ContextId::Page);

    pipeline
        .panel
        .request_capture(Some(CaptureKind::Text))
        .await
        .unwrap();

    settle().await;

    // Background relayed the request to the page context; the page handles
    // it like any trigger.
    let relayed = page_rx.recv().await.unwrap();
    let record = page.handle_message(relayed, &fox_page()).await.unwrap();
    assert!(record.is_some());

    settle().await;
    assert_eq!(pipeline.store.list().await.len(), 1);
}

#[tokio::test]
async fn test_clear_wins_over_pending_capture() {
    let pipeline = pipeline(true);
    let page = page_controller(&pipeline);

    page.handle_trigger(
        CaptureRequest::of(CaptureKind::Text, TriggerSource::Shortcut),
        &fox_page(),
    )
    .await
    .unwrap();
    settle().await;
    assert_eq!(pipeline.store.list().await.len(), 1);

    // Clear from the panel, then a capture arriving inside the grace
    // window: once everything settles the store stays empty.
    pipeline.panel.clear_all().await.unwrap();

    let other = StaticPageDom::new("Other Page", "https://example.com/other").with_selection(
        SelectionFragment::new("straggler", vec![FragmentElement::plain("span")]),
        "<span>straggler</span>",
    );
    page.handle_trigger(
        CaptureRequest::of(CaptureKind::Text, TriggerSource::Shortcut),
        &other,
    )
    .await
    .unwrap();

    settle().await;
    assert!(pipeline.store.list().await.is_empty());
}

#[tokio::test]
async fn test_screenshot_capture_flows_end_to_end() {
    let pipeline = pipeline(true);
    let page = page_controller(&pipeline);

    let record = page
        .handle_trigger(
            CaptureRequest::of(CaptureKind::Screenshot, TriggerSource::Toolbar),
            &fox_page(),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record.kind, CaptureKind::Screenshot);
    assert!(record.content.starts_with("data:image/png;base64,"));

    settle().await;
    assert_eq!(pipeline.store.list().await.len(), 1);
    assert_eq!(pipeline.panel.displayed().len(), 1);
}
