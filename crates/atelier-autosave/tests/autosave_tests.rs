//! Field autosave tests
//!
//! End-to-end behaviour of savers against a recording adapter on a paused
//! clock.

use atelier_autosave::prelude::*;
use atelier_autosave::{AdapterError, Affordance, IndicatorAction, SaveError};
use atelier_test_utils::{advance, site_binding, test_config, RecordingAdapter};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::time::Instant;

fn text_saver(adapter: &Arc<RecordingAdapter>, path: &str, baseline: &str) -> FieldSaver<String> {
    FieldSaver::bind(
        adapter.as_adapter(),
        site_binding(path),
        baseline.to_string(),
        &test_config(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_bind_does_not_write() {
    let adapter = RecordingAdapter::seeded();
    let saver = text_saver(&adapter, "heroHeadline", "Hello");

    advance(3000).await;
    assert_eq!(adapter.write_count(), 0);
    assert_eq!(saver.status(), SaveStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_rapid_changes_coalesce_into_one_write() {
    let adapter = RecordingAdapter::seeded();
    let saver = text_saver(&adapter, "heroHeadline", "Hello");

    saver.set_value("A".to_string());
    advance(100).await;
    saver.set_value("AB".to_string());
    advance(100).await;
    saver.set_value("ABC".to_string());
    assert_eq!(saver.status(), SaveStatus::Dirty);

    advance(1400).await;
    assert_eq!(adapter.write_count(), 0);

    advance(200).await;
    assert_eq!(adapter.values_for("heroHeadline"), vec![json!("ABC")]);
    assert_eq!(saver.status(), SaveStatus::Saved);
    assert_eq!(adapter.stored("heroHeadline"), Some(json!("ABC")));
}

#[tokio::test(start_paused = true)]
async fn test_revert_to_baseline_cancels_write() {
    let adapter = RecordingAdapter::seeded();
    let saver = text_saver(&adapter, "heroHeadline", "X");

    saver.set_value("Y".to_string());
    assert_eq!(saver.status(), SaveStatus::Dirty);
    advance(500).await;
    saver.set_value("X".to_string());
    assert_eq!(saver.status(), SaveStatus::Idle);

    advance(3000).await;
    assert_eq!(adapter.write_count(), 0);
    assert_eq!(saver.status(), SaveStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_retry_resends_failed_value() {
    let adapter = RecordingAdapter::seeded();
    let saver = text_saver(&adapter, "heroHeadline", "Hello");
    adapter.fail_next(AdapterError::Unavailable("offline".to_string()));

    saver.set_value("Z".to_string());
    advance(1600).await;
    assert_eq!(saver.status(), SaveStatus::Error);
    assert!(matches!(
        saver.error().as_deref(),
        Some(SaveError::Adapter(AdapterError::Unavailable(_)))
    ));
    assert_eq!(adapter.stored("heroHeadline"), Some(json!("Hello")));

    assert_eq!(saver.retry().await, SaveStatus::Saved);
    assert_eq!(
        adapter.values_for("heroHeadline"),
        vec![json!("Z"), json!("Z")]
    );
    assert_eq!(adapter.stored("heroHeadline"), Some(json!("Z")));
    assert!(saver.error().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failure_does_not_block_other_fields() {
    let adapter = RecordingAdapter::seeded();
    let headline = text_saver(&adapter, "heroHeadline", "Hello");
    let intro = text_saver(&adapter, "introText", "Welkom in het atelier");
    adapter.fail_next(AdapterError::PermissionDenied("rules".to_string()));

    headline.set_value("Nieuw".to_string());
    advance(100).await;
    intro.set_value("Welkom!".to_string());
    advance(2000).await;

    assert_eq!(headline.status(), SaveStatus::Error);
    assert_eq!(intro.status(), SaveStatus::Saved);
    assert_eq!(adapter.stored("introText"), Some(json!("Welkom!")));
}

#[tokio::test(start_paused = true)]
async fn test_flush_writes_immediately() {
    let adapter = RecordingAdapter::seeded();
    let saver = text_saver(&adapter, "heroSubheadline", "Latex couture");

    saver.set_value("Couture".to_string());
    assert_eq!(saver.flush().await, SaveStatus::Saved);
    assert_eq!(adapter.write_count(), 1);

    // The cancelled debounce must not fire a second write.
    advance(3000).await;
    assert_eq!(adapter.write_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_edit_during_write_is_queued() {
    let adapter = RecordingAdapter::seeded();
    adapter.set_latency(std::time::Duration::from_millis(1000));
    let saver = text_saver(&adapter, "heroHeadline", "A");

    saver.set_value("B".to_string());
    advance(1600).await;
    assert_eq!(saver.status(), SaveStatus::Saving);

    advance(400).await;
    saver.set_value("C".to_string());
    assert_eq!(saver.status(), SaveStatus::Dirty);

    // B lands but C is still pending.
    advance(600).await;
    assert_eq!(adapter.stored("heroHeadline"), Some(json!("B")));
    assert_eq!(saver.status(), SaveStatus::Dirty);

    advance(2000).await;
    assert_eq!(saver.status(), SaveStatus::Saved);
    assert_eq!(adapter.values_for("heroHeadline"), vec![json!("B"), json!("C")]);
    assert_eq!(adapter.stored("heroHeadline"), Some(json!("C")));
}

#[tokio::test(start_paused = true)]
async fn test_slow_write_with_queued_edit_sends_each_value_once() {
    let adapter = RecordingAdapter::seeded();
    adapter.set_latency(std::time::Duration::from_millis(2000));
    let saver = text_saver(&adapter, "heroHeadline", "A");

    saver.set_value("B".to_string());
    advance(1600).await;
    saver.set_value("C".to_string());

    // C's debounce fires while B is still in flight.
    advance(2000).await;
    assert_eq!(adapter.stored("heroHeadline"), Some(json!("B")));
    assert_eq!(saver.status(), SaveStatus::Saving);

    advance(5000).await;
    assert_eq!(saver.status(), SaveStatus::Saved);
    assert_eq!(adapter.values_for("heroHeadline"), vec![json!("B"), json!("C")]);
    assert_eq!(adapter.stored("heroHeadline"), Some(json!("C")));
}

#[tokio::test(start_paused = true)]
async fn test_slow_write_failure_is_not_retried_automatically() {
    let adapter = RecordingAdapter::seeded();
    adapter.set_latency(std::time::Duration::from_millis(2000));
    let saver = text_saver(&adapter, "heroHeadline", "A");

    saver.set_value("B".to_string());
    advance(1600).await;
    saver.set_value("C".to_string());
    advance(2000).await;
    adapter.fail_next(AdapterError::Unavailable("offline".to_string()));

    advance(2000).await;
    assert_eq!(saver.status(), SaveStatus::Error);
    advance(3000).await;
    assert_eq!(saver.status(), SaveStatus::Error);
    assert_eq!(adapter.values_for("heroHeadline"), vec![json!("B"), json!("C")]);
    assert_eq!(adapter.stored("heroHeadline"), Some(json!("B")));

    assert_eq!(saver.retry().await, SaveStatus::Saved);
    assert_eq!(
        adapter.values_for("heroHeadline"),
        vec![json!("B"), json!("C"), json!("C")]
    );
}

#[tokio::test(start_paused = true)]
async fn test_queued_edit_waits_for_retry_after_failure() {
    let adapter = RecordingAdapter::seeded();
    adapter.set_latency(std::time::Duration::from_millis(2000));
    adapter.fail_next(AdapterError::Unavailable("offline".to_string()));
    let saver = text_saver(&adapter, "heroHeadline", "A");

    saver.set_value("B".to_string());
    advance(1600).await;
    saver.set_value("C".to_string());

    advance(6000).await;
    assert_eq!(saver.status(), SaveStatus::Error);
    assert_eq!(adapter.values_for("heroHeadline"), vec![json!("B")]);

    // Retry resends B; C follows on its own debounce.
    assert_eq!(saver.retry().await, SaveStatus::Dirty);
    advance(4000).await;
    assert_eq!(saver.status(), SaveStatus::Saved);
    assert_eq!(
        adapter.values_for("heroHeadline"),
        vec![json!("B"), json!("B"), json!("C")]
    );
    assert_eq!(adapter.stored("heroHeadline"), Some(json!("C")));
}

#[tokio::test(start_paused = true)]
async fn test_revert_during_write_is_not_lost() {
    let adapter = RecordingAdapter::seeded();
    adapter.set_latency(std::time::Duration::from_millis(1000));
    let saver = text_saver(&adapter, "heroHeadline", "A");

    saver.set_value("B".to_string());
    advance(2000).await;
    saver.set_value("A".to_string());
    assert_eq!(saver.status(), SaveStatus::Saving);

    advance(4000).await;
    assert_eq!(saver.status(), SaveStatus::Saved);
    assert_eq!(adapter.values_for("heroHeadline"), vec![json!("B"), json!("A")]);
    assert_eq!(adapter.stored("heroHeadline"), Some(json!("A")));
}

#[tokio::test(start_paused = true)]
async fn test_drop_during_write_completes_quietly() {
    let adapter = RecordingAdapter::seeded();
    adapter.set_latency(std::time::Duration::from_millis(1000));
    let saver = text_saver(&adapter, "introText", "Welkom in het atelier");

    saver.set_value("Tot ziens".to_string());
    advance(1600).await;
    drop(saver);

    advance(2000).await;
    assert_eq!(adapter.stored("introText"), Some(json!("Tot ziens")));
}

#[tokio::test(start_paused = true)]
async fn test_nested_field_and_editor_stamp() {
    let adapter = RecordingAdapter::seeded();
    let saver = FieldSaver::bind(
        adapter.as_adapter(),
        site_binding("contact.email"),
        "iris@example.com".to_string(),
        &test_config().with_updated_by("owner"),
    );

    saver.set_value("atelier@example.com".to_string());
    saver.flush().await;

    assert_eq!(
        adapter.stored("contact"),
        Some(json!({"email": "atelier@example.com", "phone": "000"}))
    );
    assert_eq!(adapter.writes()[0].update.updated_by.as_deref(), Some("owner"));
}

fn steps_field(adapter: &Arc<RecordingAdapter>, items: Vec<Value>) -> ArrayField {
    ArrayField::new(
        adapter.as_adapter(),
        site_binding("werkwijzeSteps"),
        items,
        &test_config(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_array_item_edit_keeps_siblings() {
    let adapter = RecordingAdapter::seeded();
    let steps = steps_field(&adapter, vec![json!({"title": "A"}), json!({"title": "B"})]);
    let first = steps.item_saver(0, Some("title"), "A".to_string(), &test_config());

    first.set_value("A2".to_string());
    advance(1600).await;

    assert_eq!(first.status(), SaveStatus::Saved);
    assert_eq!(
        adapter.values_for("werkwijzeSteps"),
        vec![json!([{"title": "A2"}, {"title": "B"}])]
    );
}

#[tokio::test(start_paused = true)]
async fn test_array_write_includes_pending_sibling_edit() {
    let adapter = RecordingAdapter::seeded();
    let steps = steps_field(&adapter, vec![json!({"title": "A"}), json!({"title": "B"})]);
    let first = steps.item_saver(0, Some("title"), "A".to_string(), &test_config());
    let second = steps.item_saver(1, Some("title"), "B".to_string(), &test_config());

    first.set_value("A2".to_string());
    advance(1000).await;
    second.set_value("B2".to_string());
    advance(600).await;

    // First saver's write already carries the second item's local edit.
    assert_eq!(
        adapter.values_for("werkwijzeSteps"),
        vec![json!([{"title": "A2"}, {"title": "B2"}])]
    );

    advance(1500).await;
    assert_eq!(second.status(), SaveStatus::Saved);
    assert_eq!(adapter.write_count(), 2);
    assert_eq!(
        adapter.stored("werkwijzeSteps"),
        Some(json!([{"title": "A2"}, {"title": "B2"}]))
    );
}

#[tokio::test(start_paused = true)]
async fn test_removed_array_item_does_not_write() {
    let adapter = RecordingAdapter::seeded();
    let highlights = ArrayField::new(
        adapter.as_adapter(),
        site_binding("atelierHighlights"),
        vec![json!("Handwerk"), json!("Maatwerk")],
        &test_config(),
    );
    let second = highlights.item_saver(1, None, "Maatwerk".to_string(), &test_config());

    highlights.remove(1);
    second.set_value("Couture".to_string());
    assert_eq!(second.flush().await, SaveStatus::Error);
    assert!(matches!(
        second.snapshot().error.as_deref(),
        Some(SaveError::ItemRemoved { index: 1, len: 1 })
    ));
    assert_eq!(adapter.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_edit_after_earlier_item_removed_keeps_neighbours() {
    let adapter = RecordingAdapter::seeded();
    let highlights = ArrayField::new(
        adapter.as_adapter(),
        site_binding("atelierHighlights"),
        vec![json!("Handwerk"), json!("Maatwerk"), json!("Latex")],
        &test_config(),
    );
    let third = highlights.item_saver(2, None, "Latex".to_string(), &test_config());

    highlights.remove(0);
    highlights.persist().await.unwrap();
    third.set_value("Latex couture".to_string());
    advance(1600).await;

    assert_eq!(third.status(), SaveStatus::Saved);
    assert_eq!(third.index(), Some(1));
    assert_eq!(
        adapter.stored("atelierHighlights"),
        Some(json!(["Maatwerk", "Latex couture"]))
    );
}

#[tokio::test(start_paused = true)]
async fn test_guard_tracks_real_savers() {
    let adapter = RecordingAdapter::seeded();
    let idle = text_saver(&adapter, "heroHeadline", "Hello");
    let saved = text_saver(&adapter, "heroSubheadline", "Latex couture");
    let dirty = text_saver(&adapter, "introText", "Welkom in het atelier");

    let mut guard = UnsavedChangesGuard::new();
    guard.track(&idle);
    guard.track(&saved);
    guard.track(&dirty);

    saved.set_value("Couture".to_string());
    saved.flush().await;
    dirty.set_value("Hoi".to_string());

    assert_eq!(
        guard.statuses(),
        vec![SaveStatus::Idle, SaveStatus::Saved, SaveStatus::Dirty]
    );
    assert!(guard.should_warn());

    dirty.set_value("Welkom in het atelier".to_string());
    assert_eq!(
        guard.statuses(),
        vec![SaveStatus::Idle, SaveStatus::Saved, SaveStatus::Idle]
    );
    assert!(!guard.should_warn());

    dirty.set_value("Hoi".to_string());
    drop(dirty);
    assert!(!guard.should_warn());
    assert_eq!(guard.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_indicator_follows_saver_and_retries() {
    let adapter = RecordingAdapter::seeded();
    let saver = text_saver(&adapter, "heroHeadline", "Hello");
    let mut indicator = StatusIndicator::new(&test_config());
    let now = Instant::now();

    assert_eq!(indicator.render(&saver.snapshot(), now), Affordance::Hidden);

    saver.set_value("Hi".to_string());
    assert_eq!(indicator.render(&saver.snapshot(), now), Affordance::Unsaved);

    adapter.fail_next(AdapterError::Unavailable("offline".to_string()));
    saver.flush().await;
    assert!(matches!(
        indicator.render(&saver.snapshot(), now),
        Affordance::Failed { retry: true, .. }
    ));

    let status = indicator.dispatch(IndicatorAction::Retry, &saver).await;
    assert_eq!(status, SaveStatus::Saved);
    assert!(matches!(
        indicator.render(&saver.snapshot(), now),
        Affordance::Saved { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_subscribers_see_final_status() {
    let adapter = RecordingAdapter::seeded();
    let saver = text_saver(&adapter, "heroHeadline", "Hello");
    let mut rx = saver.subscribe();

    saver.set_value("Hi".to_string());
    let snapshot = rx
        .wait_for(|s| s.status == SaveStatus::Saved)
        .await
        .unwrap()
        .clone();
    assert!(snapshot.last_saved.is_some());
}
