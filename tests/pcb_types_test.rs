mod common;

use assert_matches::assert_matches;
use assembly_tracker::{errors::ServiceError, services::pcb_types::CreatePcbTypeInput};
use common::TestApp;

fn pcb_input(code: &str, prefix: &str, marker: Option<&str>) -> CreatePcbTypeInput {
    CreatePcbTypeInput {
        code: code.to_string(),
        name: format!("{} board", code),
        description: None,
        prefix: prefix.to_string(),
        barcode_marker: marker.map(str::to_string),
        active: true,
    }
}

#[tokio::test]
async fn initializing_defaults_is_idempotent() {
    let app = TestApp::new().await;
    let svc = &app.services().pcb_types;

    let created = svc.initialize_defaults().await.unwrap();
    assert_eq!(created, vec!["YBS".to_string(), "RSM".to_string()]);

    let again = svc.initialize_defaults().await.unwrap();
    assert!(again.is_empty());

    let types = svc.list(false).await.unwrap();
    let codes: Vec<_> = types.iter().map(|t| t.code.as_str()).collect();
    assert_eq!(codes, vec!["YBS", "RSM"]);

    let ybs = svc.get_by_code("ybs").await.unwrap();
    assert_eq!(ybs.prefix, "5YB");
    assert_eq!(ybs.barcode_marker.as_deref(), Some("23"));
}

#[tokio::test]
async fn initializing_fills_in_only_missing_defaults() {
    let app = TestApp::new().await;
    let svc = &app.services().pcb_types;
    svc.create(pcb_input("RSM", "5RS", Some("12"))).await.unwrap();

    let created = svc.initialize_defaults().await.unwrap();
    assert_eq!(created, vec!["YBS".to_string()]);
    assert_eq!(svc.list(false).await.unwrap().len(), 2);
}

#[tokio::test]
async fn duplicate_code_is_a_conflict() {
    let app = TestApp::new().await;
    app.seed_pcb_types().await;

    let err = app
        .services()
        .pcb_types
        .create(pcb_input("YBS", "5YX", None))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn malformed_marker_is_rejected() {
    let app = TestApp::new().await;
    let err = app
        .services()
        .pcb_types
        .create(pcb_input("ABC", "7AB", Some("2X")))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn unknown_code_is_not_found() {
    let app = TestApp::new().await;
    assert_matches!(
        app.services().pcb_types.get_by_code("NOPE").await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn inactive_types_are_skipped_during_resolution() {
    let app = TestApp::new().await;
    let svc = &app.services().pcb_types;
    svc.create(CreatePcbTypeInput {
        active: false,
        ..pcb_input("OLD", "5YB", Some("77"))
    })
    .await
    .unwrap();
    app.tick();
    let current = svc.create(pcb_input("NEW", "5YB", Some("88"))).await.unwrap();

    let active = svc.list(true).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].code, "NEW");

    let wo = app.create_order("5YB011056", 1).await;
    assert_eq!(wo.pcb_type_id, Some(current.id));
}

#[tokio::test]
async fn earlier_registration_wins_on_overlapping_prefixes() {
    let app = TestApp::new().await;
    let svc = &app.services().pcb_types;
    let broad = svc.create(pcb_input("BRD", "5Y", Some("31"))).await.unwrap();
    app.tick();
    svc.create(pcb_input("NAR", "5YB", Some("32"))).await.unwrap();

    let wo = app.create_order("5YB011056", 1).await;
    assert_eq!(wo.pcb_type_id, Some(broad.id));
}
