//! Per-unit scan workflow: opening, scanning, completion, rejection and the audit trail.

mod common;

use assert_matches::assert_matches;
use assembly_tracker::{
    entities::{assembly_process::AssemblyStatus, work_order::WorkOrderStatus},
    errors::ServiceError,
    services::{
        assembly::{
            AssemblyFilter, CompleteAssemblyInput, LatePart, RejectAssemblyInput,
            ReplacePartInput, ScanPartInput,
        },
        identifiers::parse_serial_number,
        work_orders::UpdateWorkOrderInput,
    },
};
use chrono::NaiveDate;
use common::{complete_input, TestApp, OPERATOR, PLANNER};
use uuid::Uuid;

fn scan_input(part_code: &str, sensor_id: Option<i32>) -> ScanPartInput {
    ScanPartInput {
        part_code: part_code.to_string(),
        sensor_id,
        operator: OPERATOR.to_string(),
    }
}

#[tokio::test]
async fn opened_unit_gets_dated_serial_from_pcb_prefix() {
    let app = TestApp::new().await;
    app.seed_pcb_types().await;
    let wo = app.create_order("5RS011099", 2).await;

    let unit = app
        .services()
        .assembly
        .open_unit(wo.id, OPERATOR)
        .await
        .unwrap();

    assert_eq!(unit.serial_number, "5RS-250314-0001");
    assert_eq!(unit.sequence_number, 1);
    assert_eq!(unit.status, AssemblyStatus::Pending);
    assert_eq!(unit.created_by, OPERATOR);

    let (prefix, date, seq) = parse_serial_number(&unit.serial_number).unwrap();
    assert_eq!(prefix, "5RS");
    assert_eq!(date, NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
    assert_eq!(seq, 1);
}

#[tokio::test]
async fn unresolved_order_uses_default_prefix() {
    let app = TestApp::new().await;
    let wo = app.create_order("9ZZ000001", 1).await;

    let unit = app
        .services()
        .assembly
        .open_unit(wo.id, OPERATOR)
        .await
        .unwrap();
    assert_eq!(unit.serial_number, "5YB-250314-0001");
}

#[tokio::test]
async fn only_one_unit_may_be_open_per_order() {
    let app = TestApp::new().await;
    let wo = app.create_order("5YB011056", 3).await;
    let svc = &app.services().assembly;

    let first = svc.open_unit(wo.id, OPERATOR).await.unwrap();
    assert_matches!(
        svc.open_unit(wo.id, OPERATOR).await,
        Err(ServiceError::Conflict(_))
    );

    let active = svc.active_unit(wo.id).await.unwrap().unwrap();
    assert_eq!(active.id, first.id);
}

#[tokio::test]
async fn first_scan_starts_unit_and_records_component_on_order() {
    let app = TestApp::new().await;
    let wo = app.create_order("5YB011056", 1).await;
    let unit = app
        .services()
        .assembly
        .open_unit(wo.id, OPERATOR)
        .await
        .unwrap();

    app.tick();
    let outcome = app
        .services()
        .assembly
        .scan_part(unit.id, scan_input("CAP-100", Some(1)))
        .await
        .unwrap();
    assert_eq!(outcome.assembly.status, AssemblyStatus::InProgress);
    assert!(outcome.assembly.started_at.is_some());
    assert_eq!(outcome.part.part_code, "CAP-100");
    assert_eq!(outcome.part.sensor_id, Some(1));

    let order = app.services().work_orders.get_work_order(wo.id).await.unwrap();
    assert!(order.assembly_start_time.is_some());
    assert_eq!(order.scanned_components.len(), 1);
    assert!(order.scanned_components.contains_barcode("CAP-100"));
}

#[tokio::test]
async fn duplicate_sensor_is_a_conflict() {
    let app = TestApp::new().await;
    let wo = app.create_order("5YB011056", 1).await;
    let unit = app
        .services()
        .assembly
        .open_unit(wo.id, OPERATOR)
        .await
        .unwrap();

    app.scan(unit.id, "CAP-100", 5).await;
    let err = app
        .services()
        .assembly
        .scan_part(unit.id, scan_input("CAP-200", Some(5)))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));

    let details = app.services().assembly.get_assembly(unit.id).await.unwrap();
    assert_eq!(details.parts.len(), 1);
    assert_eq!(details.parts[0].part_code, "CAP-100");
}

#[tokio::test]
async fn invalid_scans_are_rejected() {
    let app = TestApp::new().await;
    let wo = app.create_order("5YB011056", 1).await;
    let svc = &app.services().assembly;
    let unit = svc.open_unit(wo.id, OPERATOR).await.unwrap();

    assert_matches!(
        svc.scan_part(unit.id, scan_input("CAP-100", Some(0))).await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        svc.scan_part(unit.id, scan_input("  ", Some(1))).await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        svc.scan_part(Uuid::new_v4(), scan_input("CAP-100", Some(1)))
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn completing_unit_archives_it_and_opens_the_next() {
    let app = TestApp::new().await;
    app.seed_pcb_types().await;
    let wo = app.create_order("5YB011056", 2).await;

    let first = app.build_unit(wo.id, &["CAP-100", "RES-220"]).await;
    assert_eq!(first.assembly.status, AssemblyStatus::Completed);
    assert_eq!(first.assembly.quantity_completed, 1);
    assert!(first.assembly.completed_at.is_some());
    assert_eq!(first.progress.completed_quantity, 1);
    assert_eq!(first.progress.status, WorkOrderStatus::InProgress);

    assert_eq!(first.archive.serial_number, "5YB-250314-0001");
    assert_eq!(first.archive.work_order_ref, wo.id.to_string());
    assert_eq!(first.archive.zone, "LINE-3");
    assert_eq!(first.archive.completed_by, OPERATOR);
    assert_eq!(first.archive.scanned_components.len(), 2);
    assert_eq!(first.archive.barcode_number.len(), 11);
    assert_eq!(&first.archive.barcode_number[4..6], "23");
    assert!(!first.archive.is_rework);

    let next = first.next_unit.expect("next unit opened");
    assert_eq!(next.sequence_number, 2);
    assert_eq!(next.serial_number, "5YB-250314-0002");
    assert_eq!(next.status, AssemblyStatus::Pending);

    // Components staged on the order belong to the finished unit only.
    let order = app.services().work_orders.get_work_order(wo.id).await.unwrap();
    assert!(order.scanned_components.is_empty());

    let second = app.build_unit(wo.id, &["CAP-101"]).await;
    assert_eq!(second.assembly.id, next.id);
    assert!(second.next_unit.is_none());
    assert_eq!(second.progress.status, WorkOrderStatus::Completed);
    assert!(second.progress.is_fully_completed);

    assert!(app
        .services()
        .assembly
        .active_unit(wo.id)
        .await
        .unwrap()
        .is_none());
    assert_matches!(
        app.services().assembly.open_unit(wo.id, OPERATOR).await,
        Err(ServiceError::Conflict(_))
    );
}

#[tokio::test]
async fn completing_twice_is_a_conflict_and_ledger_is_untouched() {
    let app = TestApp::new().await;
    let wo = app.create_order("5YB011056", 3).await;
    let done = app.build_unit(wo.id, &["CAP-100"]).await;

    app.tick();
    let err = app
        .services()
        .assembly
        .complete(done.assembly.id, complete_input())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));

    let order = app.services().work_orders.get_work_order(wo.id).await.unwrap();
    assert_eq!(order.completed_quantity, 1);
    let (archive, total) = app
        .services()
        .completed_assemblies
        .list(Default::default(), 1, 10)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(archive[0].assembly_process_id, Some(done.assembly.id));
}

#[tokio::test]
async fn completion_on_cancelled_order_rolls_back() {
    let app = TestApp::new().await;
    let wo = app.create_order("5YB011056", 2).await;
    let unit = app
        .services()
        .assembly
        .open_unit(wo.id, OPERATOR)
        .await
        .unwrap();
    app.scan(unit.id, "CAP-100", 1).await;

    app.services()
        .work_orders
        .update_work_order(
            wo.id,
            UpdateWorkOrderInput {
                status: Some(WorkOrderStatus::Cancelled),
                ..Default::default()
            },
            PLANNER,
        )
        .await
        .unwrap();

    let late = CompleteAssemblyInput {
        scanned_parts: vec![LatePart {
            part_code: "RES-220".to_string(),
            sensor_id: Some(2),
            operator: None,
            scan_time: None,
        }],
        ..complete_input()
    };
    let err = app
        .services()
        .assembly
        .complete(unit.id, late)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));

    let details = app.services().assembly.get_assembly(unit.id).await.unwrap();
    assert_eq!(details.assembly.status, AssemblyStatus::InProgress);
    assert_eq!(details.parts.len(), 1, "late part must not survive the rollback");
    let (_, archived) = app
        .services()
        .completed_assemblies
        .list(Default::default(), 1, 10)
        .await
        .unwrap();
    assert_eq!(archived, 0);
}

#[tokio::test]
async fn late_parts_are_merged_without_duplicates() {
    let app = TestApp::new().await;
    let wo = app.create_order("5YB011056", 1).await;
    let unit = app
        .services()
        .assembly
        .open_unit(wo.id, OPERATOR)
        .await
        .unwrap();
    app.scan(unit.id, "CAP-100", 1).await;

    app.tick();
    let outcome = app
        .services()
        .assembly
        .complete(
            unit.id,
            CompleteAssemblyInput {
                barcode: Some("12342300001".to_string()),
                notes: Some("rush order".to_string()),
                scanned_parts: vec![
                    LatePart {
                        part_code: "CAP-999".to_string(),
                        sensor_id: Some(1),
                        operator: None,
                        scan_time: None,
                    },
                    LatePart {
                        part_code: "RES-220".to_string(),
                        sensor_id: Some(2),
                        operator: Some("op-2".to_string()),
                        scan_time: None,
                    },
                    LatePart {
                        part_code: "LABEL-1".to_string(),
                        sensor_id: None,
                        operator: None,
                        scan_time: None,
                    },
                    LatePart {
                        part_code: "LABEL-1".to_string(),
                        sensor_id: None,
                        operator: None,
                        scan_time: None,
                    },
                ],
                ..complete_input()
            },
        )
        .await
        .unwrap();

    let archived: Vec<_> = outcome
        .archive
        .scanned_components
        .iter()
        .map(|c| c.barcode.as_str())
        .collect();
    assert_eq!(archived.len(), 3);
    assert!(archived.contains(&"CAP-100"));
    assert!(archived.contains(&"RES-220"));
    assert!(archived.contains(&"LABEL-1"));
    assert!(!archived.contains(&"CAP-999"));

    let res = outcome
        .archive
        .scanned_components
        .iter()
        .find(|c| c.barcode == "RES-220")
        .unwrap();
    assert_eq!(res.operator, "op-2");

    assert_eq!(outcome.archive.barcode_number, "12342300001");
    assert_eq!(outcome.assembly.notes.as_deref(), Some("rush order"));
}

#[tokio::test]
async fn rejected_unit_leaves_ledger_and_frees_the_order() {
    let app = TestApp::new().await;
    let wo = app.create_order("5YB011056", 2).await;
    let svc = &app.services().assembly;
    let unit = svc.open_unit(wo.id, OPERATOR).await.unwrap();
    app.scan(unit.id, "CAP-100", 1).await;

    assert_matches!(
        svc.reject(
            unit.id,
            RejectAssemblyInput {
                reason: " ".to_string(),
                operator: OPERATOR.to_string(),
            },
        )
        .await,
        Err(ServiceError::ValidationError(_))
    );

    app.tick();
    let rejected = svc
        .reject(
            unit.id,
            RejectAssemblyInput {
                reason: "solder bridge on U3".to_string(),
                operator: OPERATOR.to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(rejected.status, AssemblyStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("solder bridge on U3"));

    let order = app.services().work_orders.get_work_order(wo.id).await.unwrap();
    assert_eq!(order.completed_quantity, 0);
    assert!(order.scanned_components.is_empty());

    // Closed units accept nothing further.
    assert_matches!(
        svc.scan_part(unit.id, scan_input("CAP-101", Some(2))).await,
        Err(ServiceError::Conflict(_))
    );
    assert_matches!(
        svc.complete(unit.id, complete_input()).await,
        Err(ServiceError::Conflict(_))
    );

    // The rejected unit keeps its sequence number.
    let replacement = svc.open_unit(wo.id, OPERATOR).await.unwrap();
    assert_eq!(replacement.sequence_number, 2);
    assert_eq!(replacement.serial_number, "5YB-250314-0002");
}

#[tokio::test]
async fn replacing_a_part_keeps_history_through_to_the_archive() {
    let app = TestApp::new().await;
    let wo = app.create_order("5YB011056", 1).await;
    let svc = &app.services().assembly;
    let unit = svc.open_unit(wo.id, OPERATOR).await.unwrap();
    app.scan(unit.id, "CAP-100", 1).await;

    let old_part = svc.get_assembly(unit.id).await.unwrap().parts[0].clone();
    app.tick();
    let outcome = svc
        .replace_part(
            unit.id,
            old_part.id,
            ReplacePartInput {
                new_part_code: "CAP-101".to_string(),
                reason: "cracked".to_string(),
                operator: OPERATOR.to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.part.part_code, "CAP-101");
    assert_eq!(outcome.part.sensor_id, Some(1));

    let details = svc.get_assembly(unit.id).await.unwrap();
    let retired = details.parts.iter().find(|p| p.id == old_part.id).unwrap();
    assert!(retired.replaced);
    assert_eq!(retired.replaced_with.as_deref(), Some("CAP-101"));
    assert_eq!(retired.replace_reason.as_deref(), Some("cracked"));

    // Replacing twice is refused.
    assert_matches!(
        svc.replace_part(
            unit.id,
            old_part.id,
            ReplacePartInput {
                new_part_code: "CAP-102".to_string(),
                reason: "again".to_string(),
                operator: OPERATOR.to_string(),
            },
        )
        .await,
        Err(ServiceError::Conflict(_))
    );

    let order = app.services().work_orders.get_work_order(wo.id).await.unwrap();
    assert!(order.scanned_components.contains_barcode("CAP-101"));
    assert!(!order.scanned_components.contains_barcode("CAP-100"));

    let done = app.complete(unit.id).await;
    let components: Vec<_> = done.archive.scanned_components.iter().collect();
    assert_eq!(components.len(), 1);
    assert_eq!(components[0].barcode, "CAP-101");
    assert_eq!(components[0].previous_barcode.as_deref(), Some("CAP-100"));
    assert_eq!(components[0].replacement_reason.as_deref(), Some("cracked"));
}

#[tokio::test]
async fn sensor_index_moves_only_on_open_units() {
    let app = TestApp::new().await;
    let wo = app.create_order("5YB011056", 1).await;
    let svc = &app.services().assembly;
    let unit = svc.open_unit(wo.id, OPERATOR).await.unwrap();

    let moved = svc.update_sensor_index(unit.id, 4).await.unwrap();
    assert_eq!(moved.current_sensor_index, 4);
    assert_matches!(
        svc.update_sensor_index(unit.id, 0).await,
        Err(ServiceError::ValidationError(_))
    );

    app.complete(unit.id).await;
    assert_matches!(
        svc.update_sensor_index(unit.id, 5).await,
        Err(ServiceError::Conflict(_))
    );
}

#[tokio::test]
async fn audit_log_records_each_step_newest_first() {
    let app = TestApp::new().await;
    let wo = app.create_order("5YB011056", 2).await;
    let svc = &app.services().assembly;
    let unit = svc.open_unit(wo.id, OPERATOR).await.unwrap();
    app.scan(unit.id, "CAP-100", 1).await;
    app.scan(unit.id, "RES-220", 2).await;
    app.complete(unit.id).await;

    let (logs, total) = svc.get_assembly_logs(Some(unit.id), 1, 10).await.unwrap();
    assert_eq!(total, 4);
    let actions: Vec<_> = logs.iter().map(|l| l.action.as_str()).collect();
    assert_eq!(
        actions,
        vec!["Completed", "Part Scanned", "Part Scanned", "Created"]
    );
    assert_eq!(logs[0].details, "Completed unit 5YB-250314-0001 (1/2)");
    assert!(logs.iter().all(|l| l.operator == OPERATOR));

    // The auto-opened next unit has its own trail.
    let (all, total_all) = svc.get_assembly_logs(None, 1, 2).await.unwrap();
    assert_eq!(total_all, 5);
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn listing_filters_by_order_and_status() {
    let app = TestApp::new().await;
    let wo = app.create_order("5YB011056", 2).await;
    let other = app.create_order("5YB011057", 1).await;
    app.build_unit(wo.id, &["CAP-100"]).await;
    app.services()
        .assembly
        .open_unit(other.id, OPERATOR)
        .await
        .unwrap();

    let units = app
        .services()
        .assembly
        .list_assemblies(AssemblyFilter {
            work_order_id: Some(wo.id),
            status: None,
        })
        .await
        .unwrap();
    assert_eq!(units.len(), 2);

    let completed = app
        .services()
        .assembly
        .list_assemblies(AssemblyFilter {
            work_order_id: None,
            status: Some(AssemblyStatus::Completed),
        })
        .await
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].work_order_id, wo.id);
}

#[tokio::test]
async fn late_part_sensor_must_be_positive() {
    let app = TestApp::new().await;
    let wo = app.create_order("5YB011056", 1).await;
    let unit = app
        .services()
        .assembly
        .open_unit(wo.id, OPERATOR)
        .await
        .unwrap();
    app.scan(unit.id, "CAP-100", 1).await;

    for sensor in [0, -3] {
        let input = CompleteAssemblyInput {
            scanned_parts: vec![LatePart {
                part_code: "RES-220".to_string(),
                sensor_id: Some(sensor),
                operator: None,
                scan_time: None,
            }],
            ..complete_input()
        };
        let err = app
            .services()
            .assembly
            .complete(unit.id, input)
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));
    }

    let details = app.services().assembly.get_assembly(unit.id).await.unwrap();
    assert_eq!(details.assembly.status, AssemblyStatus::InProgress);
    assert_eq!(details.parts.len(), 1);
    let order = app.services().work_orders.get_work_order(wo.id).await.unwrap();
    assert_eq!(order.completed_quantity, 0);
}

#[tokio::test]
async fn cancelled_order_unit_takes_no_more_scans() {
    let app = TestApp::new().await;
    let wo = app.create_order("5YB011056", 2).await;
    let unit = app
        .services()
        .assembly
        .open_unit(wo.id, OPERATOR)
        .await
        .unwrap();
    let scanned = app
        .services()
        .assembly
        .scan_part(unit.id, scan_input("CAP-100", Some(1)))
        .await
        .unwrap();

    app.services()
        .work_orders
        .update_work_order(
            wo.id,
            UpdateWorkOrderInput {
                status: Some(WorkOrderStatus::Cancelled),
                ..Default::default()
            },
            PLANNER,
        )
        .await
        .unwrap();

    let err = app
        .services()
        .assembly
        .scan_part(unit.id, scan_input("RES-220", Some(2)))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));

    let err = app
        .services()
        .assembly
        .replace_part(
            unit.id,
            scanned.part.id,
            ReplacePartInput {
                new_part_code: "CAP-101".to_string(),
                reason: "cracked".to_string(),
                operator: OPERATOR.to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));

    let details = app.services().assembly.get_assembly(unit.id).await.unwrap();
    assert_eq!(details.parts.len(), 1);
    assert!(!details.parts[0].replaced);
    let order = app.services().work_orders.get_work_order(wo.id).await.unwrap();
    assert!(order.scanned_components.contains_barcode("CAP-100"));
    assert!(!order.scanned_components.contains_barcode("RES-220"));
    assert!(!order.scanned_components.contains_barcode("CAP-101"));
}
