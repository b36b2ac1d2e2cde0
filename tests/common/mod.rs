#![allow(dead_code)]

use std::sync::Arc;

use assembly_tracker::{
    clock::{FixedClock, SharedClock},
    config::AppConfig,
    db,
    entities::work_order,
    services::{
        assembly::{CompleteAssemblyInput, CompletionOutcome, ScanPartInput},
        work_orders::CreateWorkOrderInput,
        ManufacturingServices,
    },
    AppState,
};
use axum::Router;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sea_orm::DatabaseConnection;
use uuid::Uuid;

pub const PLANNER: &str = "planner";
pub const OPERATOR: &str = "op-1";

/// 2025-03-14 08:00:00 UTC, so serials read `...-250314-...`.
pub fn start_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 8, 0, 0).unwrap()
}

/// Application state over a private in-memory SQLite database and a pinned clock.
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub clock: Arc<FixedClock>,
    pub state: AppState,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(configure: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // Every pooled connection to `sqlite::memory:` is a separate database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        configure(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to open test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db = Arc::new(pool);
        let clock = Arc::new(FixedClock::new(start_instant()));
        let shared: SharedClock = clock.clone();
        let state = AppState::new(db.clone(), cfg, shared, None);

        Self { db, clock, state }
    }

    pub fn services(&self) -> &ManufacturingServices {
        &self.state.services
    }

    pub fn router(&self) -> Router {
        assembly_tracker::app_router(self.state.clone())
    }

    /// Moves the clock forward one second so audit entries order deterministically.
    pub fn tick(&self) {
        self.clock.advance(Duration::seconds(1));
    }

    pub async fn seed_pcb_types(&self) {
        self.services()
            .pcb_types
            .initialize_defaults()
            .await
            .expect("seed pcb types");
    }

    pub async fn create_order(&self, item_code: &str, quantity: i32) -> work_order::Model {
        self.services()
            .work_orders
            .create_work_order(order_input(item_code, quantity), PLANNER)
            .await
            .expect("create work order")
    }

    pub async fn scan(&self, assembly_id: Uuid, part_code: &str, sensor_id: i32) {
        self.tick();
        self.services()
            .assembly
            .scan_part(
                assembly_id,
                ScanPartInput {
                    part_code: part_code.to_string(),
                    sensor_id: Some(sensor_id),
                    operator: OPERATOR.to_string(),
                },
            )
            .await
            .expect("scan part");
    }

    pub async fn complete(&self, assembly_id: Uuid) -> CompletionOutcome {
        self.tick();
        self.services()
            .assembly
            .complete(assembly_id, complete_input())
            .await
            .expect("complete assembly")
    }

    /// Opens, scans and completes one unit of `work_order_id`.
    pub async fn build_unit(&self, work_order_id: Uuid, parts: &[&str]) -> CompletionOutcome {
        let unit = match self
            .services()
            .assembly
            .active_unit(work_order_id)
            .await
            .expect("active unit lookup")
        {
            Some(unit) => unit,
            None => self
                .services()
                .assembly
                .open_unit(work_order_id, OPERATOR)
                .await
                .expect("open unit"),
        };
        for (idx, part) in parts.iter().enumerate() {
            self.scan(unit.id, part, idx as i32 + 1).await;
        }
        self.complete(unit.id).await
    }
}

pub fn order_input(item_code: &str, quantity: i32) -> CreateWorkOrderInput {
    CreateWorkOrderInput {
        item_code: item_code.to_string(),
        product: format!("{} board", item_code),
        quantity,
        customer_name: Some("Acme Audio".to_string()),
        machine_no: Some("LINE-3".to_string()),
        ..Default::default()
    }
}

pub fn complete_input() -> CompleteAssemblyInput {
    CompleteAssemblyInput {
        operator: OPERATOR.to_string(),
        ..Default::default()
    }
}
