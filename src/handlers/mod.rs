pub mod assembly;
pub mod common;
pub mod completed_assemblies;
pub mod pcb_types;
pub mod work_orders;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
