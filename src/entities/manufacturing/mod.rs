pub mod component;
pub mod pcb_type;
pub mod work_order;

// Per-unit scan workflow
pub mod assembly_log;
pub mod assembly_process;
pub mod scanned_part;

// Durable archive of finished units
pub mod completed_assembly;

pub use component::{ComponentList, ComponentRecord};
