pub mod manufacturing;

pub use manufacturing::{
    assembly_log, assembly_process, completed_assembly, pcb_type, scanned_part, work_order,
};
