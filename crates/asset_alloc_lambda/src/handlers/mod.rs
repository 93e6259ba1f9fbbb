pub mod clear_files;
pub mod infra_check;
pub mod pipeline;
pub mod transform;
pub mod trigger;
pub mod validation;
