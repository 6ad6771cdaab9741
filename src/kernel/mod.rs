/// Kernel initialization and bootstrap module
pub mod init;
pub mod status;
pub mod tasks;

pub use init::init_phase;
#[cfg(target_os = "none")]
pub use init::init_kernel;
pub use status::{register_component, update_component_status, InitStatus};
