pub mod analysis;
pub mod integrity;
pub mod monitor;
