pub mod billing;
pub mod housing;
