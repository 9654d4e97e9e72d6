pub mod align;
pub mod assemble;
pub mod catalog;
pub mod config;
pub mod frame;
pub mod metric;
#[cfg(feature = "plot")]
pub mod plot;
pub mod remote;
pub mod tsdb;
