pub mod app;
pub mod clinical;
pub mod config;
pub mod dispatch;
pub mod drs;
pub mod error;
pub mod flatten;
pub mod linker;
pub mod output;
pub mod partition;
pub mod report;
pub mod schema;
