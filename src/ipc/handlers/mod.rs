pub mod approvals;
pub mod core;
pub mod directory;
pub mod entry;
pub mod rollup;
pub mod setup;
