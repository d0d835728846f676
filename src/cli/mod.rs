pub mod history;
pub mod networth;
pub mod setup;
pub mod summary;
pub mod ui;
