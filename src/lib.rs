pub mod cli;
pub mod files;
pub mod loader;
pub mod thumbnail;
pub mod ui;
