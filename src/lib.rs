pub mod config;
pub mod menu;
pub mod messages;
pub mod runtime;
pub mod servo;
