pub mod catalog;
pub mod config;
pub mod db;
pub mod engagement;
pub mod era;
pub mod graph;
pub mod pipeline;
pub mod tags;

/// Application name for XDG paths and the default User-Agent
pub const APP_NAME: &str = "besties";
