pub mod candidates;
pub mod catalog;
pub mod config;
pub mod favorites;
pub mod state;
pub mod station;
