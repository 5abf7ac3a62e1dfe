pub mod api;
pub mod catalog;
pub mod controller;
pub mod decoder;
pub mod diagnostics;
pub mod media_session;
pub mod session;
pub mod sink;
