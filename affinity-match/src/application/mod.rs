pub mod commands;
pub mod handlers;
pub mod in_flight;
pub mod queries;
