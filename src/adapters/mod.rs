pub mod api;
pub mod command_cache;
pub mod db;
pub mod payment;
