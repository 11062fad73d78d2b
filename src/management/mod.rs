pub mod api;
pub mod gateway;
