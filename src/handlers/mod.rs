pub mod api;
pub mod web;
pub mod ws;
