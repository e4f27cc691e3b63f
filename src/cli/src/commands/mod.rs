pub mod account;
pub mod check;
pub mod config;
pub mod routes;
