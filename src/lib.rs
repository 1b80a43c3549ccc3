mod text_enum;

pub mod config;
pub mod currency;
pub mod database;
pub mod error;
pub mod ledger;
pub mod payment;
pub mod responses;
pub mod routes;
pub mod schema;
