pub mod connect;
pub mod idgen;
pub mod memory;
pub mod models;
pub mod postgres;
