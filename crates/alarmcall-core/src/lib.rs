pub mod alarm;
pub mod config;
pub mod engine;
pub mod errors;
pub mod model;
pub mod phone;
pub mod providers;
pub mod storage;
