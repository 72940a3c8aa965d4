pub mod server;
pub mod shutdown;
