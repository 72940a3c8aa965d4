pub mod ledger;
pub mod schema;
pub mod store;

pub use ledger::Ledger;
pub use store::Store;
