//! Services shared by every client of the core

mod changes;
mod database;

pub use changes::{ChangeNotifier, StoreTable, SubscriptionId};
pub use database::DatabaseService;
