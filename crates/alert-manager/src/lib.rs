pub mod db;
pub mod inbox;
pub mod lifecycle;

pub use db::{FxDb, StoredNotification};
pub use inbox::InboxChannel;
pub use lifecycle::{AlertLifecycleManager, AlertPolicy, TriggerAction, TriggerStats};
