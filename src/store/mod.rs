pub mod meta;
pub mod models;
mod quota;
pub mod users;

pub use meta::{MetaStore, StoreError};
pub use quota::QuotaLedger;
pub use users::UserStore;
