//! # mockhost Stores
//!
//! Key/value stores that mock scripts read and write while computing
//! responses, plus the registry through which a script engine installs an
//! adapter around every store its scripts open.
//!
//! ## Example
//!
//! ```rust
//! use mockhost_store::{StoreService, StoreValue};
//!
//! let service = StoreService::new();
//! let store = service.open_store("sessions");
//!
//! store.save("session:123", StoreValue::from("user_data")).unwrap();
//! assert!(store.has_item_with_key("session:123").unwrap());
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

mod error;
mod inmemory;
mod service;
mod store;
mod value;

pub use error::{Error, Result};
pub use inmemory::InMemoryStore;
pub use service::{StoreInterceptor, StoreService};
pub use store::Store;
pub use value::{ArrayRef, ForeignValue, ObjectRef, StoreValue};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::inmemory::InMemoryStore;
    pub use crate::service::{StoreInterceptor, StoreService};
    pub use crate::store::Store;
    pub use crate::value::{ArrayRef, ForeignValue, ObjectRef, StoreValue};
}
