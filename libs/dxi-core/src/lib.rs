#![allow(dead_code)]
#![deny(clippy::all)]
//#![warn(missing_docs)]

// Module declarations
pub mod bson;
pub mod collection;
pub mod config;
pub mod entity;
pub mod errors;
pub mod ident;
pub mod instance;
pub mod json;
pub mod schemas;
pub mod storage;
pub mod store;
pub mod types;
mod utils;

#[cfg(test)]
mod tests;

// Public re-exports
#[doc(no_inline)]
pub use collection::Collection;
#[doc(no_inline)]
pub use entity::Entity;
#[doc(no_inline)]
pub use errors::{Error, ErrorKind, Result};
#[doc(no_inline)]
pub use instance::{Instance, InstanceRef, MetaRef};
#[doc(no_inline)]
pub use store::Store;
#[doc(no_inline)]
pub use types::{DataType, Dimension, PropVal, Property, Relation, Value};

// Crate STD lib types
pub(crate) type Arc<T> = std::sync::Arc<T>;
pub(crate) type Weak<T> = std::sync::Weak<T>;
pub(crate) type Cow<'lifetime, T> = std::borrow::Cow<'lifetime, T>;
pub(crate) type HashMap<K, V> = std::collections::HashMap<K, V>;
pub(crate) type Map<K, V> = std::collections::BTreeMap<K, V>;
pub(crate) type RwLock<T> = std::sync::RwLock<T>;
pub(crate) type Mutex<T> = std::sync::Mutex<T>;
pub(crate) type Vec<T> = std::vec::Vec<T>;
