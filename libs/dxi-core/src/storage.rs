//! The storage boundary: the abstract contract a driver must satisfy.
//!
//! The core does not implement any backend; it consumes [`Driver`] and
//! [`Storage`] through this contract.  Drivers register themselves with
//! [`inventory`] through [`StaticDriver`] and are addressed by url:
//! `scheme://location?query#fragment`, where the query carries the
//! recognized options and the fragment is an id shortcut for a load.

use crate::errors::{ensure_or, raise, ErrorKind, Result, ResultExt};
use crate::ident;
use crate::instance::InstanceRef;

use std::fmt;

use tracing::debug;

bitflags::bitflags! {
    /// Capabilities a driver advertises.
    pub struct Capability: u8 {
        const READABLE = 1;
        const WRITABLE = 2;
        /// Can store instances of any metadata, not just one fixed entity.
        const GENERIC  = 4;
    }
}

/// Open mode recognized by every driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    Read,
    Write,
    #[default]
    Append,
}

/// Recognized options parsed from the url query.
///
/// The query is a `key=value` list separated by `;` or `&`.  The `mode`
/// key is interpreted here (`"r"`, `"w"`, `"a"`; default `"a"`); all pairs
/// stay available to the driver through [`get`](Self::get).
#[derive(Debug, Clone, Default)]
pub struct Options {
    mode: Mode,
    kv: Vec<(String, String)>,
}

impl Options {
    pub fn parse(query: std::option::Option<&str>) -> Result<Options> {
        let mut opts = Options::default();
        let query = match query {
            Some(q) if !q.is_empty() => q,
            _ => return Ok(opts),
        };
        for pair in query.split(&[';', '&'][..]) {
            let (key, value) = match pair.split_once('=') {
                Some(kv) => kv,
                None => raise!(ErrorKind::Option, "invalid option \"{pair}\" in \"{query}\""),
            };
            if key == "mode" {
                opts.mode = match value {
                    "r" => Mode::Read,
                    "w" => Mode::Write,
                    "a" => Mode::Append,
                    other => raise!(ErrorKind::Option, "invalid mode \"{other}\""),
                };
            }
            opts.kv.push((key.to_owned(), value.to_owned()));
        }
        Ok(opts)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Value of a driver-specific option.
    pub fn get(&self, key: &str) -> std::option::Option<&str> {
        self.kv
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// An open storage: the per-handle half of the contract.
///
/// `save` and `iter_ids` are optional; the default implementations report
/// `Unsupported`.  A driver that persists several records in one call must
/// do so all-or-nothing: on failure the storage is restored to its state
/// before the call.
pub trait Storage: Send {
    fn load(&mut self, id: std::option::Option<&str>) -> Result<InstanceRef>;

    fn save(&mut self, _inst: &InstanceRef) -> Result<()> {
        raise!(ErrorKind::Unsupported, "storage does not support writing")
    }

    fn iter_ids(&mut self, _metaid: std::option::Option<&str>) -> Result<Vec<String>> {
        raise!(ErrorKind::Unsupported, "storage does not support iteration")
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A storage driver: opens handles for locations.
pub trait Driver: Sync + Send {
    fn name(&self) -> &'static str;
    fn capabilities(&self) -> Capability;
    fn open(&self, location: &str, options: &Options) -> Result<Box<dyn Storage>>;
}

/// Static registration of a driver (collected with `inventory::submit!`).
pub struct StaticDriver(pub &'static dyn Driver);
inventory::collect!(StaticDriver);

/// Finds a registered driver by scheme name.
pub fn find_driver(name: &str) -> Result<&'static dyn Driver> {
    for entry in inventory::iter::<StaticDriver> {
        if entry.0.name() == name {
            return Ok(entry.0);
        }
    }
    raise!(ErrorKind::StorageOpen, "no storage driver named \"{name}\"")
}

/// An open storage handle.  The underlying handle is released when the
/// value is dropped, error paths included.
pub struct StorageHandle {
    inner: Box<dyn Storage>,
    closed: bool,
    url: String,
}

impl fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageHandle")
            .field("closed", &self.closed)
            .field("url", &self.url)
            .finish()
    }
}

impl StorageHandle {
    pub fn load(&mut self, id: std::option::Option<&str>) -> Result<InstanceRef> {
        self.inner.load(id).rekind(
            ErrorKind::StorageLoad,
            format!("loading \"{}\" from \"{}\"", id.unwrap_or("<single>"), self.url),
        )
    }

    pub fn save(&mut self, inst: &InstanceRef) -> Result<()> {
        self.inner.save(inst).rekind(
            ErrorKind::StorageSave,
            format!("saving \"{}\" to \"{}\"", inst.id(), self.url),
        )
    }

    pub fn iter_ids(&mut self, metaid: std::option::Option<&str>) -> Result<Vec<String>> {
        self.inner
            .iter_ids(metaid)
            .rekind(ErrorKind::StorageLoad, format!("iterating \"{}\"", self.url))
    }

    /// Explicit close; otherwise performed on drop.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        debug!(url = %self.url, "closing storage");
        self.inner.close()
    }
}

impl Drop for StorageHandle {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.inner.close();
        }
    }
}

/// Opens a storage from its parts.
pub fn open(scheme: &str, location: &str, query: std::option::Option<&str>) -> Result<StorageHandle> {
    let driver = find_driver(scheme)?;
    let options = Options::parse(query)
        .rekind(ErrorKind::StorageOpen, format!("opening \"{scheme}://{location}\""))?;
    let caps = driver.capabilities();
    match options.mode() {
        Mode::Read => ensure_or!(
            caps.contains(Capability::READABLE),
            ErrorKind::StorageOpen,
            "driver \"{scheme}\" is not readable"
        ),
        Mode::Write | Mode::Append => ensure_or!(
            caps.contains(Capability::WRITABLE),
            ErrorKind::StorageOpen,
            "driver \"{scheme}\" is not writable"
        ),
    }
    debug!(scheme, location, "opening storage");
    let inner = driver.open(location, &options).rekind(
        ErrorKind::StorageOpen,
        format!("opening \"{scheme}://{location}\""),
    )?;
    Ok(StorageHandle {
        inner,
        closed: false,
        url: ident::join_url(scheme, location, query, None),
    })
}

/// Opens the storage a url points to.
pub fn open_url(url: &str) -> Result<StorageHandle> {
    let parts = ident::split_url(url)?;
    open(parts.scheme, parts.location, parts.query)
}

/// Loads the instance a url points to; the fragment selects the id.
pub fn load_url(url: &str) -> Result<InstanceRef> {
    let parts = ident::split_url(url)?;
    let mut handle = open(parts.scheme, parts.location, parts.query)?;
    handle.load(parts.fragment)
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory test double exercising the whole boundary: locations are
    //! named buffers holding a multi-instance JSON document.

    use super::*;
    use crate::{HashMap, Mutex};
    use std::sync::OnceLock;

    fn buffers() -> &'static Mutex<HashMap<String, String>> {
        static BUFFERS: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        BUFFERS.get_or_init(|| Mutex::new(HashMap::new()))
    }

    pub struct MemoryDriver;

    impl Driver for MemoryDriver {
        fn name(&self) -> &'static str {
            "memory"
        }

        fn capabilities(&self) -> Capability {
            Capability::READABLE | Capability::WRITABLE | Capability::GENERIC
        }

        fn open(&self, location: &str, options: &Options) -> Result<Box<dyn Storage>> {
            let mut buffers = buffers().lock().expect("buffer lock poisoned");
            match options.mode() {
                Mode::Read => ensure_or!(
                    buffers.contains_key(location),
                    ErrorKind::StorageOpen,
                    "no memory buffer \"{location}\""
                ),
                Mode::Write => {
                    buffers.insert(location.to_owned(), "{}".to_owned());
                }
                Mode::Append => {
                    buffers
                        .entry(location.to_owned())
                        .or_insert_with(|| "{}".to_owned());
                }
            }
            Ok(Box::new(MemoryStorage {
                location: location.to_owned(),
            }))
        }
    }

    struct MemoryStorage {
        location: String,
    }

    impl Storage for MemoryStorage {
        fn load(&mut self, id: std::option::Option<&str>) -> Result<InstanceRef> {
            let buffers = buffers().lock().expect("buffer lock poisoned");
            let doc = match buffers.get(&self.location) {
                Some(d) => d.clone(),
                None => raise!(ErrorKind::StorageLoad, "no memory buffer \"{}\"", self.location),
            };
            drop(buffers);
            crate::json::sscan(&doc, id, None)
        }

        fn save(&mut self, inst: &InstanceRef) -> Result<()> {
            let mut buffers = buffers().lock().expect("buffer lock poisoned");
            let doc = buffers.entry(self.location.clone()).or_insert_with(|| "{}".to_owned());
            let mut updated = doc.clone();
            let flags = crate::json::JsonFlags::URI_KEY | crate::json::JsonFlags::WITH_UUID;
            crate::json::append(&mut updated, inst, flags)?;
            *doc = updated;
            Ok(())
        }

        fn iter_ids(&mut self, metaid: std::option::Option<&str>) -> Result<Vec<String>> {
            let buffers = buffers().lock().expect("buffer lock poisoned");
            let doc = match buffers.get(&self.location) {
                Some(d) => d.clone(),
                None => return Ok(Vec::new()),
            };
            drop(buffers);
            crate::json::iter(&doc, metaid)
        }
    }

    static MEMORY_DRIVER: MemoryDriver = MemoryDriver;
    inventory::submit! { StaticDriver(&MEMORY_DRIVER) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::instance::Instance;
    use crate::types::{DataType, Dimension, PropVal, Property, Value};

    #[test]
    fn options_parsing() {
        let opts = Options::parse(Some("mode=r;level=9")).unwrap();
        assert_eq!(opts.mode(), Mode::Read);
        assert_eq!(opts.get("level"), Some("9"));
        assert_eq!(opts.get("absent"), None);

        let opts = Options::parse(Some("mode=w&x=1")).unwrap();
        assert_eq!(opts.mode(), Mode::Write);

        assert_eq!(Options::parse(None).unwrap().mode(), Mode::Append);
        assert_eq!(
            Options::parse(Some("oops")).unwrap_err().kind(),
            ErrorKind::Option
        );
        assert_eq!(
            Options::parse(Some("mode=x")).unwrap_err().kind(),
            ErrorKind::Option
        );
    }

    #[test]
    fn unknown_driver_is_a_storage_open_error() {
        assert_eq!(
            open_url("nosuch://whatever").unwrap_err().kind(),
            ErrorKind::StorageOpen
        );
    }

    #[test]
    fn save_load_through_the_boundary() {
        let meta = Entity::from_parts(
            "http://example.com/storage-test/0.1/Reading",
            "",
            vec![Dimension::new("n", "")],
            vec![Property::new("values", DataType::Float, 8).with_shape(&["n"])],
            vec![],
        )
        .unwrap();
        let inst = Instance::create(&meta, &[2], Some("http://data.example.com/storage-a")).unwrap();
        inst.set_property_by_name(
            "values",
            PropVal::Array(vec![Value::F64(1.0), Value::F64(2.0)]),
        )
        .unwrap();

        let mut handle = open_url("memory://buf-a?mode=w").unwrap();
        handle.save(meta.as_instance()).unwrap();
        handle.save(&inst).unwrap();
        handle.close().unwrap();

        // The fragment selects the instance to load.
        let loaded = load_url("memory://buf-a?mode=r#http://data.example.com/storage-a").unwrap();
        assert!(std::sync::Arc::ptr_eq(&loaded, &inst));

        let mut handle = open_url("memory://buf-a?mode=r").unwrap();
        let ids = handle.iter_ids(None).unwrap();
        assert_eq!(ids.len(), 2);
        let only_data = handle
            .iter_ids(Some("http://example.com/storage-test/0.1/Reading"))
            .unwrap();
        assert_eq!(only_data, vec!["http://data.example.com/storage-a".to_owned()]);
    }

    #[test]
    fn read_errors_are_rekinded() {
        let mut handle = open_url("memory://buf-errs?mode=w").unwrap();
        let err = handle.load(Some("http://data.example.com/nope")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageLoad);
        assert!(err.inner().is_some());
    }
}
