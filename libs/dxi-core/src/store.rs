//! Process-wide weak registry of live instances.
//!
//! The store maps identifiers (uuid and, when present, uri) to weak
//! references.  `get` returns a strong reference while the instance is
//! alive and otherwise consults a lazy-fetch hook, typically backed by a
//! storage.  Concurrent gets for the same id are single-flighted so they
//! observe the same instance.  Entries disappear when the last strong
//! reference is dropped; no lock is ever held across a user callback.

use crate::errors::{raise, ErrorKind, Result};
use crate::instance::{Instance, InstanceRef};
use crate::{Arc, HashMap, Mutex, RwLock, Weak};
use std::sync::{Condvar, OnceLock};

/// Callback used to fetch an instance that is not live in memory.
pub type FetchHook = Arc<dyn Fn(&str) -> Result<std::option::Option<InstanceRef>> + Send + Sync>;

struct Flight {
    done: Mutex<bool>,
    cond: Condvar,
}

impl Flight {
    fn new() -> Self {
        Self {
            done: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn finish(&self) {
        *self.done.lock().expect("flight lock poisoned") = true;
        self.cond.notify_all();
    }

    fn wait(&self) {
        let mut done = self.done.lock().expect("flight lock poisoned");
        while !*done {
            done = self.cond.wait(done).expect("flight lock poisoned");
        }
    }
}

/// Weak map identifier → instance with lazy fetch.
pub struct Store {
    map: RwLock<HashMap<String, Weak<Instance>>>,
    hook: RwLock<std::option::Option<FetchHook>>,
    pending: Mutex<HashMap<String, Arc<Flight>>>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            hook: RwLock::new(None),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide store used by instance registration.
    pub fn global() -> &'static Store {
        static GLOBAL: OnceLock<Store> = OnceLock::new();
        GLOBAL.get_or_init(Store::new)
    }

    /// Installs the lazy-fetch hook invoked by [`get`](Self::get) on a
    /// miss.  Replaces any previous hook.
    pub fn set_fetch_hook(&self, hook: FetchHook) {
        *self.hook.write().expect("store lock poisoned") = Some(hook);
    }

    pub fn clear_fetch_hook(&self) {
        *self.hook.write().expect("store lock poisoned") = None;
    }

    fn lookup(&self, id: &str) -> std::option::Option<InstanceRef> {
        let map = self.map.read().expect("store lock poisoned");
        map.get(id).and_then(Weak::upgrade)
    }

    /// Like [`get`](Self::get), but never consults the fetch hook.
    pub fn get_live(&self, id: &str) -> std::option::Option<InstanceRef> {
        if let Some(schema) = crate::schemas::find(id) {
            return Some(schema.as_instance().clone());
        }
        self.lookup(id)
    }

    /// Returns a strong reference to the instance with `id`.
    ///
    /// Checks the built-in schemas, then the live map, then the fetch hook
    /// (single-flighted per id).  Returns `None` when the id is unknown
    /// everywhere.
    pub fn get(&self, id: &str) -> Result<std::option::Option<InstanceRef>> {
        if let Some(schema) = crate::schemas::find(id) {
            return Ok(Some(schema.as_instance().clone()));
        }
        if let Some(inst) = self.lookup(id) {
            return Ok(Some(inst));
        }
        let hook = match self.hook.read().expect("store lock poisoned").clone() {
            Some(h) => h,
            None => return Ok(None),
        };

        loop {
            if let Some(inst) = self.lookup(id) {
                return Ok(Some(inst));
            }
            let (flight, leader) = {
                let mut pending = self.pending.lock().expect("store lock poisoned");
                match pending.get(id) {
                    Some(f) => (f.clone(), false),
                    None => {
                        let f = Arc::new(Flight::new());
                        pending.insert(id.to_owned(), f.clone());
                        (f, true)
                    }
                }
            };
            if !leader {
                flight.wait();
                // The leader has registered the result (or found nothing).
                return Ok(self.lookup(id));
            }

            // Leader: run the hook outside every lock.
            let fetched = hook(id);
            let result = match fetched {
                Ok(Some(inst)) => Ok(Some(self.put(inst))),
                Ok(None) => Ok(None),
                Err(e) => Err(e.rekind(ErrorKind::StorageLoad, format!("fetching \"{id}\""))),
            };
            self.pending
                .lock()
                .expect("store lock poisoned")
                .remove(id);
            flight.finish();
            return result;
        }
    }

    /// Like [`get`](Self::get), but a miss is a `MissingInstance` error.
    pub fn fetch(&self, id: &str) -> Result<InstanceRef> {
        match self.get(id)? {
            Some(inst) => Ok(inst),
            None => raise!(ErrorKind::MissingInstance, "no instance with id \"{id}\""),
        }
    }

    /// Registers `inst` under its uuid and uri.
    ///
    /// When a live entry already exists for the uuid, the existing instance
    /// is returned and the new allocation is simply dropped by the caller.
    pub fn put(&self, inst: InstanceRef) -> InstanceRef {
        let mut map = self.map.write().expect("store lock poisoned");
        if let Some(existing) = map.get(inst.uuid()).and_then(Weak::upgrade) {
            return existing;
        }
        map.insert(inst.uuid().to_owned(), Arc::downgrade(&inst));
        if let Some(uri) = inst.uri() {
            map.insert(uri.to_owned(), Arc::downgrade(&inst));
        }
        drop(map);
        inst
    }

    /// Removes entries for `uuid` and `uri` whose weak reference has
    /// expired.  Invoked from the instance destructor.
    pub(crate) fn forget_expired(&self, uuid: &str, uri: std::option::Option<&str>) {
        // Never panic inside a destructor.
        if let Ok(mut map) = self.map.write() {
            for key in std::iter::once(uuid).chain(uri) {
                if let Some(entry) = map.get(key) {
                    if entry.upgrade().is_none() {
                        map.remove(key);
                    }
                }
            }
        }
    }

    /// Number of live entries (expired ones are pruned on the way).
    pub fn len(&self) -> usize {
        let mut map = self.map.write().expect("store lock poisoned");
        map.retain(|_, w| w.upgrade().is_some());
        map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Store {
    fn default() -> Self {
        Store::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let map = self.map.read().expect("store lock poisoned");
        write!(f, "Store({} entries)", map.len())
    }
}
