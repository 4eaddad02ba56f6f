//! Registry of live instances that opted into tracking.
//!
//! The host creates one [`ActiveInstanceRegistry`] and hands clones of it to
//! every handle that should be tracked. The backing list is allocated on the
//! first registration and released again when the last entry leaves, so an
//! idle registry holds no storage.
//!
//! There is no internal locking. Lookups take a shared borrow only, which
//! lets a logger callback resolve its instance while a dispatch call on the
//! same thread is in progress.

use std::cell::RefCell;
use std::os::raw::c_void;
use std::rc::Rc;

use uuid::Uuid;

/// One tracked instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveInstance {
    pub id: Uuid,
    pub instance_name: String,
    component: usize,
}

impl ActiveInstance {
    /// The native instance pointer the binary returned.
    pub fn component(&self) -> *const c_void {
        self.component as *const c_void
    }
}

/// A caller-owned, lazily allocated set of live instances.
#[derive(Debug, Clone, Default)]
pub struct ActiveInstanceRegistry {
    entries: Rc<RefCell<Option<Vec<ActiveInstance>>>>,
}

impl ActiveInstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an instance under its native pointer, which is null until the
    /// instance exists.
    pub fn register(&self, id: Uuid, instance_name: &str, component: *const c_void) {
        let mut entries = self.entries.borrow_mut();
        let list = entries.get_or_insert_with(|| {
            tracing::debug!("created active instance list");
            Vec::new()
        });
        list.push(ActiveInstance {
            id,
            instance_name: instance_name.to_string(),
            component: component as usize,
        });
        tracing::debug!(instance = instance_name, %id, "registered active instance");
    }

    /// Record the native pointer of an instance registered before it was
    /// instantiated. Returns whether the instance is tracked.
    pub fn attach(&self, id: Uuid, component: *const c_void) -> bool {
        let mut entries = self.entries.borrow_mut();
        let Some(entry) = entries
            .as_mut()
            .and_then(|list| list.iter_mut().find(|e| e.id == id))
        else {
            return false;
        };
        entry.component = component as usize;
        true
    }

    /// Stop tracking an instance. Returns whether it was tracked.
    pub fn unregister(&self, id: Uuid) -> bool {
        let mut entries = self.entries.borrow_mut();
        let Some(list) = entries.as_mut() else {
            return false;
        };
        let Some(position) = list.iter().position(|e| e.id == id) else {
            return false;
        };
        let removed = list.remove(position);
        tracing::debug!(instance = %removed.instance_name, %id, "unregistered active instance");
        if list.is_empty() {
            *entries = None;
            tracing::debug!("freed active instance list");
        }
        true
    }

    /// Name of the instance owning a native pointer. Entries not yet
    /// instantiated never match.
    pub fn lookup(&self, component: *const c_void) -> Option<String> {
        if component.is_null() {
            return None;
        }
        let address = component as usize;
        self.entries
            .borrow()
            .as_ref()?
            .iter()
            .find(|e| e.component == address)
            .map(|e| e.instance_name.clone())
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.entries
            .borrow()
            .as_ref()
            .is_some_and(|list| list.iter().any(|e| e.id == id))
    }

    /// Snapshot of the tracked instances in registration order.
    pub fn instances(&self) -> Vec<ActiveInstance> {
        self.entries.borrow().clone().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether backing storage currently exists.
    pub fn is_allocated(&self) -> bool {
        self.entries.borrow().is_some()
    }
}
