//! Attribute-name interning.
//!
//! Names are interned per [`KeyKind`]: the same string yields the same key
//! within one kind, and unrelated keys across kinds. Keys are never recycled.
//!
//! The registry is an ordinary value rather than global state. Share it as an
//! `Arc<KeyRegistry>` between every model that should agree on key numbering.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::attribute::{Attribute, Float, Key, KeyKind};
use crate::error::{Error, ErrorKind, Result};

/// Interning table for a single kind.
#[derive(Debug, Default)]
struct KindTable {
    names: Vec<Arc<str>>,
    index: HashMap<Arc<str>, u32>,
    strict: bool,
}

impl KindTable {
    fn intern(&mut self, name: &str) -> u32 {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        // Saturation at u32::MAX keys would need four billion distinct names.
        let idx = u32::try_from(self.names.len()).unwrap_or(u32::MAX);
        let arc: Arc<str> = name.into();
        self.names.push(arc.clone());
        self.index.insert(arc, idx);
        idx
    }
}

/// Thread-safe registry mapping `(kind, name)` pairs to small integer keys.
///
/// Each kind has its own critical section, so registrations of different kinds
/// never contend.
pub struct KeyRegistry {
    tables: [RwLock<KindTable>; 8],
}

impl KeyRegistry {
    /// Float keys that are pre-interned, in index order.
    pub const RESERVED_FLOAT_KEYS: &'static [&'static str] = &[
        "x",       // FloatKey::X
        "y",       // FloatKey::Y
        "z",       // FloatKey::Z
        "radius",  // FloatKey::RADIUS
        "local_x", // FloatKey::LOCAL_X
        "local_y", // FloatKey::LOCAL_Y
        "local_z", // FloatKey::LOCAL_Z
    ];

    /// Creates a registry with every kind lazy and the reserved float keys interned.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts configuring a registry.
    #[must_use]
    pub fn builder() -> KeyRegistryBuilder {
        KeyRegistryBuilder::default()
    }

    /// Convenience for `Arc::new(KeyRegistry::new())`.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn table(&self, kind: KeyKind) -> &RwLock<KindTable> {
        &self.tables[kind.ordinal()]
    }

    /// Returns the key for `name`, creating it if the kind is lazy.
    ///
    /// # Errors
    ///
    /// Returns a `Lookup` error if the kind is strict and `name` was never
    /// [registered](Self::register).
    pub fn key<A: Attribute>(&self, name: &str) -> Result<Key<A>> {
        let table = self.table(A::KIND);
        {
            let read = table.read();
            if let Some(&idx) = read.index.get(name) {
                return Ok(Key::from_index(idx));
            }
            if read.strict {
                return Err(Error::new(ErrorKind::Lookup {
                    kind: A::KIND,
                    name: name.to_string(),
                }));
            }
        }
        Ok(Key::from_index(table.write().intern(name)))
    }

    /// Registers `name`, returning its key. Works for strict and lazy kinds alike.
    pub fn register<A: Attribute>(&self, name: &str) -> Key<A> {
        Key::from_index(self.table(A::KIND).write().intern(name))
    }

    /// Returns the name interned at `index` in `kind`.
    ///
    /// # Errors
    ///
    /// Returns a `Corruption` error if no key with that index was ever handed out.
    pub fn resolve(&self, kind: KeyKind, index: u32) -> Result<Arc<str>> {
        self.table(kind)
            .read()
            .names
            .get(index as usize)
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::Corruption { kind, index }))
    }

    /// Returns the name of `key`.
    ///
    /// # Errors
    ///
    /// Returns a `Corruption` error if the key did not come from this registry.
    pub fn name<A: Attribute>(&self, key: Key<A>) -> Result<Arc<str>> {
        self.resolve(A::KIND, key.index())
    }

    /// Human-readable label for messages, e.g. `"x (float)"`.
    ///
    /// Unknown keys are labelled by index instead of failing.
    #[must_use]
    pub fn label<A: Attribute>(&self, key: Key<A>) -> String {
        match self.name(key) {
            Ok(name) => format!("{name} ({})", A::KIND),
            Err(_) => format!("#{} ({})", key.index(), A::KIND),
        }
    }

    /// Number of keys interned for `kind`.
    #[must_use]
    pub fn key_count(&self, kind: KeyKind) -> usize {
        self.table(kind).read().names.len()
    }

    /// Returns true if `kind` refuses implicit key creation.
    #[must_use]
    pub fn is_strict(&self, kind: KeyKind) -> bool {
        self.table(kind).read().strict
    }
}

impl Default for KeyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in KeyKind::ALL {
            map.entry(&kind.name(), &self.key_count(kind));
        }
        map.finish()
    }
}

/// Builder for [`KeyRegistry`].
#[derive(Debug, Default, Clone)]
pub struct KeyRegistryBuilder {
    strict: Vec<KeyKind>,
}

impl KeyRegistryBuilder {
    /// Makes `kind` strict: lookups of unregistered names fail.
    #[must_use]
    pub fn strict(mut self, kind: KeyKind) -> Self {
        if !self.strict.contains(&kind) {
            self.strict.push(kind);
        }
        self
    }

    /// Builds the registry.
    #[must_use]
    pub fn build(self) -> KeyRegistry {
        let tables = KeyKind::ALL.map(|kind| {
            RwLock::new(KindTable {
                strict: self.strict.contains(&kind),
                ..KindTable::default()
            })
        });
        let registry = KeyRegistry { tables };

        // Reserved float keys are interned at fixed indices even when floats are strict.
        for (i, &name) in KeyRegistry::RESERVED_FLOAT_KEYS.iter().enumerate() {
            let key = registry.register::<Float>(name);
            debug_assert_eq!(key.slot(), i, "reserved float key {name} misplaced");
        }

        registry
    }
}
