//! Object heap and un-intercepted default operation semantics.
//!
//! Every object the membrane mediates lives here, surrogates included. A
//! surrogate is a structurally minimal shadow: same category tag as its real
//! value, empty own-property table, no prototype. Its observable shape comes
//! entirely from interception; the shadow exists only to give the surrogate
//! an identity and a place for policy-local storage.
//!
//! The `raw_*` methods implement the default behavior of the thirteen
//! primitive operations on plain objects: prototype-chain reads, writes
//! honoring writability and extensibility, configurable-gated deletion, and
//! deterministic own-key enumeration. Invocation and construction live on
//! `Membrane` because native bodies receive the membrane itself.
//!
//! # Citations
//! - ECMA-262, §6.1.7.2 "Object Internal Methods and Internal Slots" – the
//!   observable contract the defaults mirror
//! - Van Cutsem & Miller, "Trustworthy Proxies" (ECOOP 2013)

use crate::arena::ObjectArena;
use crate::error::MembraneError;
use crate::value::{GraphKey, NativeFn, ObjId, ObjectKind, PropKey, PropertyDescriptor, Value};
use std::collections::BTreeMap;

/// Membrane bookkeeping attached to a surrogate object.
///
/// Present if and only if the object is a surrogate. `revoked` is the
/// per-surrogate revocation record: once set it never clears, and every
/// primitive operation on the surrogate fails with `Revoked`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyState {
    /// Destination graph this surrogate belongs to.
    pub graph: GraphKey,
    /// One-way revocation flag.
    pub revoked: bool,
}

/// Heap representation of one object.
#[derive(Debug, Clone)]
pub struct ObjectData {
    /// Externally observable category.
    pub kind: ObjectKind,
    /// Own properties, ordered for deterministic enumeration.
    pub props: BTreeMap<PropKey, PropertyDescriptor>,
    /// Prototype link, if any.
    pub prototype: Option<ObjId>,
    /// Whether new own properties may be added.
    pub extensible: bool,
    /// Present iff this object is a surrogate.
    pub proxy: Option<ProxyState>,
    /// Native body for callables.
    pub call: Option<NativeFn>,
}

impl ObjectData {
    fn plain(kind: ObjectKind) -> Self {
        Self {
            kind,
            props: BTreeMap::new(),
            prototype: None,
            extensible: true,
            proxy: None,
            call: None,
        }
    }
}

/// Arena of all objects owned by one membrane.
#[derive(Debug, Default)]
pub struct ObjectHeap {
    objects: ObjectArena<ObjectData>,
}

impl ObjectHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an ordinary keyed object.
    pub fn alloc_plain(&mut self) -> ObjId {
        self.objects.allocate(ObjectData::plain(ObjectKind::Plain))
    }

    /// Allocates an indexed collection.
    pub fn alloc_indexed(&mut self) -> ObjId {
        self.objects.allocate(ObjectData::plain(ObjectKind::Indexed))
    }

    /// Allocates a callable with the given native body.
    pub fn alloc_callable(&mut self, body: NativeFn) -> ObjId {
        let mut data = ObjectData::plain(ObjectKind::Callable);
        data.call = Some(body);
        self.objects.allocate(data)
    }

    /// Allocates a surrogate shadow: category-tagged, empty, proxied.
    pub fn alloc_shadow(&mut self, kind: ObjectKind, graph: GraphKey) -> ObjId {
        let mut data = ObjectData::plain(kind);
        data.proxy = Some(ProxyState {
            graph,
            revoked: false,
        });
        self.objects.allocate(data)
    }

    /// Frees an object slot. Used to roll back a failed surrogate mint.
    pub(crate) fn free(&mut self, id: ObjId) -> bool {
        self.objects.free(id)
    }

    /// Number of live objects.
    pub fn live_count(&self) -> usize {
        self.objects.live_count()
    }

    /// Resolves a handle to its object, failing on dangling handles.
    pub fn object(&self, id: ObjId) -> Result<&ObjectData, MembraneError> {
        self.objects.get(id).ok_or(MembraneError::NotAnObject(id))
    }

    /// Mutable variant of [`ObjectHeap::object`].
    pub fn object_mut(&mut self, id: ObjId) -> Result<&mut ObjectData, MembraneError> {
        self.objects
            .get_mut(id)
            .ok_or(MembraneError::NotAnObject(id))
    }

    // ------------------------------------------------------------------
    // Default (un-intercepted) primitive operation semantics
    // ------------------------------------------------------------------

    /// Property read with prototype-chain walk. Absent properties read as
    /// `Null`.
    pub fn raw_get(&self, obj: ObjId, key: &PropKey) -> Result<Value, MembraneError> {
        let mut cursor = Some(obj);
        while let Some(id) = cursor {
            let data = self.object(id)?;
            if let Some(desc) = data.props.get(key) {
                return Ok(desc.value.clone());
            }
            cursor = data.prototype;
        }
        Ok(Value::Null)
    }

    /// Membership test with prototype-chain walk.
    pub fn raw_has(&self, obj: ObjId, key: &PropKey) -> Result<bool, MembraneError> {
        let mut cursor = Some(obj);
        while let Some(id) = cursor {
            let data = self.object(id)?;
            if data.props.contains_key(key) {
                return Ok(true);
            }
            cursor = data.prototype;
        }
        Ok(false)
    }

    /// Property write.
    ///
    /// Returns `false` (without mutating) when the own or inherited
    /// descriptor is non-writable, or when the key is new and the object is
    /// non-extensible.
    pub fn raw_set(&mut self, obj: ObjId, key: &PropKey, value: Value) -> Result<bool, MembraneError> {
        match self.object(obj)?.props.get(key).map(|d| d.writable) {
            Some(false) => return Ok(false),
            Some(true) => {
                let data = self.object_mut(obj)?;
                if let Some(desc) = data.props.get_mut(key) {
                    desc.value = value;
                }
                return Ok(true);
            }
            None => {}
        }
        // Inherited non-writable data property blocks the write.
        let mut cursor = self.object(obj)?.prototype;
        while let Some(id) = cursor {
            let data = self.object(id)?;
            if let Some(desc) = data.props.get(key) {
                if !desc.writable {
                    return Ok(false);
                }
                break;
            }
            cursor = data.prototype;
        }
        let data = self.object_mut(obj)?;
        if !data.extensible {
            return Ok(false);
        }
        data.props.insert(key.clone(), PropertyDescriptor::data(value));
        Ok(true)
    }

    /// Property deletion. Absent keys delete trivially; non-configurable
    /// properties refuse.
    pub fn raw_delete(&mut self, obj: ObjId, key: &PropKey) -> Result<bool, MembraneError> {
        let data = self.object_mut(obj)?;
        let configurable = match data.props.get(key) {
            None => return Ok(true),
            Some(desc) => desc.configurable,
        };
        if !configurable {
            return Ok(false);
        }
        data.props.remove(key);
        Ok(true)
    }

    /// Own-key enumeration in deterministic (`PropKey` ordering) order.
    pub fn raw_own_keys(&self, obj: ObjId) -> Result<Vec<PropKey>, MembraneError> {
        Ok(self.object(obj)?.props.keys().cloned().collect())
    }

    /// Own-property descriptor query.
    pub fn raw_get_own(
        &self,
        obj: ObjId,
        key: &PropKey,
    ) -> Result<Option<PropertyDescriptor>, MembraneError> {
        Ok(self.object(obj)?.props.get(key).cloned())
    }

    /// Own-property definition.
    ///
    /// Returns `false` when the key is new on a non-extensible object, or
    /// when redefining a non-configurable property with anything but a pure
    /// value update on a writable descriptor.
    pub fn raw_define(
        &mut self,
        obj: ObjId,
        key: PropKey,
        desc: PropertyDescriptor,
    ) -> Result<bool, MembraneError> {
        let data = self.object_mut(obj)?;
        let existing = data
            .props
            .get(&key)
            .map(|d| (d.writable, d.enumerable, d.configurable));
        match existing {
            None => {
                if !data.extensible {
                    return Ok(false);
                }
                data.props.insert(key, desc);
                Ok(true)
            }
            Some((writable, enumerable, configurable)) if !configurable => {
                let value_only = writable
                    && desc.writable == writable
                    && desc.enumerable == enumerable
                    && desc.configurable == configurable;
                if !value_only {
                    return Ok(false);
                }
                data.props.insert(key, desc);
                Ok(true)
            }
            Some(_) => {
                data.props.insert(key, desc);
                Ok(true)
            }
        }
    }

    /// Prototype read. `Null` when there is no prototype.
    pub fn raw_prototype(&self, obj: ObjId) -> Result<Value, MembraneError> {
        Ok(match self.object(obj)?.prototype {
            Some(p) => Value::Obj(p),
            None => Value::Null,
        })
    }

    /// Prototype write. Refuses on non-extensible objects and on links that
    /// would close a prototype cycle.
    pub fn raw_set_prototype(
        &mut self,
        obj: ObjId,
        proto: Option<ObjId>,
    ) -> Result<bool, MembraneError> {
        if !self.object(obj)?.extensible {
            return Ok(false);
        }
        if let Some(mut cursor) = proto {
            loop {
                if cursor == obj {
                    return Ok(false);
                }
                match self.object(cursor)?.prototype {
                    Some(next) => cursor = next,
                    None => break,
                }
            }
        }
        self.object_mut(obj)?.prototype = proto;
        Ok(true)
    }

    /// Extensibility query.
    pub fn raw_is_extensible(&self, obj: ObjId) -> Result<bool, MembraneError> {
        Ok(self.object(obj)?.extensible)
    }

    /// Extensibility lock. Idempotent, never fails on a live object.
    pub fn raw_prevent_extensions(&mut self, obj: ObjId) -> Result<bool, MembraneError> {
        self.object_mut(obj)?.extensible = false;
        Ok(true)
    }
}
