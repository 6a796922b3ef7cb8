//! The thirteen primitive operations and the default forwarding path.
//!
//! Every operation takes the same shape: on a plain object it runs the
//! heap's default semantics directly; on a surrogate it walks the governing
//! interception chain until a node answers. The chain's protected tail
//! answers by calling the `forward_*` methods here, which cross into the
//! origin graph with bidirectional conversion and apply whatever distortion
//! configuration the graph's policy matched.
//!
//! Invocation and construction live at this level rather than on the heap
//! because native bodies receive the membrane itself and may reenter it.

use crate::chain::{Flow, OpContext, TAIL_NODE};
use crate::distortion::{ArgTruncation, OpKind};
use crate::error::MembraneError;
use crate::registry::Membrane;
use crate::value::{GraphKey, ObjId, PropKey, PropertyDescriptor, Value};

impl Membrane {
    // ------------------------------------------------------------------
    // Public operation surface
    // ------------------------------------------------------------------

    /// Property read. Absent properties read as `Null`.
    pub fn get(&mut self, obj: ObjId, key: &PropKey) -> Result<Value, MembraneError> {
        if self.is_surrogate(obj) {
            let (cx, nodes) = self.begin(obj, OpKind::Read)?;
            let receiver = Value::Obj(obj);
            for node in nodes {
                if let Flow::Done(v) = node.read(self, &cx, key, &receiver)? {
                    return Ok(v);
                }
            }
            return Err(MembraneError::UnknownNode(TAIL_NODE.to_string()));
        }
        self.heap.raw_get(obj, key)
    }

    /// Property write. Returns `false` when the write is refused.
    pub fn set(&mut self, obj: ObjId, key: &PropKey, value: Value) -> Result<bool, MembraneError> {
        if self.is_surrogate(obj) {
            let (cx, nodes) = self.begin(obj, OpKind::Write)?;
            let receiver = Value::Obj(obj);
            for node in nodes {
                if let Flow::Done(ok) = node.write(self, &cx, key, &value, &receiver)? {
                    return Ok(ok);
                }
            }
            return Err(MembraneError::UnknownNode(TAIL_NODE.to_string()));
        }
        self.heap.raw_set(obj, key, value)
    }

    /// Property deletion. Returns `false` when the key refuses deletion.
    pub fn delete_property(&mut self, obj: ObjId, key: &PropKey) -> Result<bool, MembraneError> {
        if self.is_surrogate(obj) {
            let (cx, nodes) = self.begin(obj, OpKind::Delete)?;
            for node in nodes {
                if let Flow::Done(ok) = node.delete(self, &cx, key)? {
                    return Ok(ok);
                }
            }
            return Err(MembraneError::UnknownNode(TAIL_NODE.to_string()));
        }
        self.heap.raw_delete(obj, key)
    }

    /// Own-key enumeration in deterministic order.
    pub fn own_keys(&mut self, obj: ObjId) -> Result<Vec<PropKey>, MembraneError> {
        if self.is_surrogate(obj) {
            let (cx, nodes) = self.begin(obj, OpKind::Enumerate)?;
            for node in nodes {
                if let Flow::Done(keys) = node.enumerate(self, &cx)? {
                    return Ok(keys);
                }
            }
            return Err(MembraneError::UnknownNode(TAIL_NODE.to_string()));
        }
        self.heap.raw_own_keys(obj)
    }

    /// Own-property descriptor query.
    pub fn get_descriptor(
        &mut self,
        obj: ObjId,
        key: &PropKey,
    ) -> Result<Option<PropertyDescriptor>, MembraneError> {
        if self.is_surrogate(obj) {
            let (cx, nodes) = self.begin(obj, OpKind::GetDescriptor)?;
            for node in nodes {
                if let Flow::Done(desc) = node.descriptor(self, &cx, key)? {
                    return Ok(desc);
                }
            }
            return Err(MembraneError::UnknownNode(TAIL_NODE.to_string()));
        }
        self.heap.raw_get_own(obj, key)
    }

    /// Own-property definition.
    pub fn define_property(
        &mut self,
        obj: ObjId,
        key: PropKey,
        desc: PropertyDescriptor,
    ) -> Result<bool, MembraneError> {
        if self.is_surrogate(obj) {
            let (cx, nodes) = self.begin(obj, OpKind::DefineDescriptor)?;
            for node in nodes {
                if let Flow::Done(ok) = node.define(self, &cx, &key, &desc)? {
                    return Ok(ok);
                }
            }
            return Err(MembraneError::UnknownNode(TAIL_NODE.to_string()));
        }
        self.heap.raw_define(obj, key, desc)
    }

    /// Defines a fully permissive data property.
    pub fn define_data(
        &mut self,
        obj: ObjId,
        key: PropKey,
        value: Value,
    ) -> Result<bool, MembraneError> {
        self.define_property(obj, key, PropertyDescriptor::data(value))
    }

    /// Prototype read. `Null` when there is no prototype.
    pub fn prototype_of(&mut self, obj: ObjId) -> Result<Value, MembraneError> {
        if self.is_surrogate(obj) {
            let (cx, nodes) = self.begin(obj, OpKind::ReadPrototype)?;
            for node in nodes {
                if let Flow::Done(proto) = node.prototype(self, &cx)? {
                    return Ok(proto);
                }
            }
            return Err(MembraneError::UnknownNode(TAIL_NODE.to_string()));
        }
        self.heap.raw_prototype(obj)
    }

    /// Prototype write. `proto` must be `Null` or an object; anything else
    /// refuses with `false`, as do non-extensible targets and cycles.
    pub fn set_prototype(&mut self, obj: ObjId, proto: Value) -> Result<bool, MembraneError> {
        if self.is_surrogate(obj) {
            let (cx, nodes) = self.begin(obj, OpKind::WritePrototype)?;
            for node in nodes {
                if let Flow::Done(ok) = node.set_prototype(self, &cx, &proto)? {
                    return Ok(ok);
                }
            }
            return Err(MembraneError::UnknownNode(TAIL_NODE.to_string()));
        }
        let proto = match proto {
            Value::Null => None,
            Value::Obj(id) => Some(id),
            _ => return Ok(false),
        };
        self.heap.raw_set_prototype(obj, proto)
    }

    /// Extensibility query.
    pub fn is_extensible(&mut self, obj: ObjId) -> Result<bool, MembraneError> {
        if self.is_surrogate(obj) {
            let (cx, nodes) = self.begin(obj, OpKind::IsExtensible)?;
            for node in nodes {
                if let Flow::Done(ext) = node.is_extensible(self, &cx)? {
                    return Ok(ext);
                }
            }
            return Err(MembraneError::UnknownNode(TAIL_NODE.to_string()));
        }
        self.heap.raw_is_extensible(obj)
    }

    /// Extensibility lock. One-way.
    pub fn prevent_extensions(&mut self, obj: ObjId) -> Result<bool, MembraneError> {
        if self.is_surrogate(obj) {
            let (cx, nodes) = self.begin(obj, OpKind::PreventExtensions)?;
            for node in nodes {
                if let Flow::Done(ok) = node.prevent_extensions(self, &cx)? {
                    return Ok(ok);
                }
            }
            return Err(MembraneError::UnknownNode(TAIL_NODE.to_string()));
        }
        self.heap.raw_prevent_extensions(obj)
    }

    /// Invocation of a callable value.
    pub fn invoke(
        &mut self,
        obj: ObjId,
        this: Value,
        args: &[Value],
    ) -> Result<Value, MembraneError> {
        if self.is_surrogate(obj) {
            let (cx, nodes) = self.begin(obj, OpKind::Invoke)?;
            for node in nodes {
                if let Flow::Done(out) = node.invoke(self, &cx, &this, args)? {
                    return Ok(out);
                }
            }
            return Err(MembraneError::UnknownNode(TAIL_NODE.to_string()));
        }
        let body = self
            .heap
            .object(obj)?
            .call
            .ok_or(MembraneError::NotCallable(obj))?;
        body(self, this, args)
    }

    /// Construction: the callable runs against a fresh object, which becomes
    /// the result unless the body returns an object of its own.
    pub fn construct(&mut self, obj: ObjId, args: &[Value]) -> Result<Value, MembraneError> {
        if self.is_surrogate(obj) {
            let (cx, nodes) = self.begin(obj, OpKind::Construct)?;
            for node in nodes {
                if let Flow::Done(out) = node.construct(self, &cx, args)? {
                    return Ok(out);
                }
            }
            return Err(MembraneError::UnknownNode(TAIL_NODE.to_string()));
        }
        let body = self
            .heap
            .object(obj)?
            .call
            .ok_or(MembraneError::NotCallable(obj))?;
        let fresh = self.heap.alloc_plain();
        let out = body(self, Value::Obj(fresh), args)?;
        Ok(if out.is_object() { out } else { Value::Obj(fresh) })
    }

    /// Membership test with prototype-chain walk.
    pub fn has(&mut self, obj: ObjId, key: &PropKey) -> Result<bool, MembraneError> {
        if self.is_surrogate(obj) {
            let (cx, nodes) = self.begin(obj, OpKind::Has)?;
            for node in nodes {
                if let Flow::Done(present) = node.has(self, &cx, key)? {
                    return Ok(present);
                }
            }
            return Err(MembraneError::UnknownNode(TAIL_NODE.to_string()));
        }
        self.heap.raw_has(obj, key)
    }

    // ------------------------------------------------------------------
    // Default forwarding (the chain tail's implementation)
    // ------------------------------------------------------------------

    pub(crate) fn forward_read(
        &mut self,
        cx: &OpContext,
        key: &PropKey,
        receiver: &Value,
    ) -> Result<Value, MembraneError> {
        if let Some(cfg) = &cx.config {
            if cfg.local_deletes && self.head_ref(&cx.dest)?.is_locally_deleted(cx.surrogate, key)
            {
                return Ok(Value::Null);
            }
            if cfg.local_writes {
                if let Some(desc) = self.head_ref(&cx.dest)?.local_prop(cx.surrogate, key) {
                    return Ok(desc.value.clone());
                }
            }
        }
        // Data descriptors never consult the receiver; converting it still
        // establishes its identity on the origin side.
        self.value_in_graph(&cx.origin, receiver.clone(), &cx.dest)?;
        let out = self.get(cx.real, key)?;
        self.value_in_graph(&cx.dest, out, &cx.origin)
    }

    pub(crate) fn forward_write(
        &mut self,
        cx: &OpContext,
        key: &PropKey,
        value: &Value,
        receiver: &Value,
    ) -> Result<bool, MembraneError> {
        if let Some(cfg) = &cx.config {
            if cfg.local_writes {
                let head = self.head_ref(&cx.dest)?;
                let shadowed = head.is_locally_deleted(cx.surrogate, key)
                    || head.local_prop(cx.surrogate, key).is_some();
                let real_has_own = self.heap.raw_get_own(cx.real, key)?.is_some();
                if shadowed || !real_has_own {
                    let desc = PropertyDescriptor::data(value.clone());
                    self.head_mut_ref(&cx.dest)?
                        .set_local_prop(cx.surrogate, key.clone(), desc);
                    return Ok(true);
                }
            }
        }
        self.value_in_graph(&cx.origin, receiver.clone(), &cx.dest)?;
        let converted = self.value_in_graph(&cx.origin, value.clone(), &cx.dest)?;
        self.set(cx.real, key, converted)
    }

    pub(crate) fn forward_delete(
        &mut self,
        cx: &OpContext,
        key: &PropKey,
    ) -> Result<bool, MembraneError> {
        if let Some(cfg) = &cx.config {
            if cfg.local_deletes {
                self.head_mut_ref(&cx.dest)?
                    .mark_locally_deleted(cx.surrogate, key.clone());
                return Ok(true);
            }
        }
        self.delete_property(cx.real, key)
    }

    pub(crate) fn forward_enumerate(&mut self, cx: &OpContext) -> Result<Vec<PropKey>, MembraneError> {
        let mut keys = self.own_keys(cx.real)?;
        if let Some(cfg) = &cx.config {
            {
                let head = self.head_ref(&cx.dest)?;
                if cfg.local_deletes {
                    keys.retain(|k| !head.is_locally_deleted(cx.surrogate, k));
                }
                if cfg.local_writes {
                    for k in head.local_keys(cx.surrogate) {
                        if !keys.contains(&k) {
                            keys.push(k);
                        }
                    }
                    keys.sort();
                }
            }
            if let Some(filter) = &cfg.key_filter {
                // The whitelist's own order is the reported order.
                keys = filter.iter().filter(|k| keys.contains(k)).cloned().collect();
            }
        }
        // A non-extensible real value fixes the surrogate's shape too.
        if !self.is_extensible(cx.real)? {
            self.heap.object_mut(cx.surrogate)?.extensible = false;
        }
        Ok(keys)
    }

    pub(crate) fn forward_descriptor(
        &mut self,
        cx: &OpContext,
        key: &PropKey,
    ) -> Result<Option<PropertyDescriptor>, MembraneError> {
        if let Some(cfg) = &cx.config {
            if let Some(filter) = &cfg.key_filter {
                if !filter.contains(key) {
                    return Ok(None);
                }
            }
            let head = self.head_ref(&cx.dest)?;
            if cfg.local_deletes && head.is_locally_deleted(cx.surrogate, key) {
                return Ok(None);
            }
            if cfg.local_writes {
                if let Some(desc) = head.local_prop(cx.surrogate, key) {
                    return Ok(Some(desc.clone()));
                }
            }
        }
        match self.get_descriptor(cx.real, key)? {
            None => Ok(None),
            Some(desc) => Ok(Some(self.convert_descriptor(desc, &cx.dest, &cx.origin)?)),
        }
    }

    pub(crate) fn forward_define(
        &mut self,
        cx: &OpContext,
        key: &PropKey,
        desc: &PropertyDescriptor,
    ) -> Result<bool, MembraneError> {
        if let Some(cfg) = &cx.config {
            if cfg.local_writes {
                let head = self.head_ref(&cx.dest)?;
                let shadowed = head.is_locally_deleted(cx.surrogate, key)
                    || head.local_prop(cx.surrogate, key).is_some();
                let real_has_own = self.heap.raw_get_own(cx.real, key)?.is_some();
                if shadowed || !real_has_own {
                    self.head_mut_ref(&cx.dest)?
                        .set_local_prop(cx.surrogate, key.clone(), desc.clone());
                    return Ok(true);
                }
            }
        }
        let converted = self.convert_descriptor(desc.clone(), &cx.origin, &cx.dest)?;
        self.define_property(cx.real, key.clone(), converted)
    }

    pub(crate) fn forward_prototype(&mut self, cx: &OpContext) -> Result<Value, MembraneError> {
        let proto = self.prototype_of(cx.real)?;
        self.value_in_graph(&cx.dest, proto, &cx.origin)
    }

    pub(crate) fn forward_set_prototype(
        &mut self,
        cx: &OpContext,
        proto: &Value,
    ) -> Result<bool, MembraneError> {
        let converted = self.value_in_graph(&cx.origin, proto.clone(), &cx.dest)?;
        self.set_prototype(cx.real, converted)
    }

    pub(crate) fn forward_is_extensible(&mut self, cx: &OpContext) -> Result<bool, MembraneError> {
        let ext = self.is_extensible(cx.real)?;
        if !ext {
            self.heap.object_mut(cx.surrogate)?.extensible = false;
        }
        Ok(ext)
    }

    pub(crate) fn forward_prevent_extensions(
        &mut self,
        cx: &OpContext,
    ) -> Result<bool, MembraneError> {
        let ok = self.prevent_extensions(cx.real)?;
        self.heap.object_mut(cx.surrogate)?.extensible = false;
        Ok(ok)
    }

    pub(crate) fn forward_invoke(
        &mut self,
        cx: &OpContext,
        this: &Value,
        args: &[Value],
    ) -> Result<Value, MembraneError> {
        let args = self.truncated(cx, args);
        let this = self.value_in_graph(&cx.origin, this.clone(), &cx.dest)?;
        let mut converted = Vec::with_capacity(args.len());
        for arg in args {
            converted.push(self.value_in_graph(&cx.origin, arg, &cx.dest)?);
        }
        let out = self.invoke(cx.real, this, &converted)?;
        self.value_in_graph(&cx.dest, out, &cx.origin)
    }

    pub(crate) fn forward_construct(
        &mut self,
        cx: &OpContext,
        args: &[Value],
    ) -> Result<Value, MembraneError> {
        let args = self.truncated(cx, args);
        let mut converted = Vec::with_capacity(args.len());
        for arg in args {
            converted.push(self.value_in_graph(&cx.origin, arg, &cx.dest)?);
        }
        let out = self.construct(cx.real, &converted)?;
        self.value_in_graph(&cx.dest, out, &cx.origin)
    }

    pub(crate) fn forward_has(
        &mut self,
        cx: &OpContext,
        key: &PropKey,
    ) -> Result<bool, MembraneError> {
        if let Some(cfg) = &cx.config {
            if let Some(filter) = &cfg.key_filter {
                if !filter.contains(key) {
                    return Ok(false);
                }
            }
            let head = self.head_ref(&cx.dest)?;
            if cfg.local_deletes && head.is_locally_deleted(cx.surrogate, key) {
                return Ok(false);
            }
            if cfg.local_writes && head.local_prop(cx.surrogate, key).is_some() {
                return Ok(true);
            }
        }
        self.has(cx.real, key)
    }

    fn truncated(&self, cx: &OpContext, args: &[Value]) -> Vec<Value> {
        let limit = match cx.config.as_ref().map(|c| c.truncate_args) {
            Some(ArgTruncation::Limit(n)) => n.min(args.len()),
            _ => args.len(),
        };
        args[..limit].to_vec()
    }

    fn convert_descriptor(
        &mut self,
        desc: PropertyDescriptor,
        dest: &GraphKey,
        source: &GraphKey,
    ) -> Result<PropertyDescriptor, MembraneError> {
        let PropertyDescriptor {
            value,
            writable,
            enumerable,
            configurable,
        } = desc;
        Ok(PropertyDescriptor {
            value: self.value_in_graph(dest, value, source)?,
            writable,
            enumerable,
            configurable,
        })
    }
}
