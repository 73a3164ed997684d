//! Type registries: classes, records and interfaces.
//!
//! Classes live in an arena indexed by `ClassId`; a side map from
//! lower-cased name key to id serves call-site classification. Parent links
//! are ids, so subclass walks are pointer-free index chasing.
//!
//! Method tables are keyed by the lower-cased method key; each entry is an
//! overload set in declaration order. Virtual dispatch goes through a VMT
//! keyed by full [`SigKey`], built per class by [`Registry::finalize`] (or
//! computed by chain walk when a class was never finalized).

use std::rc::Rc;

use lapis_ir::{ExprId, MethodDecl, MethodKind, Name, StringInterner, TypeSpec};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::errors::{self, EvalError};
use crate::operators::OperatorEntry;
use crate::shared::Shared;
use crate::signature::SigKey;
use crate::value::Value;

/// Index into the class arena.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[repr(transparent)]
pub struct ClassId(u32);

/// Index into the record-type arena.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[repr(transparent)]
pub struct RecordId(u32);

/// Index into the interface arena.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[repr(transparent)]
pub struct InterfaceId(u32);

macro_rules! arena_id {
    ($ty:ident) => {
        impl $ty {
            #[inline]
            pub const fn new(index: u32) -> Self {
                $ty(index)
            }

            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(ClassId);
arena_id!(RecordId);
arena_id!(InterfaceId);

/// Overloads of one method key, in declaration order.
pub type OverloadSet = SmallVec<[Rc<MethodDecl>; 2]>;

/// A declared instance field.
#[derive(Clone, Debug)]
pub struct FieldInfo {
    pub name: Name,
    pub key: Name,
    pub ty: TypeSpec,
    /// Evaluated at allocation, in a scope seeded with class constants.
    pub initializer: Option<ExprId>,
}

/// A class-scope constant: expression plus lazily memoized value.
#[derive(Clone, Debug)]
pub struct ConstInfo {
    pub expr: ExprId,
    pub cached: Shared<Option<Value>>,
}

/// How one side of a property is implemented.
#[derive(Clone, Debug)]
pub enum PropAccess {
    /// Backed directly by the field with this key.
    Field(Name),
    /// Routed through the accessor method with this key.
    Method(Name),
    /// Side not present (write-only / read-only properties).
    None,
}

/// A declared property.
#[derive(Clone, Debug)]
pub struct PropertyInfo {
    pub name: Name,
    pub key: Name,
    pub read: PropAccess,
    pub write: PropAccess,
}

/// Resolved virtual slot: the most-derived implementation and its class.
#[derive(Clone, Debug)]
pub struct VmtEntry {
    pub owner: ClassId,
    pub decl: Rc<MethodDecl>,
}

/// Which method table to search.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MethodSlot {
    Instance,
    ClassMethod,
    Constructor,
}

/// Everything registered for one class.
#[derive(Debug, Default)]
pub struct ClassInfo {
    /// Case-preserved declared name, reported by `ClassName`.
    pub name: Name,
    /// Lower-cased lookup key.
    pub key: Name,
    pub parent: Option<ClassId>,
    pub fields: Vec<FieldInfo>,
    pub methods: FxHashMap<Name, OverloadSet>,
    pub class_methods: FxHashMap<Name, OverloadSet>,
    pub constructors: FxHashMap<Name, OverloadSet>,
    pub properties: FxHashMap<Name, PropertyInfo>,
    pub constants: FxHashMap<Name, ConstInfo>,
    pub class_vars: FxHashMap<Name, Shared<Value>>,
    pub interfaces: Vec<InterfaceId>,
    pub operators: Vec<OperatorEntry>,
    vmt: FxHashMap<SigKey, VmtEntry>,
    vmt_built: bool,
}

/// A record type: named fields plus methods (no inheritance).
#[derive(Debug, Default)]
pub struct RecordTypeInfo {
    pub name: Name,
    pub key: Name,
    pub fields: Vec<FieldInfo>,
    pub methods: FxHashMap<Name, OverloadSet>,
    pub static_methods: FxHashMap<Name, OverloadSet>,
    pub operators: Vec<OperatorEntry>,
}

/// An interface: a set of required method keys, possibly extending a parent.
#[derive(Debug, Default)]
pub struct InterfaceInfo {
    pub name: Name,
    pub key: Name,
    pub parent: Option<InterfaceId>,
    pub methods: Vec<Name>,
}

/// The registries the dispatcher consults, plus global operator overloads.
#[derive(Debug, Default)]
pub struct Registry {
    classes: Vec<ClassInfo>,
    class_index: FxHashMap<Name, ClassId>,
    records: Vec<RecordTypeInfo>,
    record_index: FxHashMap<Name, RecordId>,
    interfaces: Vec<InterfaceInfo>,
    interface_index: FxHashMap<Name, InterfaceId>,
    pub(crate) global_operators: Vec<OperatorEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // --- classes ---

    /// Register a class. The parent, if any, must already be registered;
    /// issuing ids only for existing parents keeps hierarchies acyclic by
    /// construction.
    pub fn register_class(
        &mut self,
        interner: &StringInterner,
        name: &str,
        parent: Option<ClassId>,
    ) -> Result<ClassId, EvalError> {
        let key = interner.intern_ci(name);
        if self.class_index.contains_key(&key) {
            return Err(errors::registration(format!(
                "class '{name}' is already registered"
            )));
        }
        let id = ClassId::new(self.classes.len() as u32);
        self.classes.push(ClassInfo {
            name: interner.intern(name),
            key,
            parent,
            ..ClassInfo::default()
        });
        self.class_index.insert(key, id);
        Ok(id)
    }

    #[inline]
    pub fn class(&self, id: ClassId) -> &ClassInfo {
        &self.classes[id.index()]
    }

    #[inline]
    pub fn class_mut(&mut self, id: ClassId) -> &mut ClassInfo {
        &mut self.classes[id.index()]
    }

    pub fn lookup_class(&self, key: Name) -> Option<ClassId> {
        self.class_index.get(&key).copied()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Reflexive subclass test.
    pub fn is_subclass_of(&self, class: ClassId, ancestor: ClassId) -> bool {
        let mut cur = Some(class);
        while let Some(id) = cur {
            if id == ancestor {
                return true;
            }
            cur = self.class(id).parent;
        }
        false
    }

    /// Ancestor chain, most-derived first.
    pub fn class_chain(&self, id: ClassId) -> SmallVec<[ClassId; 8]> {
        let mut chain = SmallVec::new();
        let mut cur = Some(id);
        while let Some(c) = cur {
            chain.push(c);
            cur = self.class(c).parent;
        }
        chain
    }

    /// Ancestor chain, root first. Field layout and class-scope injection
    /// walk this direction so derived declarations land last.
    pub fn class_chain_root_first(&self, id: ClassId) -> SmallVec<[ClassId; 8]> {
        let mut chain = self.class_chain(id);
        chain.reverse();
        chain
    }

    pub fn add_field(
        &mut self,
        id: ClassId,
        interner: &StringInterner,
        name: &str,
        ty: TypeSpec,
        initializer: Option<ExprId>,
    ) {
        self.class_mut(id).fields.push(FieldInfo {
            name: interner.intern(name),
            key: interner.intern_ci(name),
            ty,
            initializer,
        });
    }

    /// Add a method, routing by kind: constructors, class methods and
    /// instance methods (destructors included) go to separate tables.
    pub fn add_method(&mut self, id: ClassId, decl: MethodDecl) -> Rc<MethodDecl> {
        let decl = Rc::new(decl);
        let class = self.class_mut(id);
        let table = if decl.kind == MethodKind::Constructor {
            &mut class.constructors
        } else if decl.is_class_method {
            &mut class.class_methods
        } else {
            &mut class.methods
        };
        table.entry(decl.key).or_default().push(decl.clone());
        class.vmt_built = false;
        decl
    }

    pub fn add_property(
        &mut self,
        id: ClassId,
        interner: &StringInterner,
        name: &str,
        read: PropAccess,
        write: PropAccess,
    ) {
        let key = interner.intern_ci(name);
        self.class_mut(id).properties.insert(
            key,
            PropertyInfo {
                name: interner.intern(name),
                key,
                read,
                write,
            },
        );
    }

    pub fn add_constant(&mut self, id: ClassId, interner: &StringInterner, name: &str, expr: ExprId) {
        let key = interner.intern_ci(name);
        self.class_mut(id).constants.insert(
            key,
            ConstInfo {
                expr,
                cached: Shared::new(None),
            },
        );
    }

    /// Add a class variable, shared by the class and all descendants.
    pub fn add_class_var(
        &mut self,
        id: ClassId,
        interner: &StringInterner,
        name: &str,
        initial: Value,
    ) -> Shared<Value> {
        let key = interner.intern_ci(name);
        let cell = Shared::new(initial);
        self.class_mut(id).class_vars.insert(key, cell.clone());
        cell
    }

    /// Declare that `class` implements `iface`, checking the contract: the
    /// class hierarchy must provide an instance method for every method key
    /// the interface (and its parents) declares.
    pub fn implement_interface(
        &mut self,
        interner: &StringInterner,
        class: ClassId,
        iface: InterfaceId,
    ) -> Result<(), EvalError> {
        for required in self.interface_method_keys(iface) {
            let found = self
                .class_chain(class)
                .iter()
                .any(|c| self.class(*c).methods.contains_key(&required));
            if !found {
                return Err(errors::registration(format!(
                    "class '{}' does not implement '{}' required by interface '{}'",
                    interner.lookup(self.class(class).name),
                    interner.lookup(required),
                    interner.lookup(self.interface(iface).name),
                )));
            }
        }
        self.class_mut(class).interfaces.push(iface);
        Ok(())
    }

    /// Whether `class` (or an ancestor) declares `iface` (or a descendant
    /// interface of it).
    pub fn class_implements(&self, class: ClassId, iface: InterfaceId) -> bool {
        self.class_chain(class).iter().any(|c| {
            self.class(*c)
                .interfaces
                .iter()
                .any(|declared| self.interface_is(*declared, iface))
        })
    }

    /// Find class-var cell, searching the hierarchy most-derived first.
    pub fn find_class_var(&self, id: ClassId, key: Name) -> Option<Shared<Value>> {
        self.class_chain(id)
            .iter()
            .find_map(|c| self.class(*c).class_vars.get(&key).cloned())
    }

    /// Find a class constant, searching the hierarchy most-derived first.
    pub fn find_constant(&self, id: ClassId, key: Name) -> Option<ConstInfo> {
        self.class_chain(id)
            .iter()
            .find_map(|c| self.class(*c).constants.get(&key).cloned())
    }

    /// Find a property, searching the hierarchy most-derived first.
    pub fn find_property(&self, id: ClassId, key: Name) -> Option<PropertyInfo> {
        self.class_chain(id)
            .iter()
            .find_map(|c| self.class(*c).properties.get(&key).cloned())
    }

    /// Collect the overload candidates for `key`, walking the hierarchy
    /// most-derived first. A declaration hides an ancestor's declaration
    /// with the same full signature; overloads with distinct signatures
    /// accumulate across the chain. Hiding only reaches upward: two
    /// equal-signature declarations on one class both surface, so the
    /// call site reports the ambiguity instead of picking one.
    pub fn find_methods(
        &self,
        id: ClassId,
        key: Name,
        slot: MethodSlot,
        interner: &StringInterner,
    ) -> SmallVec<[(ClassId, Rc<MethodDecl>); 2]> {
        let mut seen: SmallVec<[SigKey; 4]> = SmallVec::new();
        let mut out = SmallVec::new();
        for c in self.class_chain(id) {
            let class = self.class(c);
            let table = match slot {
                MethodSlot::Instance => &class.methods,
                MethodSlot::ClassMethod => &class.class_methods,
                MethodSlot::Constructor => &class.constructors,
            };
            let mut level: SmallVec<[SigKey; 4]> = SmallVec::new();
            if let Some(set) = table.get(&key) {
                for decl in set {
                    let sig = SigKey::of(decl, interner);
                    if !seen.contains(&sig) {
                        level.push(sig);
                        out.push((c, decl.clone()));
                    }
                }
            }
            seen.extend(level);
        }
        out
    }

    /// Build the class's VMT: walk root-first so derived virtual
    /// declarations overwrite ancestor slots with the same signature.
    pub fn finalize(&mut self, id: ClassId, interner: &StringInterner) {
        let mut vmt: FxHashMap<SigKey, VmtEntry> = FxHashMap::default();
        for c in self.class_chain_root_first(id) {
            for set in self.class(c).methods.values() {
                for decl in set {
                    if decl.binding.is_virtual() {
                        vmt.insert(
                            SigKey::of(decl, interner),
                            VmtEntry {
                                owner: c,
                                decl: decl.clone(),
                            },
                        );
                    }
                }
            }
        }
        let class = self.class_mut(id);
        class.vmt = vmt;
        class.vmt_built = true;
    }

    /// Finalize every registered class.
    pub fn finalize_all(&mut self, interner: &StringInterner) {
        for i in 0..self.classes.len() {
            self.finalize(ClassId::new(i as u32), interner);
        }
    }

    /// Most-derived implementation for a virtual slot, starting from the
    /// receiver's runtime class. Falls back to a chain walk when the class
    /// was never finalized.
    pub fn virtual_target(
        &self,
        runtime: ClassId,
        sig: &SigKey,
        interner: &StringInterner,
    ) -> Option<(ClassId, Rc<MethodDecl>)> {
        let class = self.class(runtime);
        if class.vmt_built {
            return class
                .vmt
                .get(sig)
                .map(|entry| (entry.owner, entry.decl.clone()));
        }
        for c in self.class_chain(runtime) {
            if let Some(set) = self.class(c).methods.get(&sig.name) {
                for decl in set {
                    if decl.binding.is_virtual() && SigKey::of(decl, interner) == *sig {
                        return Some((c, decl.clone()));
                    }
                }
            }
        }
        None
    }

    // --- records ---

    pub fn register_record(
        &mut self,
        interner: &StringInterner,
        name: &str,
    ) -> Result<RecordId, EvalError> {
        let key = interner.intern_ci(name);
        if self.record_index.contains_key(&key) {
            return Err(errors::registration(format!(
                "record '{name}' is already registered"
            )));
        }
        let id = RecordId::new(self.records.len() as u32);
        self.records.push(RecordTypeInfo {
            name: interner.intern(name),
            key,
            ..RecordTypeInfo::default()
        });
        self.record_index.insert(key, id);
        Ok(id)
    }

    #[inline]
    pub fn record(&self, id: RecordId) -> &RecordTypeInfo {
        &self.records[id.index()]
    }

    #[inline]
    pub fn record_mut(&mut self, id: RecordId) -> &mut RecordTypeInfo {
        &mut self.records[id.index()]
    }

    pub fn lookup_record(&self, key: Name) -> Option<RecordId> {
        self.record_index.get(&key).copied()
    }

    pub fn add_record_field(
        &mut self,
        id: RecordId,
        interner: &StringInterner,
        name: &str,
        ty: TypeSpec,
    ) {
        self.record_mut(id).fields.push(FieldInfo {
            name: interner.intern(name),
            key: interner.intern_ci(name),
            ty,
            initializer: None,
        });
    }

    pub fn add_record_method(&mut self, id: RecordId, decl: MethodDecl) -> Rc<MethodDecl> {
        let decl = Rc::new(decl);
        let record = self.record_mut(id);
        let table = if decl.is_class_method {
            &mut record.static_methods
        } else {
            &mut record.methods
        };
        table.entry(decl.key).or_default().push(decl.clone());
        decl
    }

    pub fn record_methods(&self, id: RecordId, key: Name, statics: bool) -> OverloadSet {
        let record = self.record(id);
        let table = if statics {
            &record.static_methods
        } else {
            &record.methods
        };
        table.get(&key).cloned().unwrap_or_default()
    }

    // --- interfaces ---

    pub fn register_interface(
        &mut self,
        interner: &StringInterner,
        name: &str,
        parent: Option<InterfaceId>,
    ) -> Result<InterfaceId, EvalError> {
        let key = interner.intern_ci(name);
        if self.interface_index.contains_key(&key) {
            return Err(errors::registration(format!(
                "interface '{name}' is already registered"
            )));
        }
        let id = InterfaceId::new(self.interfaces.len() as u32);
        self.interfaces.push(InterfaceInfo {
            name: interner.intern(name),
            key,
            parent,
            ..InterfaceInfo::default()
        });
        self.interface_index.insert(key, id);
        Ok(id)
    }

    #[inline]
    pub fn interface(&self, id: InterfaceId) -> &InterfaceInfo {
        &self.interfaces[id.index()]
    }

    pub fn lookup_interface(&self, key: Name) -> Option<InterfaceId> {
        self.interface_index.get(&key).copied()
    }

    pub fn add_interface_method(&mut self, id: InterfaceId, interner: &StringInterner, name: &str) {
        let key = interner.intern_ci(name);
        self.interfaces[id.index()].methods.push(key);
    }

    /// Reflexive interface extension test.
    pub fn interface_is(&self, iface: InterfaceId, ancestor: InterfaceId) -> bool {
        let mut cur = Some(iface);
        while let Some(id) = cur {
            if id == ancestor {
                return true;
            }
            cur = self.interface(id).parent;
        }
        false
    }

    /// Whether the interface (or a parent) declares `key`.
    pub fn interface_declares(&self, iface: InterfaceId, key: Name) -> bool {
        let mut cur = Some(iface);
        while let Some(id) = cur {
            if self.interface(id).methods.contains(&key) {
                return true;
            }
            cur = self.interface(id).parent;
        }
        false
    }

    fn interface_method_keys(&self, iface: InterfaceId) -> Vec<Name> {
        let mut keys = Vec::new();
        let mut cur = Some(iface);
        while let Some(id) = cur {
            keys.extend_from_slice(&self.interface(id).methods);
            cur = self.interface(id).parent;
        }
        keys
    }
}
