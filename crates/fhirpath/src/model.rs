//! The model provider interface (§4.10): an opaque type-resolution and
//! property-navigation contract the analyzer (and, optionally, evaluator)
//! consult for everything they need to know about the data model.
//!
//! The core never introspects a [`TypeRef`]'s internals — it is a label the
//! provider hands back and forth. Hosts backed by a real schema (FHIR
//! StructureDefinitions, a JSON Schema, …) implement [`ModelProvider`]
//! themselves; [`DynamicModelProvider`] is the structural fallback used when
//! no schema is supplied, inferring types from the data itself.

use crate::collections::HashMap;
use std::sync::Arc;

/// An opaque type handle. The core treats this as a bare label; providers
/// may wrap a richer internal reference behind [`TypeRef::as_str`] if their
/// own bookkeeping wants one (e.g. to cache a `StructureDefinition` lookup).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeRef(pub Arc<str>);

impl TypeRef {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn any() -> Self {
        Self::new("Any")
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node's inferred type and cardinality, as annotated by the [`crate::analyzer::TypeAnalyzer`].
#[derive(Clone, Debug, PartialEq)]
pub struct TypeInfo {
    pub ty: TypeRef,
    pub is_singleton: bool,
    pub namespace: Option<Arc<str>>,
    /// Set when `ty` is a choice/union type (e.g. FHIR's `value[x]`).
    pub choices: Option<Vec<TypeRef>>,
}

impl TypeInfo {
    pub fn new(ty: TypeRef, is_singleton: bool) -> Self {
        Self { ty, is_singleton, namespace: None, choices: None }
    }

    pub fn singleton(ty: TypeRef) -> Self {
        Self::new(ty, true)
    }

    pub fn collection(ty: TypeRef) -> Self {
        Self::new(ty, false)
    }

    pub fn any() -> Self {
        Self::singleton(TypeRef::any())
    }

    pub fn union(choices: Vec<TypeRef>, is_singleton: bool) -> Self {
        Self {
            ty: TypeRef::new("Union"),
            is_singleton,
            namespace: None,
            choices: Some(choices),
        }
    }

    pub fn is_union(&self) -> bool {
        self.choices.is_some()
    }

    pub fn with_singleton(mut self, is_singleton: bool) -> Self {
        self.is_singleton = is_singleton;
        self
    }
}

/// The analyzer and, optionally, the evaluator's sole window onto the data
/// model. Every method is a pure query; the core never mutates or caches
/// across calls on the caller's behalf.
pub trait ModelProvider: Send + Sync {
    fn resolve_type(&self, name: &str) -> Option<TypeRef>;

    fn property_type(&self, ty: &TypeRef, name: &str) -> Option<TypeInfo>;

    fn is_assignable(&self, from: &TypeRef, to: &TypeRef) -> bool;

    fn type_name(&self, ty: &TypeRef) -> String {
        ty.to_string()
    }

    fn is_collection_type(&self, _ty: &TypeRef) -> bool {
        false
    }

    /// The narrowest type both `a` and `b` are assignable to, if any.
    fn common_type(&self, types: &[TypeRef]) -> Option<TypeRef> {
        let mut iter = types.iter();
        let first = iter.next()?.clone();
        if iter.all(|t| *t == first) {
            Some(first)
        } else {
            Some(TypeRef::any())
        }
    }

    /// The union of all of `parent`'s element types, for `children()`.
    fn children_type(&self, parent: &TypeRef) -> Option<TypeInfo>;

    fn element_names(&self, _ty: &TypeRef) -> Option<Vec<String>> {
        None
    }
}

/// The structural fallback `ModelProvider`: infers types directly from
/// [`crate::value::Value`] shapes rather than from an external schema. This
/// is what [`crate::evaluate`] uses when the caller supplies none — enough
/// to evaluate any expression, though `is`/`as`/`ofType` against a FHIR type
/// hierarchy (e.g. `Quantity is SimpleQuantity`) needs a real provider to
/// know about that hierarchy at all.
#[derive(Default)]
pub struct DynamicModelProvider {
    aliases: HashMap<Box<str>, TypeRef>,
}

impl DynamicModelProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelProvider for DynamicModelProvider {
    fn resolve_type(&self, name: &str) -> Option<TypeRef> {
        if let Some(aliased) = self.aliases.get(name) {
            return Some(aliased.clone());
        }
        Some(TypeRef::new(name))
    }

    fn property_type(&self, _ty: &TypeRef, _name: &str) -> Option<TypeInfo> {
        // The dynamic provider has no schema to consult; navigation falls
        // back to whatever shape the data actually has at evaluation time.
        Some(TypeInfo::any())
    }

    fn is_assignable(&self, from: &TypeRef, to: &TypeRef) -> bool {
        from == to || to.as_str() == "Any"
    }

    fn children_type(&self, _parent: &TypeRef) -> Option<TypeInfo> {
        Some(TypeInfo::collection(TypeRef::any()))
    }
}
