//! The runtime context: input/focus/variables/environment with scoped,
//! copy-on-write inheritance (§3, §4.7).
//!
//! A child context is O(1) to create: it holds only its own writes plus a
//! pointer to its parent. Reads walk the parent chain; writes never touch an
//! ancestor frame. Parents always outlive children by construction (the
//! chain is a tree, never a cycle), so a plain `Arc` parent pointer is enough
//! — no arena or generational index is needed.

use crate::collections::HashMap;
use crate::value::Collection;
use std::sync::Arc;

/// Names a caller may never rebind once the root context is built.
const RESERVED_NAMES: &[&str] = &["context", "resource", "rootResource", "ucum"];

#[derive(Debug, Clone)]
struct Frame {
    parent: Option<Context>,
    input: Collection,
    focus: Collection,
    variables: HashMap<Box<str>, Collection>,
    system: HashMap<Box<str>, Collection>,
}

/// A scoped evaluation frame. Cheap to clone (one `Arc` bump); cloning two
/// `Context`s never aliases their *writes*, only the frames already frozen
/// by construction.
#[derive(Debug, Clone)]
pub struct Context(Arc<Frame>);

impl Context {
    /// Build a root context: `%context`, `%resource`, and `%rootResource` all
    /// start out equal to `input`, per the FHIRPath root-context convention.
    pub fn root(input: Collection) -> Self {
        let mut variables = HashMap::default();
        variables.insert("context".into(), input.clone());
        variables.insert("resource".into(), input.clone());
        variables.insert("rootResource".into(), input.clone());
        Self(Arc::new(Frame {
            parent: None,
            focus: input.clone(),
            input,
            variables,
            system: HashMap::default(),
        }))
    }

    pub fn input(&self) -> &Collection {
        &self.0.input
    }

    pub fn focus(&self) -> &Collection {
        &self.0.focus
    }

    /// A child frame with `input`/`focus` replaced; all variables and system
    /// variables are inherited unchanged. `focus` defaults to `input` when
    /// not given explicitly (the common case: navigation replaces both).
    pub fn with_input(&self, input: Collection, focus: Option<Collection>) -> Self {
        let focus = focus.unwrap_or_else(|| input.clone());
        Self(Arc::new(Frame {
            parent: Some(self.clone()),
            input,
            focus,
            variables: HashMap::default(),
            system: HashMap::default(),
        }))
    }

    /// An empty child frame, inheriting input/focus unchanged — the frame
    /// `defineVariable` and similar writers extend with one new binding.
    pub fn child(&self) -> Self {
        Self(Arc::new(Frame {
            parent: Some(self.clone()),
            input: self.0.input.clone(),
            focus: self.0.focus.clone(),
            variables: HashMap::default(),
            system: HashMap::default(),
        }))
    }

    /// A fresh iteration frame for one element of a `where`/`select`/`repeat`
    /// loop: `$this` and `$index` are rebound, input/focus narrow to the
    /// element. `$total`, if any, is inherited from the enclosing scope.
    pub fn with_iterator(&self, item: Collection, index: usize) -> Self {
        let mut system = HashMap::default();
        system.insert("this".into(), item.clone());
        system.insert("index".into(), Collection::singleton(crate::value::Value::Integer(index as i64)));
        Self(Arc::new(Frame {
            parent: Some(self.clone()),
            focus: item.clone(),
            input: item,
            variables: HashMap::default(),
            system,
        }))
    }

    /// Read a variable by name, with or without its leading `%`/`$` sigil,
    /// walking the parent chain until a frame defines it.
    pub fn get_variable(&self, name: &str) -> Option<Collection> {
        let name = name.trim_start_matches(['%', '$']);
        let mut frame = self;
        loop {
            if let Some(v) = frame.0.variables.get(name) {
                return Some(v.clone());
            }
            if let Some(v) = frame.0.system.get(name) {
                return Some(v.clone());
            }
            match &frame.0.parent {
                Some(parent) => frame = parent,
                None => return None,
            }
        }
    }

    /// Bind a user variable in a *new* child frame. Redefining an existing
    /// binding anywhere in the chain, or any [`RESERVED_NAMES`] entry, is a
    /// silent no-op that returns `self` unchanged — callers compare the
    /// returned context by reference to detect that (§4.7, §8.11).
    pub fn set_variable(&self, name: &str, value: Collection, allow_redefinition: bool) -> Self {
        let name = name.trim_start_matches(['%', '$']);
        if RESERVED_NAMES.contains(&name) {
            return self.clone();
        }
        if !allow_redefinition && self.get_variable(name).is_some() {
            return self.clone();
        }
        let mut child = self.child();
        Arc::make_mut(&mut child.0)
            .variables
            .insert(name.into(), value);
        child
    }

    /// Rebind a special iteration variable (`$this`/`$index`/`$total`) in a
    /// *new* child frame. Unlike [`Context::set_variable`] this always
    /// succeeds — iteration constructs own these variables outright.
    pub fn set_system_variable(&self, name: &str, value: Collection) -> Self {
        let name = name.trim_start_matches(['%', '$']);
        let mut child = self.child();
        Arc::make_mut(&mut child.0).system.insert(name.into(), value);
        child
    }

    pub fn total(&self) -> Option<Collection> {
        self.get_variable("total")
    }
}
