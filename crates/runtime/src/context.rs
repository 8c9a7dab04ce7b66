//! Context (C5): a stack of scopes, the interpreter's dynamic environment.
//!
//! Grounded on `examples/original_source/include/teascript/Dialect.hpp` for
//! the exact default `Dialect` values, and on the teacher's (navicore-cem3)
//! habit of a small, explicitly constructed config struct threaded through
//! the interpreter entry points rather than living behind a global.

use crate::value::Value;
use std::collections::{HashMap, VecDeque};
use teascript_core::{ErrorKind, SourceLocation, TeaError};

/// Grammar/parameter-binding toggles that select a TeaScript dialect
/// (§9 Glossary). Field defaults are the *official* TeaScript language, as
/// pinned by the original C++ library's `Dialect.hpp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    /// Reading an unknown identifier implicitly defines it instead of
    /// raising `unknown_identifier`. Unofficial/untested upstream; off by
    /// default.
    pub auto_define_unknown_identifiers: bool,
    /// `undef` of a name that isn't bound is a no-op rather than an error.
    pub undefine_unknown_identifiers_allowed: bool,
    /// `def x` without `:=`/`@=` is accepted (binds `x` to `NaV`).
    /// Upstream marks this unsupported; we keep it off.
    pub declare_identifiers_without_assign_allowed: bool,
    /// Function parameters are `const` unless declared otherwise.
    pub parameters_are_default_const: bool,
    /// Function parameters are passed by shared reference (`@=`) unless
    /// declared otherwise.
    pub parameters_are_default_shared: bool,
    /// An explicit `@=` parameter with no `def`/`const` inherits the
    /// constness of its caller-side argument.
    pub shared_parameters_are_default_auto: bool,
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect {
            auto_define_unknown_identifiers: false,
            undefine_unknown_identifiers_allowed: true,
            declare_identifiers_without_assign_allowed: false,
            parameters_are_default_const: true,
            parameters_are_default_shared: true,
            shared_parameters_are_default_auto: true,
        }
    }
}

/// Insertion-ordered name -> `Value` map with unique keys (one per scope).
#[derive(Debug, Default)]
struct VariableCollection {
    order: Vec<String>,
    map: HashMap<String, Value>,
}

impl VariableCollection {
    fn add(&mut self, name: String, value: Value) -> Result<(), ()> {
        if self.map.contains_key(&name) {
            return Err(());
        }
        self.order.push(name.clone());
        self.map.insert(name, value);
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Option<Value> {
        let removed = self.map.remove(name);
        if removed.is_some() {
            self.order.retain(|n| n != name);
        }
        removed
    }

    fn get(&self, name: &str) -> Option<&Value> {
        self.map.get(name)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.map.get_mut(name)
    }
}

/// One frame of the `Context` stack: bindings, a FIFO parameter queue
/// (§4.5), and a source-location breadcrumb for error reporting.
struct Scope {
    vars: VariableCollection,
    params: VecDeque<Value>,
    breadcrumb: SourceLocation,
}

impl Scope {
    fn new() -> Self {
        Scope { vars: VariableCollection::default(), params: VecDeque::new(), breadcrumb: SourceLocation::synthetic() }
    }
}

pub struct Context {
    scopes: Vec<Scope>,
    pub dialect: Dialect,
    bootstrap_complete: bool,
}

impl Context {
    pub fn new(dialect: Dialect) -> Self {
        Context { scopes: vec![Scope::new()], dialect, bootstrap_complete: false }
    }

    /// Called once the core-library loader (C11) finishes; latches the
    /// `_`-prefix protection so user code can no longer shadow internals.
    pub fn latch_bootstrap(&mut self) {
        self.bootstrap_complete = true;
    }

    pub fn bootstrap_complete(&self) -> bool {
        self.bootstrap_complete
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn set_breadcrumb(&mut self, loc: SourceLocation) {
        if let Some(top) = self.scopes.last_mut() {
            top.breadcrumb = loc;
        }
    }

    pub fn breadcrumb(&self) -> SourceLocation {
        self.scopes.last().map(|s| s.breadcrumb).unwrap_or_else(SourceLocation::synthetic)
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(Scope::new());
    }

    /// Balanced exit. Purges the parameter queue and all locals of the
    /// exited scope on every exit path (the caller always reaches this
    /// through `Drop` of `ScopeGuard`, including error unwinding). The
    /// bottom (global) scope can never be exited.
    pub fn exit_scope(&mut self) -> Result<(), TeaError> {
        if self.scopes.len() <= 1 {
            return Err(TeaError::new(ErrorKind::RuntimeError, self.breadcrumb(), "cannot exit the global scope"));
        }
        self.scopes.pop();
        Ok(())
    }

    /// RAII guard: acquires a scope now, releases it on every exit path.
    pub fn enter_scope_guarded(&mut self) -> ScopeGuard<'_> {
        self.enter_scope();
        ScopeGuard { ctx: self }
    }

    fn is_internal_name(name: &str) -> bool {
        name.starts_with('_')
    }

    /// `add(name, value)`: appends to the current scope. Fails with
    /// `redefinition` if `name` is already bound in that scope, or with
    /// `internal_name` if user code tries to define a `_`-prefixed name
    /// after bootstrap has latched.
    pub fn add(&mut self, name: impl Into<String>, value: Value, loc: SourceLocation) -> Result<(), TeaError> {
        let name = name.into();
        if self.bootstrap_complete && Self::is_internal_name(&name) {
            return Err(TeaError::new(ErrorKind::InternalName, loc, format!("'{name}' is reserved for the core library")));
        }
        let top = self.scopes.last_mut().expect("scope stack is never empty");
        top.vars.add(name.clone(), value).map_err(|_| TeaError::new(ErrorKind::RedefinitionOfVariable, loc, format!("'{name}' is already defined in this scope")))
    }

    /// `find(name)`: local scopes top-down, then global. Names starting
    /// with `_` skip local scopes entirely — they are always global-only.
    pub fn find(&self, name: &str) -> Option<&Value> {
        if Self::is_internal_name(name) {
            return self.scopes.first().and_then(|g| g.vars.get(name));
        }
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.vars.get(name) {
                return Some(v);
            }
        }
        None
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Value> {
        if Self::is_internal_name(name) {
            return self.scopes.first_mut().and_then(|g| g.vars.get_mut(name));
        }
        for scope in self.scopes.iter_mut().rev() {
            if scope.vars.get(name).is_some() {
                return scope.vars.get_mut(name);
            }
        }
        None
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// `assign(name, value, shared)`: walks scopes, mutates the existing
    /// cell. Missing -> `unknown_identifier`.
    pub fn assign(&mut self, name: &str, value: &Value, shared: bool, loc: SourceLocation) -> Result<(), TeaError> {
        let slot = self
            .find_mut(name)
            .ok_or_else(|| TeaError::new(ErrorKind::UnknownIdentifier, loc, format!("unknown identifier '{name}'")))?;
        if shared {
            slot.shared_assign(value, loc)
        } else {
            slot.assign(value, loc)
        }
    }

    /// `remove(name)`: current scope only. Missing -> `unknown_identifier`,
    /// unless the dialect allows undef-of-unknown.
    pub fn remove(&mut self, name: &str, loc: SourceLocation) -> Result<(), TeaError> {
        let top = self.scopes.last_mut().expect("scope stack is never empty");
        if top.vars.remove(name).is_some() {
            Ok(())
        } else if self.dialect.undefine_unknown_identifiers_allowed {
            Ok(())
        } else {
            Err(TeaError::new(ErrorKind::UnknownIdentifier, loc, format!("unknown identifier '{name}'")))
        }
    }

    pub fn set_param_list(&mut self, values: Vec<Value>) {
        let top = self.scopes.last_mut().expect("scope stack is never empty");
        top.params = values.into();
    }

    pub fn consume_param(&mut self, loc: SourceLocation) -> Result<Value, TeaError> {
        let top = self.scopes.last_mut().expect("scope stack is never empty");
        top.params.pop_front().ok_or_else(|| TeaError::new(ErrorKind::RuntimeError, loc, "parameter queue underflow"))
    }

    pub fn param_count(&self) -> usize {
        self.scopes.last().map(|s| s.params.len()).unwrap_or(0)
    }

    /// Drops every scope but the global one (§4.9 `reset()` contract) and
    /// clears its parameter queue. Bindings already in the global scope
    /// (core library, host `add_var`/`add_const`) survive untouched.
    pub fn truncate_to_global(&mut self) {
        self.scopes.truncate(1);
        let global = &mut self.scopes[0];
        global.params.clear();
    }
}

/// Guard returned by [`Context::enter_scope_guarded`]. Calls
/// `exit_scope` on drop, so the scope is released on every exit path:
/// normal return, an error propagating with `?`, or a control-flow signal
/// unwinding through it.
pub struct ScopeGuard<'a> {
    ctx: &'a mut Context,
}

impl<'a> ScopeGuard<'a> {
    pub fn ctx(&mut self) -> &mut Context {
        self.ctx
    }
}

impl<'a> Drop for ScopeGuard<'a> {
    fn drop(&mut self) {
        let _ = self.ctx.exit_scope();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Data;

    #[test]
    fn lookup_walks_local_then_global() {
        let mut ctx = Context::new(Dialect::default());
        ctx.add("g", Value::new(Data::I64(1)), SourceLocation::synthetic()).unwrap();
        ctx.enter_scope();
        ctx.add("l", Value::new(Data::I64(2)), SourceLocation::synthetic()).unwrap();
        assert!(ctx.find("g").is_some());
        assert!(ctx.find("l").is_some());
        ctx.exit_scope().unwrap();
        assert!(ctx.find("l").is_none());
    }

    #[test]
    fn underscore_names_skip_local_scopes() {
        let mut ctx = Context::new(Dialect::default());
        ctx.add("_internal", Value::new(Data::I64(1)), SourceLocation::synthetic()).unwrap();
        ctx.enter_scope();
        // shadow attempt in a local scope is a distinct binding, but find()
        // must still resolve to the global one because of the `_` prefix.
        assert!(ctx.find("_internal").is_some());
        assert_eq!(ctx.find("_internal").unwrap().get_as_integer(SourceLocation::synthetic()).unwrap(), 1);
    }

    #[test]
    fn internal_name_rejected_after_bootstrap_latches() {
        let mut ctx = Context::new(Dialect::default());
        ctx.latch_bootstrap();
        let err = ctx.add("_x", Value::new(Data::I64(1)), SourceLocation::synthetic()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InternalName);
    }

    #[test]
    fn param_queue_underflow_is_an_error() {
        let mut ctx = Context::new(Dialect::default());
        assert!(ctx.consume_param(SourceLocation::synthetic()).is_err());
    }

    #[test]
    fn scope_guard_purges_params_on_drop() {
        let mut ctx = Context::new(Dialect::default());
        {
            let mut guard = ctx.enter_scope_guarded();
            guard.ctx().set_param_list(vec![Value::new(Data::I64(1))]);
            assert_eq!(guard.ctx().param_count(), 1);
        }
        assert_eq!(ctx.scope_depth(), 1);
    }

    #[test]
    fn cannot_exit_global_scope() {
        let mut ctx = Context::new(Dialect::default());
        assert!(ctx.exit_scope().is_err());
    }
}
