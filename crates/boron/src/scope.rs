//! The scope graph.
//!
//! Scopes nest by parent id and are stored in one central arena, so name
//! lookup is an index walk rather than pointer chasing. A scope is entered
//! at function definitions, blocks, loop and switch bodies, defer bodies,
//! pattern bindings, container declarations, and c-import blocks.

use indexmap::IndexMap;

use crate::{
    analyze::FnId,
    ast::NodeId,
    imports::ImportId,
    intern::StringId,
    types::TypeId,
};

/// Handle into the scope arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

impl ScopeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle into the variable arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(u32);

impl VarId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A declared variable (local, global, or parameter).
#[derive(Debug)]
pub struct Variable {
    pub name: StringId,
    pub ty: TypeId,
    pub is_const: bool,
    pub decl_node: NodeId,
    pub scope: ScopeId,
    /// Parameter index in the source signature, for parameters.
    pub src_arg_index: Option<u32>,
    /// Parameter index in the generated signature; differs from the source
    /// index when zero-bit parameters are dropped or an sret slot is added.
    pub gen_arg_index: Option<u32>,
}

#[derive(Debug)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    /// The AST node that opened this scope.
    pub node: NodeId,
    pub import: ImportId,
    /// Top-level declarations by name; values are decl AST nodes.
    pub decls: IndexMap<StringId, NodeId>,
    pub vars: IndexMap<StringId, VarId>,
    /// Nearest enclosing loop, for `break`/`continue`.
    pub parent_loop: Option<NodeId>,
    /// Defer statements registered in this scope, in source order.
    pub defers: Vec<NodeId>,
    /// The function whose body contains this scope, if any.
    pub fn_entry: Option<FnId>,
    /// Set on branches the emitter must skip (untaken compile-var folds).
    pub codegen_excluded: bool,
    /// Collected `@c_include` lines when inside a `@c_import` block.
    pub c_import_buffer: Option<String>,
}

/// Central store of all scopes and variables.
#[derive(Debug, Default)]
pub struct ScopeGraph {
    scopes: Vec<Scope>,
    variables: Vec<Variable>,
}

impl ScopeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_scope(&mut self, parent: Option<ScopeId>, node: NodeId, import: ImportId) -> ScopeId {
        let (parent_loop, fn_entry) = match parent {
            Some(parent_id) => {
                let parent_scope = self.get(parent_id);
                (parent_scope.parent_loop, parent_scope.fn_entry)
            }
            None => (None, None),
        };
        let id = ScopeId(u32::try_from(self.scopes.len()).expect("scope arena overflow"));
        self.scopes.push(Scope {
            parent,
            node,
            import,
            decls: IndexMap::new(),
            vars: IndexMap::new(),
            parent_loop,
            defers: Vec::new(),
            fn_entry,
            codegen_excluded: false,
            c_import_buffer: None,
        });
        id
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.index()]
    }

    pub fn var(&self, id: VarId) -> &Variable {
        &self.variables[id.index()]
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.variables[id.index()]
    }

    pub fn add_variable(&mut self, variable: Variable) -> VarId {
        let id = VarId(u32::try_from(self.variables.len()).expect("variable arena overflow"));
        let scope = variable.scope;
        let name = variable.name;
        self.variables.push(variable);
        self.get_mut(scope).vars.insert(name, id);
        id
    }

    /// Inserts a declaration; on a duplicate name returns the previous
    /// declaration node so the caller can attach a note.
    pub fn insert_decl(&mut self, scope: ScopeId, name: StringId, node: NodeId) -> Result<(), NodeId> {
        match self.get_mut(scope).decls.entry(name) {
            indexmap::map::Entry::Occupied(entry) => Err(*entry.get()),
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(node);
                Ok(())
            }
        }
    }

    /// Name lookup through the ancestor chain: variables shadow
    /// declarations in the same walk.
    pub fn find_var(&self, scope: ScopeId, name: StringId) -> Option<VarId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let entry = self.get(id);
            if let Some(&var) = entry.vars.get(&name) {
                return Some(var);
            }
            current = entry.parent;
        }
        None
    }

    pub fn find_decl(&self, scope: ScopeId, name: StringId) -> Option<NodeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let entry = self.get(id);
            if let Some(&decl) = entry.decls.get(&name) {
                return Some(decl);
            }
            current = entry.parent;
        }
        None
    }

    /// Nearest enclosing loop node visible from `scope`.
    pub fn enclosing_loop(&self, scope: ScopeId) -> Option<NodeId> {
        self.get(scope).parent_loop
    }

    /// Collects the scope chain from `inner` outward, innermost first,
    /// stopping at the function boundary. Used for defer unwinding.
    pub fn chain_to_fn(&self, inner: ScopeId) -> Vec<ScopeId> {
        let mut out = Vec::new();
        let mut current = Some(inner);
        while let Some(id) = current {
            let scope = self.get(id);
            if scope.fn_entry.is_none() {
                break;
            }
            out.push(id);
            current = scope.parent;
        }
        out
    }
}
