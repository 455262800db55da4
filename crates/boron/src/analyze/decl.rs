//! Declaration scanning and on-demand resolution.
//!
//! Scanning populates each import's declaration table and pre-allocates
//! container types so self-references through pointers resolve. Resolution
//! runs lazily with a per-declaration state machine; re-entering an
//! `InProgress` declaration is a dependency cycle.

use smallvec::SmallVec;

use crate::{
    analyze::{FnEntry, FnId, ResolveState},
    ast::{NodeId, NodeKind},
    imports::ImportId,
    intern::StringId,
    run::Compilation,
    scope::{ScopeId, Variable},
    types::{EnumField, FnParam, FnTypeId, StructField, TypeId, TypeKind, ERR_TAG_BITS},
    value::{ConstPayload, ConstVal},
};

/// Directive flags gathered from `#attribute(...)` / `#condition(...)`.
#[derive(Debug, Default, Clone, Copy)]
struct FnDirectives {
    is_naked: bool,
    is_cold: bool,
    is_test: bool,
    /// `#condition(false)` suppresses export.
    condition: bool,
}

impl Compilation {
    /// The declared name of a top-level declaration node, if it has one.
    pub fn decl_name(&self, node: NodeId) -> Option<StringId> {
        match self.ast.kind(node) {
            NodeKind::FnDef { proto, .. } | NodeKind::FnDecl { proto } => {
                match self.ast.kind(*proto) {
                    NodeKind::FnProto { name, .. } => Some(*name),
                    _ => None,
                }
            }
            NodeKind::VarDecl { name, .. }
            | NodeKind::StructDecl { name, .. }
            | NodeKind::EnumDecl { name, .. }
            | NodeKind::ErrorValueDecl { name, .. }
            | NodeKind::TypeAliasDecl { name, .. } => Some(*name),
            _ => None,
        }
    }

    /// Whether a top-level declaration is visible to `use` importers.
    pub fn decl_is_pub(&self, node: NodeId) -> bool {
        match self.ast.kind(node) {
            NodeKind::FnDef { proto, .. } | NodeKind::FnDecl { proto } => {
                matches!(self.ast.kind(*proto), NodeKind::FnProto { is_pub: true, .. })
            }
            NodeKind::VarDecl { is_pub, .. }
            | NodeKind::StructDecl { is_pub, .. }
            | NodeKind::EnumDecl { is_pub, .. }
            | NodeKind::ErrorValueDecl { is_pub, .. }
            | NodeKind::TypeAliasDecl { is_pub, .. }
            | NodeKind::UseDecl { is_pub, .. } => *is_pub,
            _ => false,
        }
    }

    /// Phase one: populate the import's declaration table.
    pub fn scan_import(&mut self, import: ImportId) {
        let Some(root) = self.imports.get(import).root else {
            return;
        };
        let scope = self.imports.get(import).scope.expect("import scope missing");
        let NodeKind::Root { decls } = self.ast.kind(root) else {
            return;
        };
        for decl in decls.clone() {
            self.scan_decl(scope, decl);
        }
    }

    fn scan_decl(&mut self, scope: ScopeId, decl: NodeId) {
        if let NodeKind::UseDecl { .. } = self.ast.kind(decl) {
            self.use_queue.push_back((scope, decl));
            return;
        }
        let Some(name) = self.decl_name(decl) else {
            return;
        };
        // containers get their type entry up front so pointers to them
        // resolve before the fields do
        match self.ast.kind(decl) {
            NodeKind::StructDecl { .. } => {
                let ty = self.types.new_struct(name, &self.interner);
                self.decl_types.insert(decl, ty);
                self.container_decls.insert(ty, decl);
            }
            NodeKind::EnumDecl { .. } => {
                let ty = self.types.new_enum(name, &self.interner);
                self.decl_types.insert(decl, ty);
                self.container_decls.insert(ty, decl);
            }
            _ => {}
        }
        if let Err(previous) = self.scopes.insert_decl(scope, name, decl) {
            let name_text = self.interner.get(name).to_owned();
            let idx = self.add_error(decl, format!("redefinition of '{name_text}'"));
            self.add_note(idx, previous, "previous definition is here".to_owned());
        }
    }

    /// Pulls the public declarations of a used namespace into `scope`.
    pub fn process_use_decl(&mut self, scope: ScopeId, node: NodeId) {
        let NodeKind::UseDecl { expr, .. } = self.ast.kind(node) else {
            return;
        };
        let expr = *expr;
        let ty = self.analyze_expression(expr, scope, None);
        if self.types.is_invalid(ty) {
            self.decl_states.insert(node, ResolveState::Invalid);
            return;
        }
        let Some(import) = self.expr_const(expr).and_then(ConstVal::as_import) else {
            self.add_error(node, "expected namespace".to_owned());
            self.decl_states.insert(node, ResolveState::Invalid);
            return;
        };
        let Some(source_scope) = self.imports.get(import).scope else {
            self.decl_states.insert(node, ResolveState::Invalid);
            return;
        };
        let exported: Vec<(StringId, NodeId)> = self
            .scopes
            .get(source_scope)
            .decls
            .iter()
            .map(|(&name, &decl)| (name, decl))
            .filter(|&(_, decl)| self.decl_is_pub(decl))
            .collect();
        for (name, decl) in exported {
            if let Err(previous) = self.scopes.insert_decl(scope, name, decl) {
                if previous != decl {
                    let name_text = self.interner.get(name).to_owned();
                    let idx = self.add_error(node, format!("import of '{name_text}' overrides existing definition"));
                    self.add_note(idx, previous, "previous definition is here".to_owned());
                    self.add_note(idx, decl, "imported definition is here".to_owned());
                }
            }
        }
        self.decl_states.insert(node, ResolveState::Ok);
    }

    /// On-demand declaration resolution with cycle detection.
    pub fn resolve_top_level_decl(&mut self, decl: NodeId) {
        match self.decl_states.get(&decl).copied().unwrap_or_default() {
            ResolveState::Ok | ResolveState::Invalid => return,
            ResolveState::InProgress => {
                let name = self
                    .decl_name(decl)
                    .map(|n| self.interner.get(n).to_owned())
                    .unwrap_or_else(|| "(anonymous)".to_owned());
                self.add_error(decl, format!("'{name}' depends on itself"));
                self.decl_states.insert(decl, ResolveState::Invalid);
                return;
            }
            ResolveState::Unresolved => {}
        }
        self.decl_states.insert(decl, ResolveState::InProgress);

        let ok = match self.ast.kind(decl) {
            NodeKind::FnDef { .. } | NodeKind::FnDecl { .. } => self.resolve_fn(decl),
            NodeKind::VarDecl { .. } => self.resolve_global_var(decl),
            NodeKind::StructDecl { .. } => self.resolve_struct(decl),
            NodeKind::EnumDecl { .. } => self.resolve_enum(decl),
            NodeKind::TypeAliasDecl { .. } => self.resolve_type_alias(decl),
            NodeKind::ErrorValueDecl { .. } => self.resolve_error_value(decl),
            NodeKind::UseDecl { .. } => true,
            _ => true,
        };

        // a nested error may have already flipped the state to Invalid
        if self.decl_states.get(&decl) == Some(&ResolveState::InProgress) {
            self.decl_states.insert(
                decl,
                if ok { ResolveState::Ok } else { ResolveState::Invalid },
            );
        }
    }

    /// Forces a container's layout; a container already being laid out has
    /// infinite size.
    pub fn ensure_container_complete(&mut self, ty: TypeId, ref_node: NodeId) -> bool {
        let canonical = self.types.canonical(ty);
        match self.types.kind(canonical) {
            TypeKind::Struct { complete: false, .. } | TypeKind::Enum { complete: false, .. } => {}
            TypeKind::Struct { invalid: true, .. } => return false,
            _ => return true,
        }
        if self.container_visit.contains(&canonical) {
            let name = self.types.name(canonical).to_owned();
            let kind_word = match self.types.kind(canonical) {
                TypeKind::Enum { .. } => "enum",
                _ => "struct",
            };
            self.add_error(ref_node, format!("{kind_word} '{name}' has infinite size"));
            self.types.mark_struct_invalid(canonical);
            return false;
        }
        if let Some(&decl) = self.container_decls.get(&canonical) {
            self.resolve_top_level_decl(decl);
        }
        !matches!(
            self.types.kind(canonical),
            TypeKind::Struct { invalid: true, .. }
        )
    }

    fn gather_fn_directives(&mut self, directives: &[NodeId], scope: ScopeId) -> FnDirectives {
        let mut out = FnDirectives {
            condition: true,
            ..FnDirectives::default()
        };
        for &directive in directives {
            let NodeKind::Directive { name, arg } = self.ast.kind(directive) else {
                continue;
            };
            let (name, arg) = (*name, *arg);
            match self.interner.get(name) {
                "attribute" => {
                    let Some(arg) = arg else {
                        self.add_error(directive, "expected attribute name".to_owned());
                        continue;
                    };
                    let ty = self.analyze_expression(arg, scope, None);
                    if self.types.is_invalid(ty) {
                        continue;
                    }
                    let attr = self
                        .expr_const(arg)
                        .and_then(|v| match &v.payload {
                            ConstPayload::Str(s) => Some(self.interner.get(*s).to_owned()),
                            _ => None,
                        });
                    match attr.as_deref() {
                        Some("naked") => out.is_naked = true,
                        Some("cold") => out.is_cold = true,
                        Some("test") => out.is_test = true,
                        Some(other) => {
                            let msg = format!("invalid function attribute: '{other}'");
                            self.add_error(arg, msg);
                        }
                        None => {
                            self.add_error(arg, "expected constant string".to_owned());
                        }
                    }
                }
                "condition" => {
                    let Some(arg) = arg else {
                        self.add_error(directive, "expected condition expression".to_owned());
                        continue;
                    };
                    let bool_ty = self.types.builtin.bool_;
                    let ty = self.analyze_expression(arg, scope, Some(bool_ty));
                    if self.types.is_invalid(ty) {
                        continue;
                    }
                    match self.expr_const(arg).and_then(ConstVal::as_bool) {
                        Some(value) => out.condition = value,
                        None => {
                            self.add_error(arg, "unable to evaluate constant expression".to_owned());
                        }
                    }
                }
                other => {
                    let msg = format!("invalid directive: '{other}'");
                    self.add_error(directive, msg);
                }
            }
        }
        out
    }

    fn resolve_fn(&mut self, decl: NodeId) -> bool {
        let (proto, def_body) = match self.ast.kind(decl) {
            NodeKind::FnDef { proto, body } => (*proto, Some(*body)),
            NodeKind::FnDecl { proto } => (*proto, None),
            _ => unreachable!("resolve_fn on non-fn"),
        };
        let NodeKind::FnProto {
            name,
            params,
            return_type,
            is_extern,
            is_inline,
            is_export,
            is_var_args,
            directives,
            ..
        } = self.ast.kind(proto)
        else {
            return false;
        };
        let name = *name;
        let params: SmallVec<[NodeId; 4]> = params.clone();
        let return_type = *return_type;
        let (is_extern, is_inline, mut is_export, is_var_args) =
            (*is_extern, *is_inline, *is_export, *is_var_args);
        let directives: SmallVec<[NodeId; 1]> = directives.clone();

        let import = self.ast.import_of(decl);
        let scope = self.imports.get(import).scope.expect("import scope missing");
        let dirs = self.gather_fn_directives(&directives, scope);
        if !dirs.condition {
            is_export = false;
        }
        if is_var_args && !is_extern {
            self.add_error(proto, "variadic parameters only allowed in extern functions".to_owned());
        }

        let mut ok = true;
        let mut fn_params = Vec::with_capacity(params.len());
        for &param in &params {
            let NodeKind::ParamDecl { ty, is_noalias, .. } = self.ast.kind(param) else {
                continue;
            };
            let (ty_node, is_noalias) = (*ty, *is_noalias);
            let param_ty = self.analyze_type_expr(ty_node, scope);
            if self.types.is_invalid(param_ty) {
                ok = false;
            } else if self.types.canonical(param_ty) == self.types.builtin.unreachable_ {
                self.add_error(ty_node, "parameter of type 'unreachable' not allowed".to_owned());
                ok = false;
            } else {
                self.ensure_container_complete(param_ty, ty_node);
            }
            fn_params.push(FnParam {
                ty: param_ty,
                is_noalias,
            });
        }

        let ret_ty = match return_type {
            Some(node) => {
                let ty = self.analyze_type_expr(node, scope);
                if !self.types.is_invalid(ty) {
                    self.ensure_container_complete(ty, node);
                }
                ty
            }
            None => self.types.builtin.void,
        };
        if self.types.is_invalid(ret_ty) {
            ok = false;
        }

        let fn_type = self.types.get_fn(FnTypeId {
            is_extern,
            is_naked: dirs.is_naked,
            is_cold: dirs.is_cold,
            is_var_args,
            params: fn_params,
            return_type: ret_ty,
        });

        let symbol_name = self.interner.get(name).to_owned();
        let fn_id = FnId::new(self.fns.len());
        let internal_linkage = !is_export && !is_extern && symbol_name != "main";
        self.fns.push(FnEntry {
            symbol_name,
            import,
            proto_node: proto,
            def_node: def_body.map(|_| decl),
            body_node: def_body,
            fn_type,
            is_extern,
            is_inline,
            is_test: dirs.is_test,
            is_cold: dirs.is_cold,
            is_naked: dirs.is_naked,
            is_export,
            internal_linkage,
            body_scope: None,
            variables: Vec::new(),
            fn_value: None,
        });
        self.proto_fns.insert(proto, fn_id);
        if def_body.is_some() {
            // test functions only run in test builds
            if !dirs.is_test || self.config.is_test {
                self.fn_defs.push(fn_id);
            }
        }
        ok
    }

    fn resolve_global_var(&mut self, decl: NodeId) -> bool {
        let NodeKind::VarDecl {
            name,
            is_const,
            is_export,
            ty,
            init,
            ..
        } = self.ast.kind(decl)
        else {
            return false;
        };
        let name = *name;
        let (is_const, is_export) = (*is_const, *is_export);
        let (ty, init) = (*ty, *init);
        let import = self.ast.import_of(decl);
        let scope = self.imports.get(import).scope.expect("import scope missing");

        let (var_ty, const_val) = self.analyze_var_decl_parts(decl, scope, ty, init, is_const, true);
        if self.types.is_invalid(var_ty) {
            self.decl_vars_insert_invalid(decl, name, var_ty, scope, is_const);
            return false;
        }
        if is_export && const_val.is_none() {
            self.add_error(decl, "exported variable must be constant".to_owned());
        }
        let var = self.scopes.add_variable(Variable {
            name,
            ty: var_ty,
            is_const,
            decl_node: decl,
            scope,
            src_arg_index: None,
            gen_arg_index: None,
        });
        self.decl_vars.insert(decl, var);
        self.decl_const.insert(decl, const_val);
        true
    }

    fn decl_vars_insert_invalid(
        &mut self,
        decl: NodeId,
        name: StringId,
        ty: TypeId,
        scope: ScopeId,
        is_const: bool,
    ) {
        let var = self.scopes.add_variable(Variable {
            name,
            ty,
            is_const,
            decl_node: decl,
            scope,
            src_arg_index: None,
            gen_arg_index: None,
        });
        self.decl_vars.insert(decl, var);
        self.decl_const.insert(decl, None);
    }

    /// Shared typing logic for global and local variable declarations.
    /// Returns the variable's type and constant value (if any).
    pub fn analyze_var_decl_parts(
        &mut self,
        decl: NodeId,
        scope: ScopeId,
        ty: Option<NodeId>,
        init: Option<NodeId>,
        is_const: bool,
        is_global: bool,
    ) -> (TypeId, Option<ConstVal>) {
        let invalid = self.types.builtin.invalid;
        let explicit = ty.map(|node| self.analyze_type_expr(node, scope));
        if explicit == Some(invalid) {
            return (invalid, None);
        }

        let Some(init) = init else {
            self.add_error(decl, "variables must be initialized".to_owned());
            return (invalid, None);
        };
        let init_ty = self.analyze_expression(init, scope, explicit);
        if self.types.is_invalid(init_ty) {
            return (invalid, None);
        }
        let var_ty = explicit.unwrap_or(init_ty);
        let canonical = self.types.canonical(var_ty);

        if canonical == self.types.builtin.unreachable_ {
            self.add_error(decl, "variable of type 'unreachable' not allowed".to_owned());
            return (invalid, None);
        }
        let is_num_lit = matches!(
            self.types.kind(canonical),
            TypeKind::NumLitInt | TypeKind::NumLitFloat
        );
        // an unsized literal can back a `const` (it stays a compile-time
        // value with no storage) but never a runtime variable
        if (is_num_lit && !is_const) || matches!(self.types.kind(canonical), TypeKind::UndefLit) {
            let name = self.types.name(var_ty).to_owned();
            self.add_error(decl, format!("unable to infer variable type from '{name}'"));
            return (invalid, None);
        }
        let const_val = self.expr_const(init).cloned();
        if is_num_lit && const_val.is_none() {
            self.add_error(init, "unable to evaluate constant expression".to_owned());
            return (invalid, None);
        }
        if canonical == self.types.builtin.meta_type && !is_const {
            self.add_error(decl, "variable of type 'type' must be constant".to_owned());
            return (invalid, None);
        }
        if is_global && const_val.is_none() {
            self.add_error(init, "unable to evaluate constant expression".to_owned());
            return (invalid, None);
        }
        if !self.types.is_invalid(var_ty) {
            self.ensure_container_complete(var_ty, decl);
        }
        // the value is kept for non-const globals too: it is the emitted
        // initializer. Symbol resolution only folds it for `const`.
        (var_ty, const_val)
    }

    fn resolve_struct(&mut self, decl: NodeId) -> bool {
        let NodeKind::StructDecl { fields, .. } = self.ast.kind(decl) else {
            return false;
        };
        let fields = fields.clone();
        let ty = *self.decl_types.get(&decl).expect("struct type not pre-allocated");
        let import = self.ast.import_of(decl);
        let scope = self.imports.get(import).scope.expect("import scope missing");

        self.container_visit.insert(ty);
        let mut ok = true;
        let mut struct_fields = Vec::with_capacity(fields.len());
        for (src_index, &field) in fields.iter().enumerate() {
            let NodeKind::ContainerField { name, ty: field_ty } = self.ast.kind(field) else {
                continue;
            };
            let name = *name;
            let Some(field_ty_node) = *field_ty else {
                self.add_error(field, "struct field requires a type".to_owned());
                ok = false;
                continue;
            };
            let field_type = self.analyze_type_expr(field_ty_node, scope);
            if self.types.is_invalid(field_type) {
                ok = false;
            } else if !self.ensure_container_complete(field_type, field) {
                ok = false;
            }
            struct_fields.push(StructField {
                name,
                ty: field_type,
                src_index,
                gen_index: None,
                offset: 0,
            });
        }
        self.container_visit.remove(&ty);

        if matches!(self.types.kind(ty), TypeKind::Struct { invalid: true, .. }) {
            // an inner reference already reported infinite size
            return false;
        }
        if ok {
            self.types.complete_struct(ty, struct_fields);
        } else {
            self.types.mark_struct_invalid(ty);
        }
        ok
    }

    fn resolve_enum(&mut self, decl: NodeId) -> bool {
        let NodeKind::EnumDecl { fields, .. } = self.ast.kind(decl) else {
            return false;
        };
        let fields = fields.clone();
        let ty = *self.decl_types.get(&decl).expect("enum type not pre-allocated");
        let import = self.ast.import_of(decl);
        let scope = self.imports.get(import).scope.expect("import scope missing");

        self.container_visit.insert(ty);
        let mut ok = true;
        let mut enum_fields = Vec::with_capacity(fields.len());
        for (index, &field) in fields.iter().enumerate() {
            let NodeKind::ContainerField { name, ty: field_ty } = self.ast.kind(field) else {
                continue;
            };
            let name = *name;
            let payload = match *field_ty {
                Some(node) => {
                    let payload_ty = self.analyze_type_expr(node, scope);
                    if self.types.is_invalid(payload_ty) {
                        ok = false;
                    } else if !self.ensure_container_complete(payload_ty, field) {
                        ok = false;
                    }
                    payload_ty
                }
                None => self.types.builtin.void,
            };
            enum_fields.push(EnumField {
                name,
                ty: payload,
                value: index as u64,
            });
        }
        self.container_visit.remove(&ty);
        self.types.complete_enum(ty, enum_fields);
        ok
    }

    fn resolve_type_alias(&mut self, decl: NodeId) -> bool {
        let NodeKind::TypeAliasDecl { name, ty, .. } = self.ast.kind(decl) else {
            return false;
        };
        let (name, ty_node) = (*name, *ty);
        let import = self.ast.import_of(decl);
        let scope = self.imports.get(import).scope.expect("import scope missing");
        let child = self.analyze_type_expr(ty_node, scope);
        if self.types.is_invalid(child) {
            return false;
        }
        let alias = self.types.get_typedecl(name, child, &self.interner);
        self.decl_types.insert(decl, alias);
        true
    }

    fn resolve_error_value(&mut self, decl: NodeId) -> bool {
        let NodeKind::ErrorValueDecl { name, .. } = self.ast.kind(decl) else {
            return false;
        };
        let name = *name;
        // deduplicated by name across the whole build
        if let Some(entry) = self.error_values.get(&name) {
            let value = entry.value;
            self.decl_const.insert(
                decl,
                Some(ConstVal::new(ConstPayload::Err { tag: value, payload: None })),
            );
            return true;
        }
        let value = self.error_values.len() as u64 + 1;
        let max = (1u64 << ERR_TAG_BITS) - 1;
        if value > max {
            self.add_error(decl, format!("too many error values (limit {max})"));
            return false;
        }
        self.error_values.insert(
            name,
            crate::analyze::ErrorValueEntry {
                name,
                value,
                decl_node: decl,
            },
        );
        self.decl_const.insert(
            decl,
            Some(ConstVal::new(ConstPayload::Err { tag: value, payload: None })),
        );
        true
    }
}
