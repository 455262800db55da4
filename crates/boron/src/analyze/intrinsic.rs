//! The `@name(...)` compile-time builtins.

use std::str::FromStr;

use crate::{
    analyze::{CompileVar, Intrinsic},
    ast::NodeId,
    bignum::BigNum,
    intern::StringId,
    run::Compilation,
    scope::ScopeId,
    types::{TypeId, TypeKind},
    value::{ConstPayload, ConstVal},
};

impl Compilation {
    pub(crate) fn analyze_intrinsic(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        name: StringId,
        args: &[NodeId],
        expected: Option<TypeId>,
    ) -> TypeId {
        let text = self.interner.get(name).to_owned();
        let Ok(intrinsic) = Intrinsic::from_str(&text) else {
            return self.intrinsic_error(node, scope, format!("invalid builtin function: '{text}'"));
        };
        let arity: &[usize] = match intrinsic {
            Intrinsic::Sizeof
            | Intrinsic::Alignof
            | Intrinsic::MinValue
            | Intrinsic::MaxValue
            | Intrinsic::MemberCount
            | Intrinsic::Typeof
            | Intrinsic::CompileVar
            | Intrinsic::ConstEval
            | Intrinsic::Import
            | Intrinsic::CImport
            | Intrinsic::CInclude
            | Intrinsic::CDefine
            | Intrinsic::CUndef => &[1],
            Intrinsic::Ctz | Intrinsic::Clz => &[2],
            Intrinsic::Memcpy | Intrinsic::Memset => &[3],
            Intrinsic::AddWithOverflow | Intrinsic::SubWithOverflow | Intrinsic::MulWithOverflow => {
                &[4]
            }
        };
        if !arity.contains(&args.len()) {
            return self.intrinsic_error(
                node,
                scope,
                format!("expected {} arguments, got {}", arity[0], args.len()),
            );
        }

        match intrinsic {
            Intrinsic::Sizeof | Intrinsic::Alignof => {
                let target = self.analyze_type_expr(args[0], scope);
                if self.types.is_invalid(target) {
                    return self.intrinsic_invalid(node, scope);
                }
                self.ensure_container_complete(target, node);
                let entry = self.types.get(target);
                let value = if intrinsic == Intrinsic::Sizeof {
                    entry.abi_size
                } else {
                    entry.abi_align
                };
                let ty = self.types.builtin.num_lit_int;
                self.decorate(node, scope, ty, Some(ConstVal::num(BigNum::from_u64(value))), None)
            }
            Intrinsic::MinValue | Intrinsic::MaxValue => {
                let target = self.analyze_type_expr(args[0], scope);
                if self.types.is_invalid(target) {
                    return self.intrinsic_invalid(node, scope);
                }
                let canonical = self.types.canonical(target);
                let TypeKind::Int { is_signed, bits } = *self.types.kind(canonical) else {
                    let type_name = self.types.name(target).to_owned();
                    return self.intrinsic_error(
                        node,
                        scope,
                        format!("no min/max value available for type '{type_name}'"),
                    );
                };
                let value = match (intrinsic, is_signed) {
                    (Intrinsic::MaxValue, false) => {
                        BigNum::Int((num_bigint::BigInt::from(1) << bits) - 1)
                    }
                    (Intrinsic::MaxValue, true) => {
                        BigNum::Int((num_bigint::BigInt::from(1) << (bits - 1)) - 1)
                    }
                    (Intrinsic::MinValue, false) => BigNum::from_u64(0),
                    (Intrinsic::MinValue, true) => {
                        BigNum::Int(-(num_bigint::BigInt::from(1) << (bits - 1)))
                    }
                    _ => unreachable!(),
                };
                let ty = self.types.builtin.num_lit_int;
                self.decorate(node, scope, ty, Some(ConstVal::num(value)), None)
            }
            Intrinsic::MemberCount => {
                let target = self.analyze_type_expr(args[0], scope);
                if self.types.is_invalid(target) {
                    return self.intrinsic_invalid(node, scope);
                }
                self.ensure_container_complete(target, node);
                let canonical = self.types.canonical(target);
                let count = match self.types.kind(canonical) {
                    TypeKind::Enum { fields, .. } => fields.len() as u64,
                    TypeKind::Struct { fields, .. } => fields.len() as u64,
                    _ => {
                        let type_name = self.types.name(target).to_owned();
                        return self.intrinsic_error(
                            node,
                            scope,
                            format!("no member count available for type '{type_name}'"),
                        );
                    }
                };
                let ty = self.types.builtin.num_lit_int;
                self.decorate(node, scope, ty, Some(ConstVal::num(BigNum::from_u64(count))), None)
            }
            Intrinsic::Typeof => {
                let arg_ty = self.analyze_expression(args[0], scope, None);
                if self.types.is_invalid(arg_ty) {
                    return self.intrinsic_invalid(node, scope);
                }
                let meta = self.types.builtin.meta_type;
                self.decorate(node, scope, meta, Some(ConstVal::type_(arg_ty)), None)
            }
            Intrinsic::AddWithOverflow | Intrinsic::SubWithOverflow | Intrinsic::MulWithOverflow => {
                let target = self.analyze_type_expr(args[0], scope);
                if self.types.is_invalid(target) {
                    return self.intrinsic_invalid(node, scope);
                }
                let canonical = self.types.canonical(target);
                if !matches!(self.types.kind(canonical), TypeKind::Int { .. }) {
                    let type_name = self.types.name(target).to_owned();
                    return self.intrinsic_error(
                        node,
                        scope,
                        format!("expected integer type, got '{type_name}'"),
                    );
                }
                self.analyze_expression(args[1], scope, Some(target));
                self.analyze_expression(args[2], scope, Some(target));
                let out_ptr = self.types.get_pointer(target, false);
                self.analyze_expression(args[3], scope, Some(out_ptr));
                let bool_ty = self.types.builtin.bool_;
                self.decorate(node, scope, bool_ty, None, None)
            }
            Intrinsic::Memcpy => {
                let u8_ty = self.types.builtin.u8_;
                let dest_ty = self.types.get_pointer(u8_ty, false);
                let src_ty = self.types.get_pointer(u8_ty, true);
                let usize_ty = self.types.builtin.usize_;
                self.analyze_expression(args[0], scope, Some(dest_ty));
                self.analyze_expression(args[1], scope, Some(src_ty));
                self.analyze_expression(args[2], scope, Some(usize_ty));
                let void = self.types.builtin.void;
                self.decorate(node, scope, void, None, None)
            }
            Intrinsic::Memset => {
                let u8_ty = self.types.builtin.u8_;
                let dest_ty = self.types.get_pointer(u8_ty, false);
                let usize_ty = self.types.builtin.usize_;
                self.analyze_expression(args[0], scope, Some(dest_ty));
                self.analyze_expression(args[1], scope, Some(u8_ty));
                self.analyze_expression(args[2], scope, Some(usize_ty));
                let void = self.types.builtin.void;
                self.decorate(node, scope, void, None, None)
            }
            Intrinsic::Ctz | Intrinsic::Clz => {
                let target = self.analyze_type_expr(args[0], scope);
                if self.types.is_invalid(target) {
                    return self.intrinsic_invalid(node, scope);
                }
                let canonical = self.types.canonical(target);
                let TypeKind::Int { bits, .. } = *self.types.kind(canonical) else {
                    let type_name = self.types.name(target).to_owned();
                    return self.intrinsic_error(
                        node,
                        scope,
                        format!("expected integer type, got '{type_name}'"),
                    );
                };
                self.analyze_expression(args[1], scope, Some(target));
                let const_val = (|| {
                    let value = self.expr_const(args[1])?;
                    let dep = value.depends_on_compile_var;
                    let pattern = value.as_num()?.to_twos_complement(bits);
                    let count = if intrinsic == Intrinsic::Ctz {
                        if pattern == 0 {
                            u64::from(bits)
                        } else {
                            u64::from(pattern.trailing_zeros())
                        }
                    } else if pattern == 0 {
                        u64::from(bits)
                    } else {
                        u64::from(bits) - u64::from(64 - pattern.leading_zeros())
                    };
                    let mut out = ConstVal::num(BigNum::from_u64(count));
                    out.depends_on_compile_var = dep;
                    Some(out)
                })();
                self.decorate(node, scope, target, const_val, None)
            }
            Intrinsic::CompileVar => self.analyze_compile_var(node, scope, args[0]),
            Intrinsic::ConstEval => {
                let arg_ty = self.analyze_expression(args[0], scope, expected);
                if self.types.is_invalid(arg_ty) {
                    return self.intrinsic_invalid(node, scope);
                }
                let const_val = self.expr_const(args[0]).cloned();
                if const_val.is_none() {
                    return self.intrinsic_error(
                        node,
                        scope,
                        "unable to evaluate constant expression".to_owned(),
                    );
                }
                self.decorate(node, scope, arg_ty, const_val, None)
            }
            Intrinsic::Import => self.analyze_import(node, scope, args[0]),
            Intrinsic::CImport => self.analyze_c_import(node, scope, args[0]),
            Intrinsic::CInclude => self.analyze_c_include(node, scope, args[0]),
            Intrinsic::CDefine | Intrinsic::CUndef => {
                self.intrinsic_error(node, scope, format!("'@{text}' is not supported"))
            }
        }
    }

    fn intrinsic_error(&mut self, node: NodeId, scope: ScopeId, msg: String) -> TypeId {
        self.add_error(node, msg);
        self.intrinsic_invalid(node, scope)
    }

    fn intrinsic_invalid(&mut self, node: NodeId, scope: ScopeId) -> TypeId {
        let invalid = self.types.builtin.invalid;
        self.decorate(node, scope, invalid, None, None)
    }

    fn const_string_arg(&mut self, arg: NodeId, scope: ScopeId) -> Option<String> {
        let ty = self.analyze_expression(arg, scope, None);
        if self.types.is_invalid(ty) {
            return None;
        }
        match self.expr_const(arg).map(|v| &v.payload) {
            Some(ConstPayload::Str(id)) => Some(self.interner.get(*id).to_owned()),
            _ => {
                self.add_error(arg, "expected constant string".to_owned());
                None
            }
        }
    }

    fn analyze_compile_var(&mut self, node: NodeId, scope: ScopeId, arg: NodeId) -> TypeId {
        let Some(key_text) = self.const_string_arg(arg, scope) else {
            return self.intrinsic_invalid(node, scope);
        };
        let Ok(key) = CompileVar::from_str(&key_text) else {
            return self.intrinsic_error(
                node,
                scope,
                format!("unknown compile variable: '{key_text}'"),
            );
        };
        let bool_ty = self.types.builtin.bool_;
        match key {
            CompileVar::IsBigEndian => {
                let value = self.config.target.is_big_endian();
                self.decorate(
                    node,
                    scope,
                    bool_ty,
                    Some(ConstVal::compile_var(ConstPayload::Bool(value))),
                    None,
                )
            }
            CompileVar::IsRelease => {
                let value = self.config.release;
                self.decorate(
                    node,
                    scope,
                    bool_ty,
                    Some(ConstVal::compile_var(ConstPayload::Bool(value))),
                    None,
                )
            }
            CompileVar::IsTest => {
                let value = self.config.is_test;
                self.decorate(
                    node,
                    scope,
                    bool_ty,
                    Some(ConstVal::compile_var(ConstPayload::Bool(value))),
                    None,
                )
            }
            CompileVar::Os | CompileVar::Arch | CompileVar::Environ => {
                let text = match key {
                    CompileVar::Os => self.config.target.os.to_string(),
                    CompileVar::Arch => self.config.target.arch.to_string(),
                    _ => self.config.target.environ.to_string(),
                };
                let id = self.interner.intern(&text);
                let len = text.len() as u64;
                let u8_ty = self.types.builtin.u8_;
                let slice_ty = self.types.get_slice(u8_ty, true);
                let value = ConstVal::compile_var(ConstPayload::Slice {
                    array: Box::new(ConstVal::new(ConstPayload::Str(id))),
                    len,
                });
                self.decorate(node, scope, slice_ty, Some(value), None)
            }
        }
    }

    fn analyze_import(&mut self, node: NodeId, scope: ScopeId, arg: NodeId) -> TypeId {
        if self.scopes.get(scope).fn_entry.is_some() {
            return self.intrinsic_error(node, scope, "@import invalid inside function bodies".to_owned());
        }
        let Some(target) = self.const_string_arg(arg, scope) else {
            return self.intrinsic_invalid(node, scope);
        };
        let current_import = self.ast.import_of(node);
        let package = self.imports.get(current_import).package;

        // package name first, then a path relative to the package root
        let target_id = self.interner.lookup(&target);
        let package_entry = target_id.and_then(|id| {
            self.imports
                .package(package)
                .package_table
                .get(&id)
                .copied()
        });
        let (load_package, load_path) = match package_entry {
            Some(target_package) => {
                let path = self.imports.package(target_package).root_src_path.clone();
                (target_package, path)
            }
            None => {
                let dir = self.imports.package(package).root_src_dir.clone();
                (package, dir.join(&target))
            }
        };

        match self.load_import_file(load_package, &load_path) {
            Ok(imported) => {
                // honor the scan-before-reference ordering for the fresh file
                while let Some(pending) = self.scan_queue.pop_front() {
                    self.scan_import(pending);
                }
                let namespace = self.types.builtin.namespace;
                self.decorate(
                    node,
                    scope,
                    namespace,
                    Some(ConstVal::new(ConstPayload::Import(imported))),
                    None,
                )
            }
            Err(_) => {
                self.imports.get_mut(current_import).any_imports_failed = true;
                self.intrinsic_error(node, scope, format!("unable to find '{target}'"))
            }
        }
    }

    /// The C importer is an external collaborator; the block and its
    /// `@c_include` lines are collected, then importing reports as
    /// unavailable and taints the enclosing import.
    fn analyze_c_import(&mut self, node: NodeId, scope: ScopeId, arg: NodeId) -> TypeId {
        let import = self.ast.import_of(node);
        let block_scope = self.scopes.new_scope(Some(scope), node, import);
        self.scopes.get_mut(block_scope).c_import_buffer = Some(String::new());
        self.analyze_expression(arg, block_scope, None);
        self.imports.get_mut(import).any_imports_failed = true;
        self.intrinsic_error(node, scope, "C header import is not available".to_owned())
    }

    fn analyze_c_include(&mut self, node: NodeId, scope: ScopeId, arg: NodeId) -> TypeId {
        let Some(header) = self.const_string_arg(arg, scope) else {
            return self.intrinsic_invalid(node, scope);
        };
        // find the nearest enclosing c-import buffer
        let mut current = Some(scope);
        let mut buffer_scope = None;
        while let Some(id) = current {
            if self.scopes.get(id).c_import_buffer.is_some() {
                buffer_scope = Some(id);
                break;
            }
            current = self.scopes.get(id).parent;
        }
        let Some(buffer_scope) = buffer_scope else {
            return self.intrinsic_error(
                node,
                scope,
                "@c_include valid only inside @c_import block".to_owned(),
            );
        };
        let buffer = self
            .scopes
            .get_mut(buffer_scope)
            .c_import_buffer
            .as_mut()
            .expect("buffer checked above");
        buffer.push_str(&format!("#include <{header}>\n"));
        let void = self.types.builtin.void;
        self.decorate(node, scope, void, None, None)
    }
}
