//! Implicit-cast lattice, explicit cast operators, and peer type
//! resolution.
//!
//! Explicit casts use call syntax with a type callee; exactly one `CastOp`
//! is chosen per site, tried in a fixed precedence order. Implicit casts
//! are a subset of the same ops, applied when an expected type is threaded
//! into analysis.

use crate::{
    analyze::{ImplicitCast, ReturnKnowledge},
    ast::NodeId,
    run::Compilation,
    scope::ScopeId,
    types::{TypeId, TypeKind},
    value::CastOp,
};

impl Compilation {
    /// Structural match allowing mut-to-const weakening on pointers and
    /// slices; everything else must be the same interned type.
    pub fn types_match_const_cast_only(&self, expected: TypeId, actual: TypeId) -> bool {
        let expected = self.types.canonical(expected);
        let actual = self.types.canonical(actual);
        if expected == actual {
            return true;
        }
        match (self.types.kind(expected), self.types.kind(actual)) {
            (
                TypeKind::Pointer { child: e_child, is_const: true },
                TypeKind::Pointer { child: a_child, .. },
            ) => self.types_match_const_cast_only(*e_child, *a_child),
            (
                TypeKind::Slice { child: e_child, is_const: true },
                TypeKind::Slice { child: a_child, .. },
            ) => self.types_match_const_cast_only(*e_child, *a_child),
            (
                TypeKind::Maybe { child: e_child },
                TypeKind::Maybe { child: a_child },
            )
            | (
                TypeKind::ErrorUnion { child: e_child },
                TypeKind::ErrorUnion { child: a_child },
            ) => self.types_match_const_cast_only(*e_child, *a_child),
            _ => false,
        }
    }

    /// Records `op` on the node, retypes it to `target`, and transforms its
    /// constant value.
    fn apply_cast(&mut self, node: NodeId, target: TypeId, op: CastOp) -> TypeId {
        let from = self.expr_info(node).ty;
        let const_val = self
            .expr_info(node)
            .const_val
            .clone()
            .and_then(|value| self.eval_const_cast(&value, op, target));
        let info = self.expr_info_mut(node);
        info.cast = Some(ImplicitCast { op, from, target });
        info.ty = target;
        info.const_val = const_val;
        target
    }

    /// Whether a number-literal expression fits the target type; reports
    /// the error itself on failure.
    pub fn num_lit_fits_in_other_type(&mut self, node: NodeId, target: TypeId) -> bool {
        let canonical = self.types.canonical(target);
        let Some(value) = self.expr_const(node).and_then(|v| v.as_num().cloned()) else {
            return false;
        };
        let fits = match *self.types.kind(canonical) {
            TypeKind::Int { is_signed, bits } => value.fits_in_bits(bits, is_signed),
            TypeKind::Float { .. } => true,
            _ => false,
        };
        if !fits {
            let name = self.types.name(target).to_owned();
            let rendered = match &value {
                crate::bignum::BigNum::Int(v) => v.to_string(),
                crate::bignum::BigNum::Float(v) => v.to_string(),
            };
            self.add_error(
                node,
                format!("value {rendered} cannot be implicitly casted to type '{name}'"),
            );
        }
        fits
    }

    fn is_num_lit(&self, ty: TypeId) -> bool {
        matches!(
            self.types.kind(self.types.canonical(ty)),
            TypeKind::NumLitInt | TypeKind::NumLitFloat
        )
    }

    /// The implicit-cast lattice: accepts `actual` where `expected` is
    /// required, recording a cast on the node, or reports and returns
    /// `Invalid`.
    pub fn resolve_type_compatibility(&mut self, node: NodeId, expected: TypeId) -> TypeId {
        let actual = self.expr_info(node).ty;
        if self.types.is_invalid(actual) || self.types.is_invalid(expected) {
            return self.types.builtin.invalid;
        }
        let e = self.types.canonical(expected);
        let a = self.types.canonical(actual);

        // unreachable absorbs any expected type
        if a == self.types.builtin.unreachable_ {
            return actual;
        }
        if self.types_match_const_cast_only(expected, actual) {
            return actual;
        }

        match (self.types.kind(e).clone(), self.types.kind(a).clone()) {
            // maybe wrap
            (TypeKind::Maybe { child }, _) => {
                if self.types_match_const_cast_only(child, a) {
                    let ty = self.apply_cast(node, expected, CastOp::MaybeWrap);
                    self.expr_info_mut(node).return_knowledge = ReturnKnowledge::KnownNonNull;
                    return ty;
                }
                if self.is_num_lit(a) {
                    if self.num_lit_fits_in_other_type(node, child) {
                        let ty = self.apply_cast(node, expected, CastOp::MaybeWrap);
                        self.expr_info_mut(node).return_knowledge = ReturnKnowledge::KnownNonNull;
                        return ty;
                    }
                    return self.types.builtin.invalid;
                }
            }
            // error-union wrap
            (TypeKind::ErrorUnion { .. }, TypeKind::PureError) => {
                let ty = self.apply_cast(node, expected, CastOp::PureErrorWrap);
                self.expr_info_mut(node).return_knowledge = ReturnKnowledge::KnownError;
                return ty;
            }
            (TypeKind::ErrorUnion { child }, _) => {
                if self.types_match_const_cast_only(child, a) {
                    let ty = self.apply_cast(node, expected, CastOp::ErrorWrap);
                    self.expr_info_mut(node).return_knowledge = ReturnKnowledge::KnownNonError;
                    return ty;
                }
                if self.is_num_lit(a) {
                    if self.num_lit_fits_in_other_type(node, child) {
                        let ty = self.apply_cast(node, expected, CastOp::ErrorWrap);
                        self.expr_info_mut(node).return_knowledge = ReturnKnowledge::KnownNonError;
                        return ty;
                    }
                    return self.types.builtin.invalid;
                }
            }
            // integer widening of equal signedness
            (
                TypeKind::Int { is_signed: e_signed, bits: e_bits },
                TypeKind::Int { is_signed: a_signed, bits: a_bits },
            ) => {
                if e_signed == a_signed && e_bits >= a_bits {
                    return self.apply_cast(node, expected, CastOp::WidenOrShorten);
                }
            }
            // float widening
            (TypeKind::Float { bits: e_bits }, TypeKind::Float { bits: a_bits }) => {
                if e_bits >= a_bits {
                    return self.apply_cast(node, expected, CastOp::WidenOrShorten);
                }
            }
            // fixed-size array to const slice
            (
                TypeKind::Slice { child: e_child, is_const: true },
                TypeKind::Array { child: a_child, .. },
            ) => {
                if self.types_match_const_cast_only(e_child, a_child) {
                    return self.apply_cast(node, expected, CastOp::ToUnknownSizeArray);
                }
            }
            // number literal fitting the expected type
            (TypeKind::Int { .. }, TypeKind::NumLitInt)
            | (TypeKind::Float { .. }, TypeKind::NumLitFloat) => {
                if self.num_lit_fits_in_other_type(node, expected) {
                    return self.apply_cast(node, expected, CastOp::Noop);
                }
                return self.types.builtin.invalid;
            }
            (TypeKind::Float { .. }, TypeKind::NumLitInt) => {
                if self.num_lit_fits_in_other_type(node, expected) {
                    return self.apply_cast(node, expected, CastOp::IntToFloat);
                }
                return self.types.builtin.invalid;
            }
            (TypeKind::Int { .. }, TypeKind::NumLitFloat) => {
                if self.num_lit_fits_in_other_type(node, expected) {
                    return self.apply_cast(node, expected, CastOp::FloatToInt);
                }
                return self.types.builtin.invalid;
            }
            _ => {}
        }

        let expected_name = self.types.name(expected).to_owned();
        let actual_name = self.types.name(actual).to_owned();
        self.add_error(
            node,
            format!("expected type '{expected_name}', got '{actual_name}'"),
        );
        self.types.builtin.invalid
    }

    /// Explicit cast `T(expr)`: tries each operator in precedence order.
    pub fn analyze_cast_expr(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        wanted: TypeId,
        expr: NodeId,
    ) -> TypeId {
        let actual = self.analyze_expression(expr, scope, None);
        if self.types.is_invalid(wanted) || self.types.is_invalid(actual) {
            return self.cast_result(node, scope, self.types.builtin.invalid, expr);
        }
        let e = self.types.canonical(wanted);
        let a = self.types.canonical(actual);
        let isize_ = self.types.builtin.isize_;
        let usize_ = self.types.builtin.usize_;

        // explicit match or non-const to const
        if self.types_match_const_cast_only(wanted, actual) {
            return self.finish_cast(node, scope, expr, wanted, CastOp::Noop);
        }

        // bool to int
        if matches!(self.types.kind(e), TypeKind::Int { .. })
            && matches!(self.types.kind(a), TypeKind::Bool)
        {
            return self.finish_cast(node, scope, expr, wanted, CastOp::BoolToInt);
        }

        // pointer to isize or usize
        if (e == isize_ || e == usize_) && matches!(self.types.kind(a), TypeKind::Pointer { .. }) {
            return self.finish_cast(node, scope, expr, wanted, CastOp::PtrToInt);
        }

        // isize or usize to pointer
        if matches!(self.types.kind(e), TypeKind::Pointer { .. }) && (a == isize_ || a == usize_) {
            return self.finish_cast(node, scope, expr, wanted, CastOp::IntToPtr);
        }

        // widening or shortening within a kind
        if (matches!(self.types.kind(e), TypeKind::Int { .. })
            && matches!(self.types.kind(a), TypeKind::Int { .. }))
            || (matches!(self.types.kind(e), TypeKind::Float { .. })
                && matches!(self.types.kind(a), TypeKind::Float { .. }))
        {
            return self.finish_cast(node, scope, expr, wanted, CastOp::WidenOrShorten);
        }

        // int to float
        if matches!(self.types.kind(e), TypeKind::Float { .. })
            && matches!(self.types.kind(a), TypeKind::Int { .. })
        {
            return self.finish_cast(node, scope, expr, wanted, CastOp::IntToFloat);
        }

        // float to int
        if matches!(self.types.kind(e), TypeKind::Int { .. })
            && matches!(self.types.kind(a), TypeKind::Float { .. })
        {
            return self.finish_cast(node, scope, expr, wanted, CastOp::FloatToInt);
        }

        // fixed-size array to slice
        if let (
            TypeKind::Slice { child: e_child, .. },
            TypeKind::Array { child: a_child, .. },
        ) = (self.types.kind(e).clone(), self.types.kind(a).clone())
        {
            if self.types_match_const_cast_only(e_child, a_child) {
                return self.finish_cast(node, scope, expr, wanted, CastOp::ToUnknownSizeArray);
            }
        }

        // pointer to pointer (including function pointers)
        let is_ptr_like = |kind: &TypeKind| matches!(kind, TypeKind::Pointer { .. } | TypeKind::Fn(_));
        if is_ptr_like(self.types.kind(a)) && is_ptr_like(self.types.kind(e)) {
            return self.finish_cast(node, scope, expr, wanted, CastOp::PointerReinterpret);
        }

        // maybe pointer to maybe pointer
        if let (TypeKind::Maybe { child: e_child }, TypeKind::Maybe { child: a_child }) =
            (self.types.kind(e).clone(), self.types.kind(a).clone())
        {
            if is_ptr_like(self.types.kind(self.types.canonical(a_child)))
                && is_ptr_like(self.types.kind(self.types.canonical(e_child)))
            {
                return self.finish_cast(node, scope, expr, wanted, CastOp::PointerReinterpret);
            }
        }

        // wrap into maybe
        if let TypeKind::Maybe { child } = self.types.kind(e).clone() {
            if self.types_match_const_cast_only(child, a) {
                let ty = self.finish_cast(node, scope, expr, wanted, CastOp::MaybeWrap);
                self.expr_info_mut(node).return_knowledge = ReturnKnowledge::KnownNonNull;
                return ty;
            }
            if self.is_num_lit(a) {
                if self.num_lit_fits_in_other_type(expr, child) {
                    let ty = self.finish_cast(node, scope, expr, wanted, CastOp::MaybeWrap);
                    self.expr_info_mut(node).return_knowledge = ReturnKnowledge::KnownNonNull;
                    return ty;
                }
                return self.cast_result(node, scope, self.types.builtin.invalid, expr);
            }
        }

        // wrap into error union
        if let TypeKind::ErrorUnion { child } = self.types.kind(e).clone() {
            if matches!(self.types.kind(a), TypeKind::PureError) {
                let ty = self.finish_cast(node, scope, expr, wanted, CastOp::PureErrorWrap);
                self.expr_info_mut(node).return_knowledge = ReturnKnowledge::KnownError;
                return ty;
            }
            if self.types_match_const_cast_only(child, a) {
                let ty = self.finish_cast(node, scope, expr, wanted, CastOp::ErrorWrap);
                self.expr_info_mut(node).return_knowledge = ReturnKnowledge::KnownNonError;
                return ty;
            }
            if self.is_num_lit(a) {
                if self.num_lit_fits_in_other_type(expr, child) {
                    let ty = self.finish_cast(node, scope, expr, wanted, CastOp::ErrorWrap);
                    self.expr_info_mut(node).return_knowledge = ReturnKnowledge::KnownNonError;
                    return ty;
                }
                return self.cast_result(node, scope, self.types.builtin.invalid, expr);
            }
        }

        // number literal to a concrete type
        if self.is_num_lit(a) {
            if self.num_lit_fits_in_other_type(expr, wanted) {
                let lit_is_float = matches!(self.types.kind(a), TypeKind::NumLitFloat);
                let op = match self.types.kind(e) {
                    TypeKind::Int { .. } if lit_is_float => CastOp::FloatToInt,
                    TypeKind::Float { .. } if !lit_is_float => CastOp::IntToFloat,
                    _ => CastOp::Noop,
                };
                return self.finish_cast(node, scope, expr, wanted, op);
            }
            return self.cast_result(node, scope, self.types.builtin.invalid, expr);
        }

        // error tag to an integer that can hold every error value
        let actual_is_void_err = matches!(
            self.types.kind(a),
            TypeKind::ErrorUnion { child } if !self.types.has_bits(*child)
        );
        let actual_is_pure_err = matches!(self.types.kind(a), TypeKind::PureError);
        if (actual_is_void_err || actual_is_pure_err)
            && matches!(self.types.kind(e), TypeKind::Int { .. })
        {
            let TypeKind::Int { is_signed, bits } = *self.types.kind(e) else {
                unreachable!()
            };
            let count = crate::bignum::BigNum::from_u64(self.error_values.len() as u64);
            if count.fits_in_bits(bits, is_signed) {
                return self.finish_cast(node, scope, expr, wanted, CastOp::ErrToInt);
            }
            let name = self.types.name(wanted).to_owned();
            self.add_error(node, format!("too many error values to fit in '{name}'"));
            return self.cast_result(node, scope, self.types.builtin.invalid, expr);
        }

        let from = self.types.name(actual).to_owned();
        let to = self.types.name(wanted).to_owned();
        self.add_error(node, format!("invalid cast from type '{from}' to '{to}'"));
        self.cast_result(node, scope, self.types.builtin.invalid, expr)
    }

    /// Decorates the call node as a cast of `expr`.
    fn finish_cast(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        expr: NodeId,
        target: TypeId,
        op: CastOp,
    ) -> TypeId {
        let from = self.expr_type(expr);
        let const_val = self
            .expr_const(expr)
            .cloned()
            .and_then(|value| self.eval_const_cast(&value, op, target));
        let ty = self.decorate(node, scope, target, const_val, None);
        self.expr_info_mut(node).cast = Some(ImplicitCast { op, from, target });
        ty
    }

    fn cast_result(&mut self, node: NodeId, scope: ScopeId, ty: TypeId, _expr: NodeId) -> TypeId {
        self.decorate(node, scope, ty, None, None)
    }

    /// Peer type resolution over sibling expressions (if/else branches,
    /// switch prongs, comparison operands). The chosen peer is applied to
    /// every node as an implicit cast.
    pub fn resolve_peer_types(&mut self, parent: NodeId, _scope: ScopeId, nodes: &[NodeId]) -> TypeId {
        let invalid = self.types.builtin.invalid;
        let unreachable_ = self.types.builtin.unreachable_;
        if nodes.is_empty() {
            return self.types.builtin.void;
        }
        let mut peer = self.expr_type(nodes[0]);
        for &node in &nodes[1..] {
            let cur = self.expr_type(node);
            if self.types.is_invalid(peer) || self.types.is_invalid(cur) {
                return invalid;
            }
            let p = self.types.canonical(peer);
            let c = self.types.canonical(cur);
            if p == c {
                continue;
            }
            if p == unreachable_ {
                peer = cur;
                continue;
            }
            if c == unreachable_ {
                continue;
            }
            match (self.types.kind(p).clone(), self.types.kind(c).clone()) {
                (
                    TypeKind::Int { is_signed: ps, bits: pb },
                    TypeKind::Int { is_signed: cs, bits: cb },
                ) if ps == cs => {
                    if cb > pb {
                        peer = cur;
                    }
                }
                (TypeKind::Float { bits: pb }, TypeKind::Float { bits: cb }) => {
                    if cb > pb {
                        peer = cur;
                    }
                }
                (TypeKind::NumLitInt, TypeKind::NumLitFloat) => peer = cur,
                (TypeKind::NumLitFloat, TypeKind::NumLitInt) => {}
                (TypeKind::NumLitInt | TypeKind::NumLitFloat, TypeKind::Int { .. })
                | (TypeKind::NumLitInt | TypeKind::NumLitFloat, TypeKind::Float { .. }) => {
                    peer = cur;
                }
                (TypeKind::Int { .. }, TypeKind::NumLitInt | TypeKind::NumLitFloat)
                | (TypeKind::Float { .. }, TypeKind::NumLitInt | TypeKind::NumLitFloat) => {}
                // prefer the error union over its payload type
                (TypeKind::ErrorUnion { child }, _)
                    if self.types_match_const_cast_only(child, c) => {}
                (_, TypeKind::ErrorUnion { child })
                    if self.types_match_const_cast_only(child, p) =>
                {
                    peer = cur;
                }
                _ => {
                    if self.types_match_const_cast_only(peer, cur) {
                        // peer already accepts cur
                    } else if self.types_match_const_cast_only(cur, peer) {
                        peer = cur;
                    } else {
                        let a = self.types.name(peer).to_owned();
                        let b = self.types.name(cur).to_owned();
                        self.add_error(parent, format!("incompatible types: '{a}' and '{b}'"));
                        return invalid;
                    }
                }
            }
        }
        for &node in nodes {
            let node_ty = self.expr_type(node);
            if self.types.canonical(node_ty) == unreachable_ {
                continue;
            }
            let compat = self.resolve_type_compatibility(node, peer);
            if self.types.is_invalid(compat) {
                return invalid;
            }
        }
        peer
    }
}
