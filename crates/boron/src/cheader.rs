//! C header generation for exported functions.
//!
//! A purely structural translation: exported (`export fn`) prototypes are
//! written with C type names and an include guard. No runtime support is
//! involved.

use std::fmt::Write as _;

use crate::{
    run::Compilation,
    types::{TypeId, TypeKind},
};

impl Compilation {
    /// The C spelling of a type in an exported signature.
    fn c_type_name(&self, ty: TypeId) -> String {
        let canonical = self.types.canonical(ty);
        match self.types.kind(canonical) {
            TypeKind::Void => "void".to_owned(),
            TypeKind::Bool => "bool".to_owned(),
            TypeKind::Unreachable => "void".to_owned(),
            TypeKind::Int { is_signed, bits } => {
                format!("{}int{bits}_t", if *is_signed { "" } else { "u" })
            }
            TypeKind::Float { bits: 32 } => "float".to_owned(),
            TypeKind::Float { .. } => "double".to_owned(),
            TypeKind::Pointer { child, is_const } => {
                format!(
                    "{}{} *",
                    if *is_const { "const " } else { "" },
                    self.c_type_name(*child)
                )
            }
            TypeKind::Struct { name, .. } | TypeKind::Enum { name, .. } => {
                format!("struct {}", self.interner.get(*name))
            }
            _ => "void *".to_owned(),
        }
    }

    /// Renders the header for all exported functions.
    pub fn emit_header(&self) -> String {
        let root = self.root_import.expect("no root import");
        let stem = self
            .imports
            .get(root)
            .absolute_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_uppercase().replace('.', "_"))
            .unwrap_or_else(|| "OUT".to_owned());
        let guard = format!("{stem}_H");

        let mut out = String::new();
        let _ = writeln!(out, "#ifndef {guard}");
        let _ = writeln!(out, "#define {guard}");
        out.push('\n');
        let _ = writeln!(out, "#include <stdint.h>");
        let _ = writeln!(out, "#include <stdbool.h>");
        out.push('\n');

        for entry in &self.fns {
            if !entry.is_export {
                continue;
            }
            let TypeKind::Fn(fn_type_id) = self.types.kind(entry.fn_type) else {
                continue;
            };
            let ret = self.c_type_name(fn_type_id.return_type);
            let mut params: Vec<String> = fn_type_id
                .params
                .iter()
                .map(|p| self.c_type_name(p.ty))
                .collect();
            if params.is_empty() {
                params.push("void".to_owned());
            }
            if fn_type_id.is_var_args {
                params.push("...".to_owned());
            }
            let _ = writeln!(out, "{ret} {}({});", entry.symbol_name, params.join(", "));
        }

        out.push('\n');
        let _ = writeln!(out, "#endif /* {guard} */");
        out
    }
}
