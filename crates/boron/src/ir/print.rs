//! Renders a [`Module`] as textual LLVM IR.

use std::fmt::Write as _;

use super::Module;

impl Module {
    pub fn to_ll_string(&self) -> String {
        self.di.finalize();
        let mut out = String::new();
        let _ = writeln!(out, "; ModuleID = '{}'", self.di.module_name());
        let _ = writeln!(out, "target triple = \"{}\"", self.triple);
        out.push('\n');

        // named struct types
        for named in &self.types.named {
            if let Some(body) = &named.body {
                let inner: Vec<String> = body.iter().map(|&f| self.types.text(f)).collect();
                let _ = writeln!(out, "%{} = type {{ {} }}", named.name, inner.join(", "));
            } else {
                let _ = writeln!(out, "%{} = type opaque", named.name);
            }
        }
        if !self.types.named.is_empty() {
            out.push('\n');
        }

        for global in &self.globals {
            let kind = if global.constant { "constant" } else { "global" };
            let unnamed = if global.unnamed_addr { "unnamed_addr " } else { "" };
            let ty_text = self.types.text(global.ty);
            let _ = writeln!(
                out,
                "@{} = {}{unnamed}{kind} {ty_text} {}",
                global.name,
                global.linkage.keyword(),
                global.init
            );
        }
        if !self.globals.is_empty() {
            out.push('\n');
        }

        for function in &self.functions {
            let ret_text = self.types.text(function.ret);
            let mut params: Vec<String> = function
                .params
                .iter()
                .map(|p| {
                    let mut text = self.types.text(p.ty);
                    for attr in &p.attrs {
                        let _ = write!(text, " {attr}");
                    }
                    text
                })
                .collect();
            if function.var_args {
                params.push("...".to_owned());
            }
            let attrs = if function.attrs.is_empty() {
                String::new()
            } else {
                format!(" {}", function.attrs.join(" "))
            };
            let dbg = match function.di_subprogram {
                Some(sp) => format!(" !dbg !{}", sp.raw()),
                None => String::new(),
            };
            if function.is_definition {
                let _ = writeln!(
                    out,
                    "define {}{}{ret_text} @{}({}){attrs}{dbg} {{",
                    function.linkage.keyword(),
                    function.cc.keyword(),
                    function.name,
                    params.join(", ")
                );
                for block in &function.blocks {
                    let _ = writeln!(out, "{}:", block.label);
                    for line in &block.lines {
                        let _ = writeln!(out, "  {line}");
                    }
                }
                let _ = writeln!(out, "}}\n");
            } else {
                let _ = writeln!(
                    out,
                    "declare {}{ret_text} @{}({}){attrs}\n",
                    function.cc.keyword(),
                    function.name,
                    params.join(", ")
                );
            }
        }

        for decl in self.intrinsic_decls.values() {
            let _ = writeln!(out, "{decl}");
        }
        if !self.intrinsic_decls.is_empty() {
            out.push('\n');
        }

        if self.di.has_nodes() {
            let node_count = self.di.nodes().len();
            if let Some(cu) = self.di.compile_unit() {
                let _ = writeln!(out, "!llvm.dbg.cu = !{{!{}}}", cu.raw());
                let _ = writeln!(
                    out,
                    "!llvm.module.flags = !{{!{node_count}, !{}}}",
                    node_count + 1
                );
            }
            for (idx, node) in self.di.nodes().iter().enumerate() {
                let _ = writeln!(out, "!{idx} = {node}");
            }
            if self.di.compile_unit().is_some() {
                let _ = writeln!(out, "!{node_count} = !{{i32 2, !\"Debug Info Version\", i32 3}}");
                let _ = writeln!(
                    out,
                    "!{} = !{{i32 2, !\"Dwarf Version\", i32 4}}",
                    node_count + 1
                );
            }
        }

        out
    }
}
