//! The compilation driver.
//!
//! [`Compilation`] owns every arena for the whole build: interner, AST,
//! types, scopes, imports, function table, decoration tables, diagnostics.
//! Everything lives until the compilation finishes; cross-references are
//! index handles.
//!
//! Pipeline: load and parse the root import, drain the scan/use queues to a
//! fixpoint, force-resolve every top-level declaration, analyze function
//! bodies, and only if no diagnostics accumulated, emit IR.

use std::{
    collections::VecDeque,
    fmt,
    path::{Path, PathBuf},
};

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;

use crate::{
    analyze::{ErrorValueEntry, ExprInfo, FnEntry, FnId, ResolveState},
    ast::{Ast, NodeId, NodeKind},
    config::BuildConfig,
    diag::Diagnostics,
    imports::{ImportId, Imports, PackageId},
    intern::{Interner, StringId},
    lexer,
    parser,
    scope::{ScopeGraph, ScopeId, VarId},
    span::Span,
    types::{TypeId, TypeRegistry},
    value::ConstVal,
};

/// A fatal build failure (everything except accumulated semantic errors is
/// fatal on first occurrence).
#[derive(Debug)]
pub enum BuildError {
    Io { path: PathBuf, error: std::io::Error },
    Lex { path: String, line: u32, column: u32, msg: String },
    Parse { path: String, line: u32, column: u32, msg: String },
    /// Rendered semantic diagnostics; compilation collected all of them
    /// before giving up.
    Semantic { rendered: String, count: usize },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Io { path, error } => {
                write!(f, "unable to open '{}': {error}", path.display())
            }
            BuildError::Lex { path, line, column, msg } => {
                write!(f, "{path}:{line}:{column}: error: {msg}")
            }
            BuildError::Parse { path, line, column, msg } => {
                write!(f, "{path}:{line}:{column}: error: {msg}")
            }
            BuildError::Semantic { rendered, count } => {
                write!(f, "{rendered}{count} error{}", if *count == 1 { "" } else { "s" })
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// The result of a successful build.
#[derive(Debug)]
pub struct BuildOutput {
    /// Textual LLVM IR for the module.
    pub ll_text: String,
    /// Generated C header for exported functions, when requested.
    pub header_text: Option<String>,
}

/// All state for one build.
pub struct Compilation {
    pub config: BuildConfig,
    pub interner: Interner,
    pub ast: Ast,
    pub types: TypeRegistry,
    pub scopes: ScopeGraph,
    pub diags: Diagnostics,
    pub imports: Imports,
    pub fns: Vec<FnEntry>,
    /// Error values by name; tag 0 is reserved for "no error".
    pub error_values: IndexMap<StringId, ErrorValueEntry>,
    /// Expression decoration, parallel to the AST arena.
    pub expr_infos: Vec<Option<ExprInfo>>,
    pub decl_states: AHashMap<NodeId, ResolveState>,
    /// Container and alias declarations to their types.
    pub decl_types: AHashMap<NodeId, TypeId>,
    /// Variable declarations to their variables.
    pub decl_vars: AHashMap<NodeId, VarId>,
    /// Constant value of resolved `const` declarations.
    pub decl_const: AHashMap<NodeId, Option<ConstVal>>,
    /// Fn proto nodes to function entries.
    pub proto_fns: AHashMap<NodeId, FnId>,
    pub root_package: PackageId,
    pub root_import: Option<ImportId>,
    pub scan_queue: VecDeque<ImportId>,
    /// Pending `use` declarations: (target scope, use node).
    pub use_queue: VecDeque<(ScopeId, NodeId)>,
    /// Functions with bodies awaiting analysis.
    pub fn_defs: Vec<FnId>,
    /// Containers currently being resolved, for infinite-size detection.
    pub container_visit: AHashSet<TypeId>,
    /// Container types back to their declaration nodes, for lazy layout.
    pub container_decls: AHashMap<TypeId, NodeId>,
    /// Pattern-bound variables (if-maybe captures, for-loop elements,
    /// error-unwrap bindings, switch captures), keyed by the binding node.
    pub bound_vars: AHashMap<NodeId, VarId>,
    /// Hidden index variables of for loops.
    pub index_vars: AHashMap<NodeId, VarId>,
    /// The scope each block node opened, for defer emission at scope exit.
    pub block_scopes: AHashMap<NodeId, ScopeId>,
    /// Enum-member construction calls: call node to (tag, payload type).
    pub enum_ctors: AHashMap<NodeId, (u64, TypeId)>,
    primitive_types: AHashMap<StringId, TypeId>,
}

impl Compilation {
    pub fn new(config: BuildConfig) -> Self {
        let ptr_bits = config.target.ptr_bits();
        let mut interner = Interner::new();
        let mut types = TypeRegistry::new(ptr_bits);
        let mut primitive_types = AHashMap::new();
        for (name, is_signed, bits) in [
            ("i8", true, 8u32),
            ("i16", true, 16),
            ("i32", true, 32),
            ("i64", true, 64),
            ("u8", false, 8),
            ("u16", false, 16),
            ("u32", false, 32),
            ("u64", false, 64),
        ] {
            let id = types.get_int(is_signed, bits);
            primitive_types.insert(interner.intern(name), id);
        }
        primitive_types.insert(interner.intern("isize"), types.builtin.isize_);
        primitive_types.insert(interner.intern("usize"), types.builtin.usize_);
        primitive_types.insert(interner.intern("f32"), types.builtin.f32_);
        primitive_types.insert(interner.intern("f64"), types.builtin.f64_);
        primitive_types.insert(interner.intern("bool"), types.builtin.bool_);
        primitive_types.insert(interner.intern("void"), types.builtin.void);
        primitive_types.insert(interner.intern("unreachable"), types.builtin.unreachable_);
        primitive_types.insert(interner.intern("type"), types.builtin.meta_type);

        let mut imports = Imports::new();
        let root_package = imports.add_package(PathBuf::from("."), PathBuf::from("main"));

        Self {
            config,
            interner,
            ast: Ast::new(),
            types,
            scopes: ScopeGraph::new(),
            diags: Diagnostics::new(),
            imports,
            fns: Vec::new(),
            error_values: IndexMap::new(),
            expr_infos: Vec::new(),
            decl_states: AHashMap::new(),
            decl_types: AHashMap::new(),
            decl_vars: AHashMap::new(),
            decl_const: AHashMap::new(),
            proto_fns: AHashMap::new(),
            root_package,
            root_import: None,
            scan_queue: VecDeque::new(),
            use_queue: VecDeque::new(),
            fn_defs: Vec::new(),
            container_visit: AHashSet::new(),
            container_decls: AHashMap::new(),
            bound_vars: AHashMap::new(),
            index_vars: AHashMap::new(),
            block_scopes: AHashMap::new(),
            enum_ctors: AHashMap::new(),
            primitive_types,
        }
    }

    /// A primitive type name's type, if `name` is one.
    pub fn primitive_type(&self, name: StringId) -> Option<TypeId> {
        self.primitive_types.get(&name).copied()
    }

    // ===== diagnostics =====

    pub fn add_error(&mut self, node: NodeId, msg: String) -> usize {
        let import = self.ast.import_of(node);
        let span = self.ast.span(node);
        self.diags.add(import, span, msg)
    }

    pub fn add_error_at(&mut self, import: ImportId, span: Span, msg: String) -> usize {
        self.diags.add(import, span, msg)
    }

    pub fn add_note(&mut self, diag_idx: usize, node: NodeId, msg: String) {
        let import = self.ast.import_of(node);
        let span = self.ast.span(node);
        self.diags.add_note(diag_idx, import, span, msg);
    }

    // ===== decoration =====

    pub fn set_expr_info(&mut self, node: NodeId, info: ExprInfo) {
        if self.expr_infos.len() < self.ast.len() {
            self.expr_infos.resize(self.ast.len(), None);
        }
        self.expr_infos[node.index()] = Some(info);
    }

    pub fn expr_info(&self, node: NodeId) -> &ExprInfo {
        self.expr_infos[node.index()]
            .as_ref()
            .expect("expression not analyzed")
    }

    pub fn expr_info_opt(&self, node: NodeId) -> Option<&ExprInfo> {
        self.expr_infos.get(node.index()).and_then(Option::as_ref)
    }

    pub fn expr_info_mut(&mut self, node: NodeId) -> &mut ExprInfo {
        self.expr_infos[node.index()]
            .as_mut()
            .expect("expression not analyzed")
    }

    /// The effective (post-implicit-cast) type of an analyzed expression.
    pub fn expr_type(&self, node: NodeId) -> TypeId {
        self.expr_info(node).ty
    }

    pub fn expr_const(&self, node: NodeId) -> Option<&ConstVal> {
        self.expr_info(node).const_val.as_ref()
    }

    pub fn fn_entry(&self, id: FnId) -> &FnEntry {
        &self.fns[id.index()]
    }

    pub fn fn_entry_mut(&mut self, id: FnId) -> &mut FnEntry {
        &mut self.fns[id.index()]
    }

    // ===== import loading =====

    /// Registers a source buffer as an import, tokenizes and parses it, and
    /// queues it for scanning. Lex/parse failures are fatal.
    pub fn add_source_import(
        &mut self,
        package: PackageId,
        absolute_path: PathBuf,
        source: String,
    ) -> Result<ImportId, BuildError> {
        let (import, fresh) = self.imports.add_import(package, absolute_path, source);
        if !fresh {
            return Ok(import);
        }
        let source = self.imports.get(import).source.clone();
        let tokens = lexer::tokenize(&source, &mut self.interner).map_err(|err| {
            let entry = self.imports.get(import);
            let loc = entry.line_offsets.locate(err.offset);
            BuildError::Lex {
                path: entry.display_path(),
                line: loc.line,
                column: loc.column,
                msg: err.msg,
            }
        })?;
        let root = parser::parse(&tokens, &mut self.ast, &self.interner, import).map_err(|err| {
            let entry = self.imports.get(import);
            let loc = entry.line_offsets.locate(err.span.start);
            BuildError::Parse {
                path: entry.display_path(),
                line: loc.line,
                column: loc.column,
                msg: err.msg,
            }
        })?;
        let scope = self.scopes.new_scope(None, root, import);
        {
            let entry = self.imports.get_mut(import);
            entry.root = Some(root);
            entry.scope = Some(scope);
        }
        self.scan_queue.push_back(import);
        Ok(import)
    }

    pub fn load_import_file(
        &mut self,
        package: PackageId,
        path: &Path,
    ) -> Result<ImportId, BuildError> {
        let absolute = path
            .canonicalize()
            .map_err(|error| BuildError::Io { path: path.to_owned(), error })?;
        if let Some(existing) = self.imports.lookup_path(&absolute) {
            return Ok(existing);
        }
        let source = std::fs::read_to_string(&absolute)
            .map_err(|error| BuildError::Io { path: absolute.clone(), error })?;
        self.add_source_import(package, absolute, source)
    }

    // ===== pipeline =====

    fn trace(&self, phase: &str) {
        if self.config.verbose {
            eprintln!("boron: {phase}");
        }
    }

    /// Runs semantic analysis to completion: scan fixpoint, top-level
    /// resolution, then function bodies.
    pub fn analyze_all(&mut self) {
        loop {
            self.trace("scanning declarations");
            while let Some(import) = self.scan_queue.pop_front() {
                self.scan_import(import);
            }
            while let Some((scope, node)) = self.use_queue.pop_front() {
                self.process_use_decl(scope, node);
                if !self.scan_queue.is_empty() {
                    // a `use` pulled in a fresh import; scan it first
                    break;
                }
            }
            self.trace("resolving top-level declarations");
            let mut progressed = false;
            for import in self.imports.iter_ids().collect::<Vec<_>>() {
                let Some(root) = self.imports.get(import).root else {
                    continue;
                };
                let NodeKind::Root { decls } = self.ast.kind(root) else {
                    continue;
                };
                for decl in decls.clone() {
                    if self.decl_states.get(&decl).copied().unwrap_or_default()
                        == ResolveState::Unresolved
                    {
                        self.resolve_top_level_decl(decl);
                        progressed = true;
                    }
                }
            }
            if self.scan_queue.is_empty() && self.use_queue.is_empty() && !progressed {
                break;
            }
        }

        self.trace("analyzing function bodies");
        let mut next = 0;
        // body analysis can add more definitions (imports resolved lazily)
        while next < self.fn_defs.len() {
            let fn_id = self.fn_defs[next];
            next += 1;
            self.analyze_fn_body(fn_id);
        }
    }

    /// Full build from an in-memory root source (used by tests and the
    /// REPL-ish paths): analysis, then emission when clean.
    pub fn build_source(&mut self, name: &str, source: &str) -> Result<BuildOutput, BuildError> {
        let root = self.add_source_import(
            self.root_package,
            PathBuf::from(name),
            source.to_owned(),
        )?;
        self.root_import = Some(root);
        self.finish_build()
    }

    /// Full build from a root file path.
    pub fn build_file(&mut self, path: &Path) -> Result<BuildOutput, BuildError> {
        let root = self.load_import_file(self.root_package, path)?;
        self.root_import = Some(root);
        self.finish_build()
    }

    fn finish_build(&mut self) -> Result<BuildOutput, BuildError> {
        self.analyze_all();
        if !self.diags.is_empty() {
            return Err(BuildError::Semantic {
                rendered: self.diags.render(&self.imports),
                count: self.diags.error_count(),
            });
        }
        self.trace("emitting IR");
        let module = self.emit_module();
        let header_text = if self.config.emit_header.is_some() {
            Some(self.emit_header())
        } else {
            None
        };
        Ok(BuildOutput {
            ll_text: module.to_ll_string(),
            header_text,
        })
    }
}
