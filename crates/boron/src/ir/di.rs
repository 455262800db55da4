//! DWARF debug-info metadata builder.
//!
//! Metadata nodes are appended to one arena and referenced as `!N` in the
//! rendered module. Composite types use the replaceable pattern: a
//! placeholder node is created first so self-referential types through
//! pointers can name it, then its text is replaced once the member list is
//! known.

use strum::IntoStaticStr;

/// Handle to one metadata node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MdId(u32);

impl MdId {
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// DWARF base-type encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum DwarfEncoding {
    #[strum(serialize = "DW_ATE_signed")]
    Signed,
    #[strum(serialize = "DW_ATE_unsigned")]
    Unsigned,
    #[strum(serialize = "DW_ATE_float")]
    Float,
    #[strum(serialize = "DW_ATE_boolean")]
    Boolean,
    #[strum(serialize = "DW_ATE_signed_char")]
    SignedChar,
    #[strum(serialize = "DW_ATE_unsigned_char")]
    UnsignedChar,
}

#[derive(Debug)]
pub struct DebugInfo {
    nodes: Vec<String>,
    compile_unit: Option<MdId>,
    module_name: String,
    /// True once a placeholder exists that was never replaced; finalize
    /// panics on this in debug builds.
    open_placeholders: Vec<MdId>,
}

impl DebugInfo {
    pub fn new(module_name: &str) -> Self {
        Self {
            nodes: Vec::new(),
            compile_unit: None,
            module_name: module_name.to_owned(),
            open_placeholders: Vec::new(),
        }
    }

    fn push(&mut self, text: String) -> MdId {
        let id = MdId(u32::try_from(self.nodes.len()).expect("metadata overflow"));
        self.nodes.push(text);
        id
    }

    pub fn create_file(&mut self, filename: &str, directory: &str) -> MdId {
        self.push(format!(
            "!DIFile(filename: \"{filename}\", directory: \"{directory}\")"
        ))
    }

    pub fn create_compile_unit(&mut self, file: MdId, is_optimized: bool) -> MdId {
        let id = self.push(format!(
            "distinct !DICompileUnit(language: DW_LANG_C99, file: !{}, producer: \"boron\", isOptimized: {is_optimized}, runtimeVersion: 0, emissionKind: FullDebug)",
            file.raw()
        ));
        self.compile_unit = Some(id);
        id
    }

    pub fn compile_unit(&self) -> Option<MdId> {
        self.compile_unit
    }

    pub fn create_basic_type(&mut self, name: &str, size_bits: u64, encoding: DwarfEncoding) -> MdId {
        let encoding_name: &'static str = encoding.into();
        self.push(format!(
            "!DIBasicType(name: \"{name}\", size: {size_bits}, encoding: {encoding_name})"
        ))
    }

    pub fn create_pointer_type(&mut self, pointee: Option<MdId>, size_bits: u64, name: &str) -> MdId {
        let base = match pointee {
            Some(id) => format!(", baseType: !{}", id.raw()),
            None => String::new(),
        };
        self.push(format!(
            "!DIDerivedType(tag: DW_TAG_pointer_type, name: \"{name}\"{base}, size: {size_bits})"
        ))
    }

    /// A temporary forward declaration for a composite type; must be
    /// replaced with `replace_composite` before finalize.
    pub fn create_replaceable_composite(&mut self, name: &str) -> MdId {
        let id = self.push(format!(
            "!DICompositeType(tag: DW_TAG_structure_type, name: \"{name}\", flags: DIFlagFwdDecl)"
        ));
        self.open_placeholders.push(id);
        id
    }

    /// Fills a placeholder's definition once field types are known.
    pub fn replace_composite(&mut self, id: MdId, text: String) {
        self.nodes[id.0 as usize] = text;
        self.open_placeholders.retain(|&p| p != id);
    }

    pub fn create_member_type(
        &mut self,
        scope: MdId,
        name: &str,
        file: MdId,
        line: u32,
        size_bits: u64,
        offset_bits: u64,
        base: MdId,
    ) -> MdId {
        self.push(format!(
            "!DIDerivedType(tag: DW_TAG_member, name: \"{name}\", scope: !{}, file: !{}, line: {line}, baseType: !{}, size: {size_bits}, offset: {offset_bits})",
            scope.raw(),
            file.raw(),
            base.raw()
        ))
    }

    /// Struct definition text for `replace_composite`.
    pub fn struct_type_text(
        &mut self,
        name: &str,
        file: MdId,
        line: u32,
        size_bits: u64,
        align_bits: u64,
        members: &[MdId],
    ) -> String {
        let elements = self.create_tuple(members);
        format!(
            "!DICompositeType(tag: DW_TAG_structure_type, name: \"{name}\", file: !{}, line: {line}, size: {size_bits}, align: {align_bits}, elements: !{})",
            file.raw(),
            elements.raw()
        )
    }

    pub fn union_type_text(
        &mut self,
        name: &str,
        file: MdId,
        line: u32,
        size_bits: u64,
        members: &[MdId],
    ) -> String {
        let elements = self.create_tuple(members);
        format!(
            "!DICompositeType(tag: DW_TAG_union_type, name: \"{name}\", file: !{}, line: {line}, size: {size_bits}, elements: !{})",
            file.raw(),
            elements.raw()
        )
    }

    pub fn create_enumerator(&mut self, name: &str, value: u64) -> MdId {
        self.push(format!("!DIEnumerator(name: \"{name}\", value: {value})"))
    }

    pub fn create_enumeration_type(
        &mut self,
        name: &str,
        file: MdId,
        line: u32,
        size_bits: u64,
        enumerators: &[MdId],
    ) -> MdId {
        let elements = self.create_tuple(enumerators);
        self.push(format!(
            "!DICompositeType(tag: DW_TAG_enumeration_type, name: \"{name}\", file: !{}, line: {line}, size: {size_bits}, elements: !{})",
            file.raw(),
            elements.raw()
        ))
    }

    pub fn create_array_type(&mut self, base: MdId, count: u64, size_bits: u64) -> MdId {
        let subrange = self.push(format!("!DISubrange(count: {count})"));
        let elements = self.create_tuple(&[subrange]);
        self.push(format!(
            "!DICompositeType(tag: DW_TAG_array_type, baseType: !{}, size: {size_bits}, elements: !{})",
            base.raw(),
            elements.raw()
        ))
    }

    /// Subroutine type; `None` entries mean void.
    pub fn create_subroutine_type(&mut self, types: &[Option<MdId>]) -> MdId {
        let inner: Vec<String> = types
            .iter()
            .map(|t| match t {
                Some(id) => format!("!{}", id.raw()),
                None => "null".to_owned(),
            })
            .collect();
        let tuple = self.push(format!("!{{{}}}", inner.join(", ")));
        self.push(format!("!DISubroutineType(types: !{})", tuple.raw()))
    }

    pub fn create_subprogram(
        &mut self,
        file: MdId,
        name: &str,
        linkage_name: &str,
        line: u32,
        ty: MdId,
        is_local: bool,
    ) -> MdId {
        let unit = self.compile_unit.expect("subprogram before compile unit");
        self.push(format!(
            "distinct !DISubprogram(name: \"{name}\", linkageName: \"{linkage_name}\", scope: !{file}, file: !{file}, line: {line}, type: !{ty}, scopeLine: {line}, spFlags: DISPFlagDefinition{local}, unit: !{unit})",
            file = file.raw(),
            ty = ty.raw(),
            local = if is_local { " | DISPFlagLocalToUnit" } else { "" },
            unit = unit.raw()
        ))
    }

    pub fn create_lexical_block(&mut self, scope: MdId, file: MdId, line: u32, column: u32) -> MdId {
        self.push(format!(
            "distinct !DILexicalBlock(scope: !{}, file: !{}, line: {line}, column: {column})",
            scope.raw(),
            file.raw()
        ))
    }

    pub fn create_auto_variable(
        &mut self,
        scope: MdId,
        name: &str,
        file: MdId,
        line: u32,
        ty: MdId,
    ) -> MdId {
        self.push(format!(
            "!DILocalVariable(name: \"{name}\", scope: !{}, file: !{}, line: {line}, type: !{})",
            scope.raw(),
            file.raw(),
            ty.raw()
        ))
    }

    /// Parameter variable with its 1-based argument index.
    pub fn create_parameter_variable(
        &mut self,
        scope: MdId,
        name: &str,
        arg_index: u32,
        file: MdId,
        line: u32,
        ty: MdId,
    ) -> MdId {
        self.push(format!(
            "!DILocalVariable(name: \"{name}\", arg: {arg_index}, scope: !{}, file: !{}, line: {line}, type: !{})",
            scope.raw(),
            file.raw(),
            ty.raw()
        ))
    }

    pub fn create_location(&mut self, line: u32, column: u32, scope: MdId) -> MdId {
        self.push(format!(
            "!DILocation(line: {line}, column: {column}, scope: !{})",
            scope.raw()
        ))
    }

    fn tuple_text(&self, ids: &[MdId]) -> String {
        let inner: Vec<String> = ids.iter().map(|id| format!("!{}", id.raw())).collect();
        format!("!{{{}}}", inner.join(", "))
    }

    /// Interns a tuple node and returns its id.
    pub fn create_tuple(&mut self, ids: &[MdId]) -> MdId {
        let text = self.tuple_text(ids);
        self.push(text)
    }

    /// Verifies all placeholders were replaced; called by the renderer.
    pub fn finalize(&self) {
        debug_assert!(
            self.open_placeholders.is_empty(),
            "unreplaced composite placeholders: {:?}",
            self.open_placeholders
        );
    }

    pub(crate) fn module_name(&self) -> &str {
        &self.module_name
    }

    pub(crate) fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub(crate) fn has_nodes(&self) -> bool {
        !self.nodes.is_empty()
    }
}
