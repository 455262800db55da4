//! Semantic analysis tests: typing, constant folding, and diagnostics,
//! driven through real source text.

use boron::{BuildConfig, Compilation};
use pretty_assertions::assert_eq;

fn analyze(source: &str) -> Compilation {
    let mut comp = Compilation::new(BuildConfig::default());
    let root = comp
        .add_source_import(comp.root_package, "main.bn".into(), source.to_owned())
        .expect("front end failed");
    comp.root_import = Some(root);
    comp.analyze_all();
    comp
}

fn error_messages(comp: &Compilation) -> Vec<String> {
    comp.diags.iter().map(|d| d.msg.clone()).collect()
}

fn assert_clean(comp: &Compilation) {
    assert_eq!(error_messages(comp), Vec::<String>::new());
}

/// Looks up a top-level variable's type name.
fn global_type_name(comp: &Compilation, name: &str) -> String {
    let id = comp.interner.lookup(name).expect("name not interned");
    let scope = comp
        .imports
        .get(comp.root_import.unwrap())
        .scope
        .expect("no root scope");
    let decl = comp.scopes.find_decl(scope, id).expect("decl not found");
    let var = comp.decl_vars.get(&decl).expect("not a variable decl");
    comp.types.name(comp.scopes.var(*var).ty).to_owned()
}

#[test]
fn peer_typing_with_num_lit_branches() {
    let comp = analyze("fn f(b: bool) -> i32 { if (b) 1 else 2 }");
    assert_clean(&comp);
}

#[test]
fn maybe_pointer_global_resolves() {
    let comp = analyze("var x: ?*mut u8 = null;");
    assert_clean(&comp);
    assert_eq!(global_type_name(&comp, "x"), "?*mut u8");
}

#[test]
fn error_unwrap_binding_types() {
    let comp = analyze(
        "error Oops;\n\
         fn a() -> %i32 { return Oops; }\n\
         fn f() -> %i32 { const v = a() %% err => return err; return v; }",
    );
    assert_clean(&comp);
}

#[test]
fn array_to_slice_implicit_cast() {
    let comp = analyze(
        "const xs = [3]i32{1, 2, 3};\n\
         fn f() -> isize { const s: []const i32 = xs; return s.len; }",
    );
    assert_clean(&comp);
    assert_eq!(global_type_name(&comp, "xs"), "[3]i32");
}

#[test]
fn enum_switch_must_be_exhaustive() {
    let source_missing = "enum Shape { A, B, C }\n\
         fn f(s: Shape) -> i32 { return switch (s) { A => 1, B => 2 }; }";
    let comp = analyze(source_missing);
    let messages = error_messages(&comp);
    assert_eq!(messages.len(), 1);
    assert!(
        messages[0].contains("enumeration value 'C' not handled"),
        "got: {messages:?}"
    );

    let source_complete = "enum Shape { A, B, C }\n\
         fn f(s: Shape) -> i32 { return switch (s) { A => 1, B => 2, C => 3 }; }";
    assert_clean(&analyze(source_complete));
}

#[test]
fn decl_cycle_reports_once() {
    let comp = analyze("const x = y;\nconst y = x;");
    let messages = error_messages(&comp);
    let cycles: Vec<&String> = messages.iter().filter(|m| m.contains("depends on itself")).collect();
    assert_eq!(cycles.len(), 1, "got: {messages:?}");
}

#[test]
fn infinite_struct_reports_once() {
    let comp = analyze("struct S { x: S }");
    let messages = error_messages(&comp);
    assert_eq!(messages, vec!["struct 'S' has infinite size".to_owned()]);
}

#[test]
fn self_referential_struct_through_pointer_is_fine() {
    let comp = analyze("struct Node { next: ?*mut Node, value: i32 }");
    assert_clean(&comp);
}

#[test]
fn redefinition_carries_a_note() {
    let comp = analyze("const x = 1;\nconst x = 2;");
    let diag = comp.diags.iter().next().expect("no diagnostic");
    assert!(diag.msg.contains("redefinition of 'x'"));
    assert_eq!(diag.notes.len(), 1);
    assert!(diag.notes[0].msg.contains("previous definition"));
}

#[test]
fn undeclared_identifier() {
    let comp = analyze("fn f() -> i32 { return nope; }");
    let messages = error_messages(&comp);
    assert!(
        messages.iter().any(|m| m.contains("use of undeclared identifier 'nope'")),
        "got: {messages:?}"
    );
}

#[test]
fn expected_type_mismatch_message() {
    let comp = analyze("const x: i32 = true;");
    let messages = error_messages(&comp);
    assert!(
        messages.iter().any(|m| m.contains("expected type 'i32', got 'bool'")),
        "got: {messages:?}"
    );
}

#[test]
fn num_lit_must_fit_target() {
    let comp = analyze("const x: u8 = 300;");
    let messages = error_messages(&comp);
    assert!(
        messages
            .iter()
            .any(|m| m.contains("value 300 cannot be implicitly casted to type 'u8'")),
        "got: {messages:?}"
    );
}

#[test]
fn const_division_by_zero() {
    let comp = analyze("const x = 1 / 0;");
    let messages = error_messages(&comp);
    assert!(
        messages.iter().any(|m| m.contains("division by zero")),
        "got: {messages:?}"
    );
}

#[test]
fn const_overflow_in_sized_arithmetic() {
    let comp = analyze("fn f(a: u8) -> u8 { const b: u8 = 200; return b + 100; }");
    let messages = error_messages(&comp);
    assert!(
        messages.iter().any(|m| m.contains("operation caused overflow")),
        "got: {messages:?}"
    );
}

#[test]
fn string_concat_is_a_const_slice() {
    let comp = analyze("const s = \"foo\" + \"bar\";");
    assert_clean(&comp);
    assert_eq!(global_type_name(&comp, "s"), "[]const u8");
}

#[test]
fn if_maybe_binds_the_payload() {
    let comp = analyze("fn f(x: ?i32) -> i32 { if (x) |v| { return v; } return 0; }");
    assert_clean(&comp);
}

#[test]
fn unwrap_prefix_operators() {
    let comp = analyze(
        "fn g() -> %i32 { return 7; }\n\
         fn h() -> ?i32 { return 7; }\n\
         fn f() -> i32 { return %%g() + ??h(); }",
    );
    assert_clean(&comp);
}

#[test]
fn switch_payload_capture_types() {
    let comp = analyze(
        "enum Shape { Circle: f32, Square }\n\
         fn f(s: Shape) -> f32 { return switch (s) { Circle => |r| r, else => 0.0 }; }",
    );
    assert_clean(&comp);
}

#[test]
fn duplicate_switch_value_rejected() {
    let comp = analyze(
        "fn f(x: i32) -> i32 { return switch (x) { 1 => 10, 1 => 20, else => 0 }; }",
    );
    let messages = error_messages(&comp);
    assert!(
        messages.iter().any(|m| m.contains("duplicate switch value")),
        "got: {messages:?}"
    );
}

#[test]
fn unknown_error_return_through_conditional_defer_rejected() {
    let comp = analyze(
        "error Bad;\n\
         fn c() { }\n\
         fn g(flag: bool) -> %i32 { if (flag) { return Bad; } return 1; }\n\
         fn f(flag: bool) -> %i32 { errdefer c(); return g(flag); }",
    );
    let messages = error_messages(&comp);
    assert!(
        messages
            .iter()
            .any(|m| m.contains("conditional defers")),
        "got: {messages:?}"
    );
}

#[test]
fn errdefer_requires_error_returning_fn() {
    let comp = analyze("fn c() { }\nfn f() { errdefer c(); }");
    let messages = error_messages(&comp);
    assert!(
        messages
            .iter()
            .any(|m| m.contains("errdefer in function that does not return an error")),
        "got: {messages:?}"
    );
}

#[test]
fn break_outside_loop_rejected() {
    let comp = analyze("fn f() { break; }");
    let messages = error_messages(&comp);
    assert!(
        messages.iter().any(|m| m.contains("'break' outside loop")),
        "got: {messages:?}"
    );
}

#[test]
fn compile_var_known_keys_only() {
    let comp = analyze("const r = @compile_var(\"is_release\");");
    assert_clean(&comp);
    let comp = analyze("const r = @compile_var(\"is_fast\");");
    let messages = error_messages(&comp);
    assert!(
        messages
            .iter()
            .any(|m| m.contains("unknown compile variable: 'is_fast'")),
        "got: {messages:?}"
    );
}

#[test]
fn const_eval_requires_constant() {
    let comp = analyze("fn g(x: i32) -> i32 { return x; }\nfn f(x: i32) -> i32 { return @const_eval(g(x)); }");
    let messages = error_messages(&comp);
    assert!(
        messages
            .iter()
            .any(|m| m.contains("unable to evaluate constant expression")),
        "got: {messages:?}"
    );
}

#[test]
fn sizeof_and_friends_fold() {
    let comp = analyze(
        "struct Pair { a: i32, b: i32 }\n\
         const size = @sizeof(Pair);\n\
         const align = @alignof(i64);\n\
         const members = @member_count(Pair);\n\
         const max = @max_value(u8);\n\
         const zeros = @ctz(u8, 8);",
    );
    assert_clean(&comp);
}

#[test]
fn typeof_yields_a_type() {
    let comp = analyze("const x = 5;\nconst T = @typeof(x);\nvar y: T = 7;");
    // `T` is the literal's unsized type, which cannot back storage
    let messages = error_messages(&comp);
    assert!(!messages.is_empty());

    let comp = analyze("const x: i32 = 5;\nconst T = @typeof(x);\nvar y: T = 7;");
    assert_clean(&comp);
}

#[test]
fn missing_import_is_reported_and_suppresses_cascades() {
    let comp = analyze(
        "const io = @import(\"missing.bn\");\n\
         fn f() -> i32 { return whatever; }",
    );
    let messages = error_messages(&comp);
    assert!(
        messages.iter().any(|m| m.contains("unable to find 'missing.bn'")),
        "got: {messages:?}"
    );
    // unresolved identifiers inside a tainted import stay quiet
    assert!(
        !messages.iter().any(|m| m.contains("whatever")),
        "got: {messages:?}"
    );
}

#[test]
fn import_and_use_pull_public_decls() {
    let dir = std::env::temp_dir().join(format!("boron_import_test_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("lib.bn"),
        "pub fn helper() -> i32 { return 41; }\npub const answer: i32 = 42;\nfn private_helper() { }\n",
    )
    .unwrap();

    let mut comp = Compilation::new(BuildConfig::default());
    comp.imports.package_mut(comp.root_package).root_src_dir = dir.clone();
    let root = comp
        .add_source_import(
            comp.root_package,
            dir.join("main.bn"),
            "const lib = @import(\"lib.bn\");\n\
             fn f() -> i32 { return lib.helper() + lib.answer; }\n\
             use @import(\"lib.bn\");\n\
             fn g() -> i32 { return helper(); }\n"
                .to_owned(),
        )
        .unwrap();
    comp.root_import = Some(root);
    comp.analyze_all();
    assert_clean(&comp);

    // private decls are not importable
    let mut comp = Compilation::new(BuildConfig::default());
    comp.imports.package_mut(comp.root_package).root_src_dir = dir.clone();
    let root = comp
        .add_source_import(
            comp.root_package,
            dir.join("main2.bn"),
            "const lib = @import(\"lib.bn\");\n\
             fn f() { lib.private_helper(); }\n"
                .to_owned(),
        )
        .unwrap();
    comp.root_import = Some(root);
    comp.analyze_all();
    let messages = error_messages(&comp);
    assert!(
        messages.iter().any(|m| m.contains("'private_helper' is private")),
        "got: {messages:?}"
    );
}

#[test]
fn asm_is_rejected() {
    let comp = analyze("fn f() { asm(\"nop\"); }");
    let messages = error_messages(&comp);
    assert!(
        messages.iter().any(|m| m.contains("inline assembly is not supported")),
        "got: {messages:?}"
    );
}

#[test]
fn c_define_is_rejected() {
    let comp = analyze("fn f() { @c_define(\"X\"); }");
    let messages = error_messages(&comp);
    assert!(
        messages.iter().any(|m| m.contains("'@c_define' is not supported")),
        "got: {messages:?}"
    );
}

#[test]
fn fn_attribute_and_condition_directives() {
    let comp = analyze(
        "#attribute(\"cold\")\nfn rarely() { }\n\
         #condition(false)\nexport fn hidden() { }\n\
         #attribute(\"bogus\")\nfn bad() { }",
    );
    let messages = error_messages(&comp);
    assert_eq!(messages.len(), 1, "got: {messages:?}");
    assert!(messages[0].contains("invalid function attribute: 'bogus'"));
}

#[test]
fn error_values_deduplicate_by_name() {
    let comp = analyze(
        "error A;\nerror B;\n\
         fn f() -> u16 { return u16(A); }",
    );
    assert_clean(&comp);
    assert_eq!(comp.error_values.len(), 2);
    let values: Vec<u64> = comp.error_values.values().map(|e| e.value).collect();
    assert_eq!(values, vec![1, 2]);
}

#[test]
fn assignment_to_const_rejected() {
    let comp = analyze("fn f() { const x = 1; x = 2; }");
    let messages = error_messages(&comp);
    assert!(
        messages.iter().any(|m| m.contains("cannot assign to constant 'x'")),
        "got: {messages:?}"
    );
}

#[test]
fn global_initializer_must_be_constant() {
    let comp = analyze("fn g() -> i32 { return 3; }\nvar x: i32 = g();");
    let messages = error_messages(&comp);
    assert!(
        messages
            .iter()
            .any(|m| m.contains("unable to evaluate constant expression")),
        "got: {messages:?}"
    );
}
