//! IR emission tests: build real source and assert over the rendered
//! module text.

use boron::{BuildConfig, Compilation};

fn build_with(config: BuildConfig, source: &str) -> String {
    let mut comp = Compilation::new(config);
    comp.build_source("main.bn", source)
        .expect("build failed")
        .ll_text
}

fn build(source: &str) -> String {
    build_with(BuildConfig::default(), source)
}

fn release_config() -> BuildConfig {
    BuildConfig {
        release: true,
        ..BuildConfig::default()
    }
}

#[test]
fn const_branch_folds_to_constant_return() {
    let ll = build("fn f(b: bool) -> i32 { if (b) 1 else 2 }\nfn g() -> i32 { if (true) 1 else 2 }");
    // the constant condition folds to a constant return
    assert!(ll.contains("ret i32 1"), "{ll}");
    // the runtime condition keeps both branches
    assert!(ll.contains("br i1"), "{ll}");
}

#[test]
fn handle_return_uses_sret() {
    let ll = build(
        "struct Point { x: i32, y: i32 }\n\
         fn make() -> Point { return Point { x: 1, y: 2 }; }",
    );
    assert!(ll.contains("void @make(%Point* sret"), "{ll}");
    assert!(ll.contains("%Point = type { i32, i32 }"), "{ll}");
}

#[test]
fn maybe_pointer_is_a_null_pointer() {
    let ll = build("var x: ?*mut u8 = null;");
    assert!(ll.contains("@x = internal global i8* null"), "{ll}");
}

#[test]
fn array_to_slice_emits_ptr_len_pair() {
    let ll = build(
        "const xs = [3]i32{1, 2, 3};\n\
         fn f() -> isize { const s: []const i32 = xs; return s.len; }",
    );
    assert!(ll.contains("getelementptr inbounds ([3 x i32]"), "{ll}");
    assert!(ll.contains("i64 3"), "{ll}");
}

#[test]
fn compile_var_branch_emits_only_taken_side() {
    let source = "fn a() -> i32 { return 1; }\n\
         fn b() -> i32 { return 2; }\n\
         fn main() -> i32 { if (@compile_var(\"is_release\")) { return a(); } else { return b(); } }";
    let debug_ll = build(source);
    assert!(debug_ll.contains("call fastcc i32 @b("), "{debug_ll}");
    assert!(!debug_ll.contains("call fastcc i32 @a("), "{debug_ll}");

    let release_ll = build_with(release_config(), source);
    assert!(release_ll.contains("call fastcc i32 @a("), "{release_ll}");
    assert!(!release_ll.contains("call fastcc i32 @b("), "{release_ll}");
}

#[test]
fn overflow_intrinsic_lowering() {
    let ll = build(
        "fn f(a: i32, b: i32) -> bool { var out: i32 = 0; return @add_with_overflow(i32, a, b, &out); }",
    );
    assert!(ll.contains("@llvm.sadd.with.overflow.i32"), "{ll}");
    assert!(ll.contains("extractvalue"), "{ll}");
}

#[test]
fn unsigned_overflow_intrinsic_picks_unsigned_variant() {
    let ll = build(
        "fn f(a: u32, b: u32) -> bool { var out: u32 = 0; return @mul_with_overflow(u32, a, b, &out); }",
    );
    assert!(ll.contains("@llvm.umul.with.overflow.i32"), "{ll}");
}

#[test]
fn defers_unwind_innermost_first() {
    let ll = build(
        "fn a() { }\nfn b() { }\n\
         fn f() -> i32 { defer a(); defer b(); return 0; }",
    );
    let b_at = ll.find("call fastcc void @b(").expect("no call to b");
    let a_at = ll.find("call fastcc void @a(").expect("no call to a");
    assert!(b_at < a_at, "defers ran in the wrong order:\n{ll}");
}

#[test]
fn errdefer_runs_only_on_error_return() {
    let ll = build(
        "error Bad;\nfn cleanup() { }\n\
         fn f(flag: bool) -> %i32 { errdefer cleanup(); if (flag) { return Bad; } return 5; }",
    );
    let count = ll.matches("call fastcc void @cleanup(").count();
    assert_eq!(count, 1, "{ll}");
}

#[test]
fn string_constants_share_storage() {
    let ll = build(
        "fn f() -> u8 { const a = \"abc\"; const b = \"abc\"; return a[0] + b[1]; }",
    );
    let count = ll.matches("c\"abc\"").count();
    assert_eq!(count, 1, "{ll}");
}

#[test]
fn enum_switch_lowers_to_ir_switch_with_trap_default() {
    let ll = build(
        "enum Color { Red, Green, Blue }\n\
         fn f(c: Color) -> i32 { return switch (c) { Red => 1, Green => 2, Blue => 3 }; }",
    );
    assert!(ll.contains("switch i8"), "{ll}");
    // exhaustive enum switch still guards fallthrough in safe builds
    assert!(ll.contains("@llvm.debugtrap"), "{ll}");
}

#[test]
fn release_build_skips_safety_checks() {
    let ll = build_with(
        release_config(),
        "enum Color { Red, Green }\n\
         fn f(c: Color) -> i32 { return switch (c) { Red => 1, Green => 2 }; }",
    );
    assert!(!ll.contains("@llvm.debugtrap"), "{ll}");
}

#[test]
fn stack_slots_are_poisoned_in_safe_builds() {
    let source = "fn f() -> i32 { var x: i32 = 7; return x; }";
    let safe_ll = build(source);
    assert!(safe_ll.contains("@llvm.memset"), "{safe_ll}");
    let release_ll = build_with(release_config(), source);
    assert!(!release_ll.contains("@llvm.memset"), "{release_ll}");
}

#[test]
fn extern_fn_declares_with_c_convention() {
    let ll = build(
        "extern fn puts(s: *const u8) -> i32;\n\
         fn f() -> i32 { const s: []const u8 = \"hi\"; return puts(s.ptr); }",
    );
    assert!(ll.contains("declare i32 @puts(i8*)"), "{ll}");
}

#[test]
fn cold_functions_use_cold_convention() {
    let ll = build("#attribute(\"cold\")\nfn icy() { }\nfn f() { icy(); }");
    assert!(ll.contains("coldcc void @icy"), "{ll}");
    assert!(ll.contains("cold"), "{ll}");
}

#[test]
fn inline_functions_carry_alwaysinline() {
    let ll = build("inline fn tiny() -> i32 { return 3; }\nfn f() -> i32 { return tiny(); }");
    assert!(ll.contains("alwaysinline"), "{ll}");
}

#[test]
fn noreturn_fns_get_the_attribute() {
    let ll = build("fn out() -> unreachable { while (true) { } }");
    assert!(ll.contains("noreturn"), "{ll}");
}

#[test]
fn debug_info_is_emitted_and_strippable() {
    let source = "fn f(a: i32) -> i32 { var x: i32 = a; return x; }";
    let ll = build(source);
    assert!(ll.contains("!DICompileUnit"), "{ll}");
    assert!(ll.contains("DISubprogram"), "{ll}");
    assert!(ll.contains("DILocalVariable"), "{ll}");
    assert!(ll.contains("llvm.dbg.declare"), "{ll}");

    let stripped = build_with(
        BuildConfig {
            strip_debug: true,
            ..BuildConfig::default()
        },
        source,
    );
    assert!(!stripped.contains("!DICompileUnit"), "{stripped}");
}

#[test]
fn error_unwrap_branches_on_the_tag() {
    let ll = build(
        "error Nope;\n\
         fn get() -> %i32 { return 4; }\n\
         fn f() -> i32 { return get() %% err => 0; }",
    );
    assert!(ll.contains("icmp eq i16"), "{ll}");
    assert!(ll.contains("phi i32"), "{ll}");
}

#[test]
fn for_loop_reads_slice_length_from_header() {
    let ll = build(
        "fn sum(xs: []const i32) -> i32 {\n\
            var total: i32 = 0;\n\
            for (x : xs) { total += x; }\n\
            return total;\n\
         }",
    );
    // hidden index compare against the loaded len field
    assert!(ll.contains("icmp ult i64"), "{ll}");
    assert!(ll.contains("for_body"), "{ll}");
}

#[test]
fn while_loop_shape() {
    let ll = build("fn f(n: i32) { var i: i32 = 0; while (i < n) { i += 1; } }");
    assert!(ll.contains("while_cond"), "{ll}");
    assert!(ll.contains("while_body"), "{ll}");
    assert!(ll.contains("while_end"), "{ll}");
}

#[test]
fn exported_fn_header_emission() {
    let mut comp = Compilation::new(BuildConfig {
        emit_header: Some("out.h".into()),
        ..BuildConfig::default()
    });
    let output = comp
        .build_source(
            "main.bn",
            "export fn frob(a: i32, p: *const u8) -> u64 { return 0; }\nfn private_fn() { }",
        )
        .expect("build failed");
    let header = output.header_text.expect("no header");
    assert!(header.contains("#ifndef MAIN_H"), "{header}");
    assert!(header.contains("uint64_t frob(int32_t, const uint8_t *);"), "{header}");
    assert!(!header.contains("private_fn"), "{header}");
}

#[test]
fn memcpy_intrinsic_lowers_to_llvm_memcpy() {
    let ll = build("fn f(dst: *mut u8, src: *const u8, n: usize) { @memcpy(dst, src, n); }");
    assert!(ll.contains("@llvm.memcpy"), "{ll}");
}

#[test]
fn if_maybe_checks_the_present_flag() {
    let ll = build("fn f(x: ?i32) -> i32 { if (x) |v| { return v; } return 0; }");
    // maybe-with-payload reads the `{ value, present }` pair
    assert!(ll.contains("{ i32, i1 }"), "{ll}");
    assert!(ll.contains("br i1"), "{ll}");
}

#[test]
fn checked_unwrap_traps_in_safe_builds() {
    let source = "fn g() -> %i32 { return 7; }\nfn f() -> i32 { return %%g(); }";
    let safe_ll = build(source);
    assert!(safe_ll.contains("@llvm.debugtrap"), "{safe_ll}");
    let release_ll = build_with(release_config(), source);
    assert!(!release_ll.contains("@llvm.debugtrap"), "{release_ll}");
}

#[test]
fn main_uses_c_calling_convention() {
    let ll = build("fn main() -> i32 { return 0; }");
    assert!(ll.contains("define i32 @main()"), "{ll}");
}

#[test]
fn target_triple_in_module_header() {
    let ll = build("fn f() { }");
    assert!(ll.contains("target triple = \""), "{ll}");
}
