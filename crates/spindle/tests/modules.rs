//! Module-structure validation: import resolution, exports, globals,
//! element/data segments, the start function, and rollback atomicity.

mod common;

use common::{env_shape, module_istream, translate_ok, translate_wat};
use spindle::env::{Environment, ExternalKind, TypedValue, INVALID_INDEX};
use spindle::TranslateError;

#[test]
fn empty_module_only_appends_a_module_entry() {
    let mut env = Environment::new();
    let module = translate_ok(&mut env, "(module)");
    assert_eq!(env_shape(&env), [0, 0, 0, 0, 0, 1, 0]);
    let defined = env.modules[module].as_defined().unwrap();
    assert_eq!(defined.istream_start, defined.istream_end);
}

#[test]
fn types_are_appended_in_declaration_order() {
    let mut env = Environment::new();
    translate_ok(
        &mut env,
        r#"
            (module
                (type (func (param i32) (result i32)))
                (type (func (param i64 f32)))
                (type (func)))
        "#,
    );
    use spindle::env::ValueType::*;
    assert_eq!(env.sigs.len(), 3);
    assert_eq!(env.sigs[0].param_types, [I32]);
    assert_eq!(env.sigs[0].result_types, [I32]);
    assert_eq!(env.sigs[1].param_types, [I64, F32]);
    assert!(env.sigs[2].param_types.is_empty());
}

#[test]
fn unknown_import_module_rolls_back() {
    let mut env = Environment::new();
    let before = env_shape(&env);
    let err = translate_wat(&mut env, r#"(module (import "nope" "f" (func)))"#).unwrap_err();
    assert!(matches!(err, TranslateError::UnknownImportModule { .. }));
    assert_eq!(env_shape(&env), before);
}

#[test]
fn unknown_import_field() {
    let mut env = Environment::new();
    let provider = translate_ok(
        &mut env,
        r#"(module (func) (export "f" (func 0)))"#,
    );
    env.register_module("m", provider);

    let before = env_shape(&env);
    let err =
        translate_wat(&mut env, r#"(module (import "m" "g" (func)))"#).unwrap_err();
    assert!(matches!(err, TranslateError::UnknownImportField { .. }));
    assert_eq!(env_shape(&env), before);
}

#[test]
fn import_kind_mismatch() {
    let mut env = Environment::new();
    let provider = translate_ok(
        &mut env,
        r#"(module (func) (export "f" (func 0)))"#,
    );
    env.register_module("m", provider);

    let err = translate_wat(
        &mut env,
        r#"(module (import "m" "f" (global i32)))"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TranslateError::ImportKindMismatch {
            expected: ExternalKind::Global,
            actual: ExternalKind::Func,
            ..
        }
    ));
}

#[test]
fn import_signature_mismatch_leaves_environment_unchanged() {
    let mut env = Environment::new();
    let provider = translate_ok(
        &mut env,
        r#"
            (module
                (func (param i64) (result i32) i32.const 0)
                (export "f" (func 0)))
        "#,
    );
    env.register_module("m", provider);

    let before = env_shape(&env);
    let err = translate_wat(
        &mut env,
        r#"(module (import "m" "f" (func (param i32) (result i32))))"#,
    )
    .unwrap_err();
    assert!(matches!(err, TranslateError::ImportSignatureMismatch));
    assert_eq!(env_shape(&env), before);
}

#[test]
fn import_signature_match_resolves_to_provider_function() {
    let mut env = Environment::new();
    let provider = translate_ok(
        &mut env,
        r#"
            (module
                (func (param i64) (result i32) i32.const 0)
                (export "f" (func 0)))
        "#,
    );
    env.register_module("m", provider);

    translate_ok(
        &mut env,
        r#"(module (import "m" "f" (func (param i64) (result i32))))"#,
    );
    // No new function was created for the import.
    assert_eq!(env.funcs.len(), 1);
}

#[test]
fn memory_import_limits_checks() {
    let mut env = Environment::new();
    let provider = translate_ok(
        &mut env,
        r#"(module (memory 1 2) (export "mem" (memory 0)))"#,
    );
    env.register_module("m", provider);

    // Declared initial larger than actual.
    let err = translate_wat(
        &mut env,
        r#"(module (import "m" "mem" (memory 2)))"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TranslateError::LimitsInitialTooSmall {
            actual: 1,
            declared: 2
        }
    ));

    // Declared max smaller than actual max.
    let err = translate_wat(
        &mut env,
        r#"(module (import "m" "mem" (memory 1 1)))"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TranslateError::LimitsMaxTooLarge {
            actual: 2,
            declared: 1
        }
    ));

    // Compatible declarations are accepted.
    translate_ok(&mut env, r#"(module (import "m" "mem" (memory 1 2)))"#);
    translate_ok(&mut env, r#"(module (import "m" "mem" (memory 1 4)))"#);
    translate_ok(&mut env, r#"(module (import "m" "mem" (memory 1)))"#);
}

#[test]
fn memory_import_requires_max_when_declared() {
    let mut env = Environment::new();
    let provider = translate_ok(
        &mut env,
        r#"(module (memory 1) (export "mem" (memory 0)))"#,
    );
    env.register_module("m", provider);

    let err = translate_wat(
        &mut env,
        r#"(module (import "m" "mem" (memory 1 2)))"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TranslateError::LimitsMaxUnspecified { declared: 2 }
    ));
}

#[test]
fn global_import_checks_type_and_mutability() {
    let mut env = Environment::new();
    let provider = translate_ok(
        &mut env,
        r#"(module (global i32 (i32.const 3)) (export "g" (global 0)))"#,
    );
    env.register_module("m", provider);

    let err = translate_wat(
        &mut env,
        r#"(module (import "m" "g" (global i64)))"#,
    )
    .unwrap_err();
    assert!(matches!(err, TranslateError::GlobalImportTypeMismatch { .. }));

    let err = translate_wat(
        &mut env,
        r#"(module (import "m" "g" (global (mut i32))))"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TranslateError::GlobalImportMutabilityMismatch { .. }
    ));

    translate_ok(&mut env, r#"(module (import "m" "g" (global i32)))"#);
}

#[test]
fn duplicate_export_is_rejected() {
    let mut env = Environment::new();
    let err = translate_wat(
        &mut env,
        r#"
            (module
                (func)
                (export "f" (func 0))
                (export "f" (func 0)))
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, TranslateError::DuplicateExport { .. }));
}

#[test]
fn mutable_global_export_is_rejected() {
    let mut env = Environment::new();
    let before = env_shape(&env);
    let err = translate_wat(
        &mut env,
        r#"
            (module
                (global (mut i32) (i32.const 1))
                (export "g" (global 0)))
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, TranslateError::MutableGlobalExport));
    assert_eq!(env_shape(&env), before, "module must not be added");
}

#[test]
fn export_indices_are_environment_global() {
    let mut env = Environment::new();
    // Occupy environment slots first.
    translate_ok(&mut env, "(module (func))");
    let module = translate_ok(
        &mut env,
        r#"
            (module
                (func)
                (memory 1)
                (export "f" (func 0))
                (export "mem" (memory 0)))
        "#,
    );

    let f = env.modules[module].export_by_name("f").unwrap();
    assert_eq!(f.kind, ExternalKind::Func);
    assert_eq!(f.index, 1); // second function in the environment
    let mem = env.modules[module].export_by_name("mem").unwrap();
    assert_eq!(mem.index, 0);
}

#[test]
fn immutable_global_write_is_rejected() {
    let mut env = Environment::new();
    let err = translate_wat(
        &mut env,
        r#"
            (module
                (global i32 (i32.const 1))
                (func
                    i32.const 2
                    global.set 0))
        "#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TranslateError::ImmutableGlobalWrite { index: 0 }
    ));
}

#[test]
fn global_init_type_mismatch() {
    let mut env = Environment::new();
    let err = translate_wat(
        &mut env,
        r#"(module (global i32 (i64.const 1)))"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TranslateError::InitTypeMismatch {
            context: "global",
            ..
        }
    ));
}

#[test]
fn global_init_value_is_stored() {
    let mut env = Environment::new();
    translate_ok(
        &mut env,
        r#"
            (module
                (global i32 (i32.const 41))
                (global (mut i64) (i64.const 9)))
        "#,
    );
    assert_eq!(env.globals[0].value, TypedValue::I32(41));
    assert!(!env.globals[0].mutable);
    assert_eq!(env.globals[1].value, TypedValue::I64(9));
    assert!(env.globals[1].mutable);
}

#[test]
fn init_expr_may_not_reference_module_local_global() {
    let mut env = Environment::new();
    let err = translate_wat(
        &mut env,
        r#"
            (module
                (global i32 (i32.const 1))
                (global i32 (global.get 0)))
        "#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TranslateError::InitReferencesNonImportedGlobal
    ));
}

#[test]
fn init_expr_via_imported_global() {
    let mut env = Environment::new();
    let provider = translate_ok(
        &mut env,
        r#"(module (global i32 (i32.const 7)) (export "g" (global 0)))"#,
    );
    env.register_module("m", provider);

    translate_ok(
        &mut env,
        r#"
            (module
                (import "m" "g" (global i32))
                (global i32 (global.get 0)))
        "#,
    );
    // The imported value was copied into the new global.
    assert_eq!(env.globals[1].value, TypedValue::I32(7));
}

#[test]
fn duplicate_memory_and_table_are_rejected() {
    let mut env = Environment::new();
    let err = translate_wat(&mut env, "(module (memory 1) (memory 1))").unwrap_err();
    assert!(matches!(err, TranslateError::DuplicateMemory));

    let err = translate_wat(
        &mut env,
        "(module (table 1 funcref) (table 1 funcref))",
    )
    .unwrap_err();
    assert!(matches!(err, TranslateError::DuplicateTable));
}

#[test]
fn memory_ops_require_a_memory() {
    let mut env = Environment::new();
    let err = translate_wat(
        &mut env,
        r#"
            (module
                (func
                    i32.const 0
                    i32.load
                    drop))
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, TranslateError::MissingMemory { .. }));
}

#[test]
fn call_indirect_requires_a_table() {
    let mut env = Environment::new();
    let err = translate_wat(
        &mut env,
        r#"
            (module
                (func
                    i32.const 0
                    call_indirect))
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, TranslateError::MissingTable));
}

#[test]
fn alignment_against_natural_alignment() {
    let mut env = Environment::new();
    // Exactly natural: accepted.
    translate_ok(
        &mut env,
        r#"
            (module
                (memory 1)
                (func
                    i32.const 0
                    i32.load align=4
                    drop))
        "#,
    );

    // Over-aligned: rejected.
    let err = translate_wat(
        &mut env,
        r#"
            (module
                (memory 1)
                (func
                    i32.const 0
                    i32.load align=8
                    drop))
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, TranslateError::AlignmentTooLarge { natural: 4 }));

    // Sub-width accesses have their own natural alignment.
    let err = translate_wat(
        &mut env,
        r#"
            (module
                (memory 1)
                (func
                    i32.const 0
                    i32.const 0
                    i32.store16 align=4))
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, TranslateError::AlignmentTooLarge { natural: 2 }));
}

#[test]
fn invalid_local_index() {
    let mut env = Environment::new();
    let err = translate_wat(
        &mut env,
        r#"(module (func (param i32) local.get 1 drop))"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TranslateError::InvalidLocalIndex { index: 1, max: 1 }
    ));
}

#[test]
fn data_segment_bounds() {
    // End exactly at the memory size: accepted.
    let mut env = Environment::new();
    translate_ok(
        &mut env,
        r#"(module (memory 1) (data (i32.const 65535) "a"))"#,
    );
    assert_eq!(env.memories[0].data[65535], b'a');

    // One byte past: rejected, with the exact range in the diagnostic.
    let mut env = Environment::new();
    let err = translate_wat(
        &mut env,
        r#"(module (memory 1) (data (i32.const 65536) "a"))"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TranslateError::DataOutOfBounds {
            address: 65536,
            end: 65537,
            max: 65536
        }
    ));
    assert_eq!(
        err.to_string(),
        "data segment is out of bounds: [65536, 65537) >= max value 65536"
    );

    // Empty segment at the very end: accepted, no effect recorded.
    let mut env = Environment::new();
    translate_ok(
        &mut env,
        r#"(module (memory 1) (data (i32.const 65536) ""))"#,
    );
    assert!(env.memories[0].data.iter().all(|&b| b == 0));
}

#[test]
fn data_segment_offset_must_be_i32() {
    let mut env = Environment::new();
    let err = translate_wat(
        &mut env,
        r#"(module (memory 1) (data (i64.const 0) "a"))"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TranslateError::InitTypeMismatch {
            context: "data segment",
            ..
        }
    ));
}

#[test]
fn element_segment_bounds_and_commit() {
    let mut env = Environment::new();
    translate_ok(
        &mut env,
        r#"
            (module
                (table 3 funcref)
                (func $a)
                (func $b)
                (elem (i32.const 1) $a $b))
        "#,
    );
    assert_eq!(env.tables[0].func_indexes, [INVALID_INDEX, 0, 1]);

    // Offset equal to the table size is out of bounds.
    let mut env = Environment::new();
    let err = translate_wat(
        &mut env,
        r#"
            (module
                (table 2 funcref)
                (func)
                (elem (i32.const 2) 0))
        "#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TranslateError::ElementOutOfBounds { offset: 2, max: 2 }
    ));

    // Function index out of range.
    let mut env = Environment::new();
    let err = translate_wat(
        &mut env,
        r#"
            (module
                (table 2 funcref)
                (func)
                (elem (i32.const 0) 0 1))
        "#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TranslateError::InvalidFuncIndex { index: 1, max: 1 }
    ));
}

#[test]
fn failed_translation_does_not_touch_imported_memory() {
    let mut env = Environment::new();
    let provider = translate_ok(
        &mut env,
        r#"(module (memory 1) (export "mem" (memory 0)))"#,
    );
    env.register_module("m", provider);

    // The first segment validates and is deferred; the second fails. Nothing
    // may have been committed to the provider's memory.
    let err = translate_wat(
        &mut env,
        r#"
            (module
                (import "m" "mem" (memory 1))
                (data (i32.const 0) "hi")
                (data (i32.const 65536) "x"))
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, TranslateError::DataOutOfBounds { .. }));
    assert_eq!(&env.memories[0].data[..2], [0, 0]);

    // The same module without the bad segment commits on EndModule.
    translate_ok(
        &mut env,
        r#"
            (module
                (import "m" "mem" (memory 1))
                (data (i32.const 0) "hi"))
        "#,
    );
    assert_eq!(&env.memories[0].data[..2], b"hi");
}

#[test]
fn start_function_checks() {
    let mut env = Environment::new();
    let module = translate_ok(&mut env, "(module (func) (start 0))");
    assert_eq!(
        env.modules[module].as_defined().unwrap().start_func_index,
        Some(0)
    );

    let err = translate_wat(
        &mut env,
        "(module (func (param i32)) (start 0))",
    )
    .unwrap_err();
    assert!(matches!(err, TranslateError::StartFunctionMustBeNullary));

    let err = translate_wat(
        &mut env,
        "(module (func (result i32) i32.const 1) (start 0))",
    )
    .unwrap_err();
    assert!(matches!(err, TranslateError::StartFunctionMustNotReturn));
}

#[test]
fn type_errors_are_propagated_from_the_checker() {
    let mut env = Environment::new();
    let err = translate_wat(
        &mut env,
        "(module (func (result i32) i64.const 0))",
    )
    .unwrap_err();
    assert!(matches!(err, TranslateError::TypeCheck(_)));

    let err = translate_wat(
        &mut env,
        r#"
            (module
                (func
                    i32.const 0
                    f32.const 1
                    i32.add
                    drop))
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, TranslateError::TypeCheck(_)));
}

#[test]
fn dead_code_after_unreachable_translates() {
    let mut env = Environment::new();
    translate_ok(
        &mut env,
        r#"
            (module
                (func (param i32) (result i32)
                    unreachable
                    i32.add))
        "#,
    );
}

#[test]
fn istream_error_rolls_back_istream_bytes() {
    let mut env = Environment::new();
    translate_ok(&mut env, "(module (func))");
    let len_before = env.istream.len();

    // Fails midway through a function body, after bytes were emitted.
    translate_wat(
        &mut env,
        r#"
            (module
                (func (result i32)
                    i32.const 1
                    i64.const 2
                    i32.add))
        "#,
    )
    .unwrap_err();
    assert_eq!(env.istream.len(), len_before);
}

#[test]
fn retranslating_into_the_same_environment_appends() {
    let mut env = Environment::new();
    let first = translate_ok(&mut env, "(module (func (result i32) i32.const 1))");
    let second = translate_ok(&mut env, "(module (func (result i32) i32.const 1))");
    assert_eq!(
        module_istream(&env, first),
        module_istream(&env, second)
    );
    let a = env.modules[first].as_defined().unwrap();
    let b = env.modules[second].as_defined().unwrap();
    assert_eq!(a.istream_end, b.istream_start);
}
