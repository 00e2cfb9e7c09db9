//! Host-module imports: delegate-materialized functions, tables, memories,
//! and globals, auto-exports on the host module, and `CallHost` emission.

mod common;

use common::{env_shape, module_istream, read_u32, translate_ok, translate_wat};
use spindle::env::{
    Environment, ExternalKind, FuncSignature, HostFuncHandler, HostImportDelegate, Import, Limits,
    Memory, Table, TypedValue, ValueType,
};
use spindle::TranslateError;

/// A host that accepts everything, answering globals with 42.
struct Host;

impl HostImportDelegate for Host {
    fn import_func(
        &mut self,
        _import: &Import,
        _sig: &FuncSignature,
    ) -> Result<HostFuncHandler, String> {
        Ok(Box::new(|_args| Ok(Vec::new())))
    }

    fn import_table(&mut self, _import: &Import, limits: &Limits) -> Result<Table, String> {
        Ok(Table::new(*limits))
    }

    fn import_memory(&mut self, _import: &Import, limits: &Limits) -> Result<Memory, String> {
        Ok(Memory::new(*limits))
    }

    fn import_global(
        &mut self,
        _import: &Import,
        ty: ValueType,
        _mutable: bool,
    ) -> Result<TypedValue, String> {
        match ty {
            ValueType::I32 => Ok(TypedValue::I32(42)),
            ValueType::I64 => Ok(TypedValue::I64(42)),
            ValueType::F32 => Ok(TypedValue::F32(0)),
            ValueType::F64 => Ok(TypedValue::F64(0)),
        }
    }
}

/// A host that rejects every import.
struct ClosedHost;

impl HostImportDelegate for ClosedHost {
    fn import_func(
        &mut self,
        import: &Import,
        _sig: &FuncSignature,
    ) -> Result<HostFuncHandler, String> {
        Err(format!("unknown host function \"{}\"", import.field_name))
    }

    fn import_table(&mut self, _import: &Import, _limits: &Limits) -> Result<Table, String> {
        Err("no host tables".to_string())
    }

    fn import_memory(&mut self, _import: &Import, _limits: &Limits) -> Result<Memory, String> {
        Err("no host memories".to_string())
    }

    fn import_global(
        &mut self,
        _import: &Import,
        _ty: ValueType,
        _mutable: bool,
    ) -> Result<TypedValue, String> {
        Err("no host globals".to_string())
    }
}

#[test]
fn host_function_call_emits_call_host() {
    let mut env = Environment::new();
    env.add_host_module("host", Box::new(Host));

    let module = translate_ok(
        &mut env,
        r#"
            (module
                (import "host" "log" (func (param i32)))
                (func
                    i32.const 5
                    call 0))
        "#,
    );

    assert!(env.funcs[0].is_host());
    let istream = module_istream(&env, module);
    assert_eq!(istream[10], 0xC2); // CallHost
    assert_eq!(read_u32(istream, 11), 0); // environment function index
}

#[test]
fn host_imports_are_auto_exported() {
    let mut env = Environment::new();
    let host_index = env.add_host_module("host", Box::new(Host));

    translate_ok(
        &mut env,
        r#"
            (module
                (import "host" "log" (func (param i32)))
                (import "host" "mem" (memory 1)))
        "#,
    );

    let host = &env.modules[host_index];
    let log = host.export_by_name("log").unwrap();
    assert_eq!(log.kind, ExternalKind::Func);
    assert_eq!(log.index, 0);
    let mem = host.export_by_name("mem").unwrap();
    assert_eq!(mem.kind, ExternalKind::Memory);

    // A second module importing the same field goes through the delegate
    // again and creates a fresh entry.
    translate_ok(
        &mut env,
        r#"(module (import "host" "log2" (func (param i32))))"#,
    );
    assert_eq!(env.funcs.len(), 2);
}

#[test]
fn repeated_import_of_a_host_field_keeps_first_binding() {
    let mut env = Environment::new();
    let host_index = env.add_host_module("host", Box::new(Host));

    translate_ok(
        &mut env,
        r#"(module (import "host" "log" (func (param i32))))"#,
    );
    translate_ok(
        &mut env,
        r#"(module (import "host" "log" (func (param i32))))"#,
    );

    // Each import went through the delegate, but the host module's export
    // still names the first entry.
    assert_eq!(env.funcs.len(), 2);
    let log = env.modules[host_index].export_by_name("log").unwrap();
    assert_eq!(log.index, 0);
}

#[test]
fn host_global_value_is_visible_to_initializers() {
    let mut env = Environment::new();
    env.add_host_module("host", Box::new(Host));

    translate_ok(
        &mut env,
        r#"
            (module
                (import "host" "answer" (global i32))
                (global i32 (global.get 0)))
        "#,
    );
    assert_eq!(env.globals[0].value, TypedValue::I32(42));
    assert_eq!(env.globals[1].value, TypedValue::I32(42));
}

#[test]
fn init_expr_may_not_reference_mutable_host_global() {
    let mut env = Environment::new();
    env.add_host_module("host", Box::new(Host));

    let err = translate_wat(
        &mut env,
        r#"
            (module
                (import "host" "counter" (global (mut i32)))
                (global i32 (global.get 0)))
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, TranslateError::InitReferencesMutableGlobal));
}

#[test]
fn host_memory_backs_loads_and_data_segments() {
    let mut env = Environment::new();
    env.add_host_module("host", Box::new(Host));

    translate_ok(
        &mut env,
        r#"
            (module
                (import "host" "mem" (memory 1))
                (data (i32.const 8) "ok"))
        "#,
    );
    assert_eq!(env.memories.len(), 1);
    assert_eq!(&env.memories[0].data[8..10], b"ok");
}

#[test]
fn host_table_limits_are_checked() {
    let mut env = Environment::new();
    env.add_host_module("host", Box::new(Host));

    // The delegate materializes a table with exactly the declared limits, so
    // a compatible import succeeds.
    translate_ok(
        &mut env,
        r#"(module (import "host" "tbl" (table 2 4 funcref)))"#,
    );
    assert_eq!(env.tables[0].func_indexes.len(), 2);
}

#[test]
fn rejected_host_import_rolls_back() {
    let mut env = Environment::new();
    env.add_host_module("host", Box::new(ClosedHost));

    let before = env_shape(&env);
    let err = translate_wat(
        &mut env,
        r#"(module (import "host" "f" (func)))"#,
    )
    .unwrap_err();
    match err {
        TranslateError::HostImport(message) => {
            assert_eq!(message, "unknown host function \"f\"");
        }
        other => panic!("expected HostImport error, got {other:?}"),
    }
    assert_eq!(env_shape(&env), before);
}
