//! Shared helpers for the translation tests.

#![allow(dead_code)]

use spindle::env::Environment;
use spindle::{translate, CollectingErrorHandler, TranslateError};

/// Assemble `wat_text` and translate it into `env`.
pub fn translate_wat(env: &mut Environment, wat_text: &str) -> Result<usize, TranslateError> {
    let wasm = wat::parse_str(wat_text).expect("wat should assemble");
    translate(env, &wasm, &mut CollectingErrorHandler::default())
}

/// Translate and unwrap, for modules that must be valid.
pub fn translate_ok(env: &mut Environment, wat_text: &str) -> usize {
    translate_wat(env, wat_text).expect("translation should succeed")
}

/// The istream slice belonging to one translated module.
pub fn module_istream(env: &Environment, module_index: usize) -> &[u8] {
    let module = env.modules[module_index]
        .as_defined()
        .expect("module should be defined");
    &env.istream[module.istream_start as usize..module.istream_end as usize]
}

pub fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

/// Lengths of every environment sequence, for rollback assertions.
pub fn env_shape(env: &Environment) -> [usize; 7] {
    [
        env.sigs.len(),
        env.funcs.len(),
        env.tables.len(),
        env.memories.len(),
        env.globals.len(),
        env.modules.len(),
        env.istream.len(),
    ]
}
