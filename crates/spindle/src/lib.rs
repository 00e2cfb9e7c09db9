//! spindle — WebAssembly to threaded-bytecode translator.
//!
//! This crate is the front half of the spindle interpreter: it takes a binary
//! WebAssembly module, validates it in a single pass, and lowers every
//! function body into a flat, position-independent bytecode stream (the
//! *istream*) of interpreter opcodes, resolving the module's index spaces
//! against a shared [`Environment`](spindle_env::Environment) along the way.
//!
//! Translation is atomic: on any error the environment is rolled back to the
//! mark taken before the reader started, so no partial module is observable.

pub mod disasm;
mod error;
mod istream;
mod opcode;
mod reader;
mod translate;
pub mod typecheck;

pub use error::{
    CollectingErrorHandler, ErrorHandler, StderrErrorHandler, TranslateError, TranslateResult,
};
pub use istream::{INVALID_ISTREAM_OFFSET, TABLE_ENTRY_SIZE};
pub use opcode::Opcode;
pub use translate::Translator;

// Re-export the environment model under a short path for downstream users.
pub use spindle_env as env;

use spindle_env::{Environment, Module};

/// Translate one binary module into `env`.
///
/// Appends a new defined module to the environment and returns its index.
/// Name it with [`Environment::register_module`] to let later translations
/// import from it.
///
/// On failure the rendered diagnostic is reported through `error_handler`,
/// the environment is restored to its pre-call state, and the error is
/// returned.
///
/// # Example
/// ```no_run
/// use spindle::{translate, StderrErrorHandler};
/// use spindle::env::Environment;
///
/// let wasm = std::fs::read("module.wasm").unwrap();
/// let mut env = Environment::new();
/// let module_index = translate(&mut env, &wasm, &mut StderrErrorHandler).unwrap();
/// let module = &env.modules[module_index];
/// ```
pub fn translate(
    env: &mut Environment,
    wasm: &[u8],
    error_handler: &mut dyn ErrorHandler,
) -> TranslateResult<usize> {
    let istream_start = env.istream.len() as u32;
    let mark = env.mark();
    let module_index = env.modules.len();
    env.modules.push(Module::defined(istream_start));

    // The translator owns the istream buffer for the duration of the read and
    // hands it back at teardown, successful or not.
    let istream = std::mem::take(&mut env.istream);
    let mut translator = Translator::new(env, module_index, istream);
    let result = reader::read_module(&mut translator, wasm, error_handler);
    env.istream = translator.finish();

    match result {
        Ok(()) => {
            let istream_end = env.istream.len() as u32;
            if let Some(module) = env.modules[module_index].as_defined_mut() {
                module.istream_end = istream_end;
            }
            Ok(module_index)
        }
        Err(err) => {
            env.reset_to_mark(mark);
            Err(err)
        }
    }
}
