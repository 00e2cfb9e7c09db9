use anyhow::{Context, Result};
use clap::Parser;
use spindle::env::Environment;
use spindle::{disasm, translate, StderrErrorHandler};
use std::fs;
use std::path::PathBuf;

/// spindle — translate a WebAssembly module to interpreter bytecode.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Input WebAssembly binary (.wasm)
    input: PathBuf,

    /// Register the module in the environment under this name
    #[arg(long)]
    register: Option<String>,

    /// Print a disassembly of the emitted istream
    #[arg(long, short)]
    disassemble: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let wasm = fs::read(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;

    let mut env = Environment::new();
    let module_index =
        translate(&mut env, &wasm, &mut StderrErrorHandler).context("translation failed")?;

    if let Some(name) = &cli.register {
        env.register_module(name, module_index);
    }

    let module = &env.modules[module_index];
    let (istream_start, istream_end) = module
        .as_defined()
        .map(|m| (m.istream_start, m.istream_end))
        .unwrap_or((0, 0));

    eprintln!(
        "spindle: translated {} ({} signatures, {} functions, {} exports, {} bytes of bytecode)",
        cli.input.display(),
        env.sigs.len(),
        env.funcs.len(),
        module.exports.len(),
        istream_end - istream_start,
    );

    if cli.disassemble {
        print!("{}", disasm::disassemble(&env.istream, istream_start, istream_end));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_defaults() {
        let cli = Cli::parse_from(["spindle", "input.wasm"]);
        assert!(!cli.disassemble);
        assert!(cli.register.is_none());
    }

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::parse_from(["spindle", "-d", "--register", "math", "input.wasm"]);
        assert!(cli.disassemble);
        assert_eq!(cli.register.as_deref(), Some("math"));
    }
}
