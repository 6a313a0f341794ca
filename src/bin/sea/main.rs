//! # Sea
//!
//! The compiler driver: opens each input, runs the lexer → parser → code
//! generator pipeline and writes the companion `.s` file. With no arguments
//! it compiles standard input to standard output.
mod cli;

use std::{
    fmt::Display,
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
    process,
};

use log::info;
use sea_lang::{compile, lexer::Lexer, parser::Parser};

use cli::Cli;

/// Print one diagnostic line and abort; there is no partial output to keep.
fn fatal(message: impl Display) -> ! {
    eprintln!("[ERROR] {message}");
    process::exit(1);
}

fn output_path(input: &Path) -> PathBuf {
    match input.extension() {
        Some(ext) if ext == "c" => input.with_extension("s"),
        _ => fatal(format!("filename suffix is not .c: {}", input.display())),
    }
}

fn dump_ast(fname: &str, source: &str) {
    match Parser::new(Lexer::new(fname, source)).parse() {
        Ok(ast) => println!("{ast:#?}"),
        Err(e) => fatal(e),
    }
}

fn compile_file(path: &Path, dump: bool) {
    info!("Compiling '{}'...", path.display());

    let source = fs::read_to_string(path)
        .unwrap_or_else(|e| fatal(format!("cannot open file {}: {e}", path.display())));
    let fname = path.to_string_lossy();

    if dump {
        dump_ast(fname.as_ref(), &source);
        return;
    }

    let out_path = output_path(path);
    // assemble into memory first; a failed compilation leaves no partial output
    let mut out = Vec::new();
    if let Err(e) = compile(fname.as_ref(), &source, &mut out) {
        fatal(e);
    }
    if let Err(e) = fs::write(&out_path, out) {
        fatal(format!("cannot open file {} to write: {e}", out_path.display()));
    }
}

fn compile_stdin(dump: bool) {
    let mut source = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut source) {
        fatal(format!("cannot read standard input: {e}"));
    }

    if dump {
        dump_ast("stdin", &source);
        return;
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = compile("stdin", &source, &mut out) {
        fatal(e);
    }
}

fn main() {
    let args = Cli::init();

    simple_logger::init_with_level((&args.verbosity).into()).unwrap();

    if args.files.is_empty() {
        compile_stdin(args.dump_ast);
    } else {
        for file in &args.files {
            compile_file(file, args.dump_ast);
        }
    }
}
