//! Compiler library for a small subset of the C programming language.
//!
//! The pipeline is lexer → parser/semantic analyzer → code generator; the
//! output is x86-64 System V assembly in GNU assembler syntax.
pub mod asm;
pub mod compiler;
pub mod lexer;
pub mod parser;

use std::io::Write;

use compiler::Compiler;
use lexer::Lexer;
use parser::{ParseError, Parser};

/// Compile one preprocessed C source to assembly text written into `out`.
///
/// `fname` is only used in diagnostics. I/O errors on `out` are reported as
/// a diagnostic as well; every failure is fatal for the translation unit.
pub fn compile(fname: &str, source: &str, out: &mut impl Write) -> Result<(), ParseError> {
    let lexer = Lexer::new(fname, source);
    let ast = Parser::new(lexer).parse()?;

    let mut compiler = Compiler::from_ast(ast);
    compiler.compile_program(out).map_err(|e| ParseError {
        message: format!("cannot write output: {e}"),
        position: (fname.to_owned(), 0, 0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_hello_to_buffer() {
        let mut out = Vec::new();
        compile(
            "hello.c",
            "int main(void) { puts(\"hello\"); return 0; }",
            &mut out,
        )
        .expect("compilation failed");

        let asm = String::from_utf8(out).unwrap();
        assert!(asm.contains("main:"));
        assert!(asm.contains(".string\t\"hello\""));
        assert!(asm.contains("\tcall\tputs"));
    }

    #[test]
    fn test_compile_error_carries_file_name() {
        let mut out = Vec::new();
        let err = compile("broken.c", "int main(void) { return x; }", &mut out).unwrap_err();
        assert!(err.message.contains("'x' undeclared"));
        assert_eq!(err.position.0, "broken.c");
    }
}
