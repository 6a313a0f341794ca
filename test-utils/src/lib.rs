//! Harness for the end-to-end tests: run the `sea` compiler on a C source,
//! assemble and link the produced `.s` with the system C toolchain, execute
//! the binary and compare its observable behavior.
//!
//! When no `cc` is installed the execution half is skipped, so the test
//! suite still passes on machines without an assembler; the compilation
//! half always runs.

use std::{
    error::Error,
    io::ErrorKind,
    path::Path,
    process::{Command, Output},
    str,
};

const SEA_PATH: &str = "./target/debug/sea";

pub struct Expected<'a> {
    pub stdout: &'a str,
}

impl Expected<'_> {
    fn assert_matches(&self, output: &Output) -> Result<(), Box<dyn Error>> {
        assert_eq!(str::from_utf8(&output.stdout)?, self.stdout);
        Ok(())
    }
}

fn run_compiler(src_path: &Path) -> Result<Output, Box<dyn Error>> {
    Ok(Command::new(SEA_PATH).arg(src_path).output()?)
}

/// Compile `src_path`, then (toolchain permitting) assemble, link, run and
/// compare stdout. The compiled program must exit with status 0.
pub fn check_compilation(src_path: &Path, expected: Expected) -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let src = dir.path().join(src_path.file_name().expect("source file name"));
    std::fs::copy(src_path, &src)?;

    let compile_output = run_compiler(&src)?;
    let compile_stderr = str::from_utf8(&compile_output.stderr)?;
    assert!(
        compile_output.status.success(),
        "sea exited with status {:?}: {compile_stderr}",
        compile_output.status.code()
    );

    let asm_path = src.with_extension("s");
    assert!(asm_path.exists(), "no assembly written for {}", src.display());

    // string literals are loaded by absolute address, so link non-PIE
    let exe_path = dir.path().join("a.out");
    let link = Command::new("cc")
        .arg("-no-pie")
        .arg("-o")
        .arg(&exe_path)
        .arg(&asm_path)
        .output();
    let link_output = match link {
        Err(e) if e.kind() == ErrorKind::NotFound => {
            eprintln!("cc not found, skipping execution of {}", src_path.display());
            return Ok(());
        }
        other => other?,
    };
    assert!(
        link_output.status.success(),
        "cc failed on {}: {}",
        asm_path.display(),
        str::from_utf8(&link_output.stderr)?
    );

    let run_output = Command::new(&exe_path).output()?;
    expected.assert_matches(&run_output)?;
    assert!(
        run_output.status.success(),
        "compiled program exited with status {:?}",
        run_output.status.code()
    );

    Ok(())
}

/// The compiler must reject `src_path` with a diagnostic containing `needle`.
pub fn check_failing_compilation(src_path: &Path, needle: &str) -> Result<(), Box<dyn Error>> {
    let output = run_compiler(src_path)?;
    assert!(
        !output.status.success(),
        "sea unexpectedly accepted {}",
        src_path.display()
    );

    let stderr = str::from_utf8(&output.stderr)?;
    let stdout = str::from_utf8(&output.stdout)?;
    assert!(
        stderr.contains(needle) || stdout.contains(needle),
        "diagnostic for {} does not mention '{needle}': {stderr}",
        src_path.display()
    );

    Ok(())
}
