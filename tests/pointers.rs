use std::{error::Error, path::Path};

use test_utils::{check_compilation, Expected};

const SRC_PATH: &str = "./demos/pointer.c";
const EXPECTED: Expected = Expected { stdout: "42\n" };

#[test]
fn compile_and_run_pointer_deref() -> Result<(), Box<dyn Error>> {
    check_compilation(Path::new(SRC_PATH), EXPECTED)
}
