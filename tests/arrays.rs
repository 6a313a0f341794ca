use std::{error::Error, path::Path};

use test_utils::{check_compilation, Expected};

const SRC_PATH: &str = "./demos/array.c";
const EXPECTED: Expected = Expected { stdout: "6\n" };

#[test]
fn compile_and_run_array_initializer() -> Result<(), Box<dyn Error>> {
    check_compilation(Path::new(SRC_PATH), EXPECTED)
}
