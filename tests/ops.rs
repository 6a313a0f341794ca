use std::{error::Error, path::Path};

use test_utils::{check_compilation, Expected};

const SRC_PATH: &str = "./demos/ops.c";
const EXPECTED: Expected = Expected { stdout: "3\n4\n1\n1\n2\n" };

#[test]
fn compile_and_run_integer_operators() -> Result<(), Box<dyn Error>> {
    check_compilation(Path::new(SRC_PATH), EXPECTED)
}
