use std::{error::Error, path::Path};

use test_utils::{check_compilation, Expected};

const SRC_PATH: &str = "./demos/scope.c";
const EXPECTED: Expected = Expected { stdout: "2\n1\n" };

#[test]
fn compile_and_run_shadowed_scopes() -> Result<(), Box<dyn Error>> {
    check_compilation(Path::new(SRC_PATH), EXPECTED)
}
