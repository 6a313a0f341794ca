use std::{error::Error, path::Path};

use test_utils::{check_compilation, Expected};

const SRC_PATH: &str = "./demos/sum.c";
const EXPECTED: Expected = Expected { stdout: "55\n" };

#[test]
fn compile_and_run_for_loop_sum() -> Result<(), Box<dyn Error>> {
    check_compilation(Path::new(SRC_PATH), EXPECTED)
}
