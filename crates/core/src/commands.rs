//! Built-in commands usable from declarative validation files.

use std::process::{Command, Stdio};

use anyhow::{bail, Context};
use serde_json::{json, Value};

use crate::catalog::Catalog;
use crate::response::ValidationResponse;
use crate::status::Status;

/// Catalog id of [`process_exit_status`].
pub const PROCESS_EXIT_STATUS: &str = "process.exit_status";

/// Runs `args[0]` with the remaining args; `NORMAL` on exit code 0, `PROBLEM` otherwise.
pub fn process_exit_status(args: &[Value]) -> anyhow::Result<ValidationResponse> {
    let Some((program, rest)) = args.split_first() else {
        bail!("{PROCESS_EXIT_STATUS} needs a program to run");
    };
    let program = program
        .as_str()
        .with_context(|| format!("program must be a string, got {program}"))?;
    let rest: Vec<String> = rest
        .iter()
        .map(|a| match a {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();

    let output = Command::new(program)
        .args(&rest)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("spawn {program}"))?;

    let status = if output.status.success() {
        Status::Normal
    } else {
        Status::Problem
    };
    Ok(ValidationResponse::new(
        status,
        json!({
            "program": program,
            "args": rest,
            "exit_code": output.status.code(),
            "stdout": String::from_utf8_lossy(&output.stdout).trim(),
            "stderr": String::from_utf8_lossy(&output.stderr).trim(),
        }),
    ))
}

pub(crate) fn register(catalog: &mut Catalog) {
    catalog.register_command(PROCESS_EXIT_STATUS, process_exit_status);
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn zero_exit_is_normal() {
        let r = process_exit_status(&[json!("sh"), json!("-c"), json!("echo hello")]).unwrap();
        assert_eq!(r.status(), Status::Normal);
        assert_eq!(r.details()["stdout"], "hello");
        assert_eq!(r.details()["exit_code"], 0);
    }

    #[test]
    fn non_zero_exit_is_problem() {
        let r = process_exit_status(&[json!("sh"), json!("-c"), json!("echo bad >&2; exit 3")]).unwrap();
        assert_eq!(r.status(), Status::Problem);
        assert_eq!(r.details()["exit_code"], 3);
        assert_eq!(r.details()["stderr"], "bad");
    }

    #[test]
    fn missing_program_is_an_error() {
        assert!(process_exit_status(&[]).is_err());
        assert!(process_exit_status(&[json!(3)]).is_err());
    }
}
