use std::process::{Command, Stdio};
use log::debug;
use crate::error::{Error, Result};

/// Runs `program` to completion; a non-zero exit becomes `Error::Launch`.
pub fn run_and_wait(program: &str, args: &[String]) -> Result<()> {
    debug!("executor: {} {:?}", program, args);
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;

    if !status.success() {
        return Err(Error::Launch {
            program: program.to_string(),
            status: status.to_string(),
        });
    }
    Ok(())
}

/// Fire-and-forget spawn; only a failure to start is reported.
pub fn spawn_detached(program: &str, args: &[String]) -> Result<()> {
    debug!("executor: spawning {} {:?}", program, args);
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(())
}

/// Runs `program` and returns its stdout; a non-zero exit is an error.
pub fn capture_output(program: &str, args: &[String]) -> Result<String> {
    debug!("executor: capturing {} {:?}", program, args);
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()?;

    if !output.status.success() {
        return Err(Error::Launch {
            program: program.to_string(),
            status: output.status.to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_status_is_reported() {
        assert!(run_and_wait("true", &[]).is_ok());
        assert!(matches!(run_and_wait("false", &[]), Err(Error::Launch { .. })));
    }

    #[test]
    fn captures_stdout() {
        let out = capture_output("printf", &["%s".to_string(), "+ com.example".to_string()]).unwrap();
        assert_eq!(out, "+ com.example");
    }

    #[test]
    fn missing_program_is_io_error() {
        let err = spawn_detached("/nonexistent/finderplus-tool", &[]).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
