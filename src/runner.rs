use std::process::{Command, Stdio};

use log::{debug, trace};

use crate::error::{PruneError, Result};

/// Captured result of a finished program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external programs to completion.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;

    /// Like `run`, but a non-zero exit becomes `PruneError::CommandFailed`.
    fn run_checked(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let output = self.run(program, args)?;
        if !output.success() {
            return Err(PruneError::CommandFailed {
                program: program.to_string(),
                args: args.to_vec(),
                code: output.code,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }
}

pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        debug!("running: {} {}", program, args.join(" "));

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| PruneError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let output = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        trace!("{} exited with {:?}", program, output.code);
        trace!("stdout: {:?}", output.stdout);

        Ok(output)
    }
}
