// # BIND Zone Tools
//
// `ZoneTools` implementation backed by the BIND utilities:
//
// - validate: `named-checkzone <zone> <file>`
// - sign:     `dnssec-signzone -o <zone> <serial file>`, run inside the
//   serial file's directory so that key files are found next to it
// - reload:   `rndc reload <zone>`
//
// Each call spawns exactly one child process and captures its output. The
// child is killed if the coordinator drops the call on timeout.
//
// Commands may carry leading arguments (e.g. `sudo -n rndc`); they are
// split on whitespace.

use async_trait::async_trait;
use faddns_core::config::ToolsConfig;
use faddns_core::traits::{ToolOutput, ZoneTools};
use faddns_core::{Error, Result};
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, warn};

/// BIND tooling invoked as child processes
#[derive(Debug, Clone)]
pub struct BindZoneTools {
    checkzone: String,
    signzone: String,
    rndc: String,
}

impl BindZoneTools {
    /// Create BIND tools from the configured command lines
    pub fn new(config: &ToolsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            checkzone: config.checkzone_command.clone(),
            signzone: config.signzone_command.clone(),
            rndc: config.rndc_command.clone(),
        })
    }

    async fn run<I, S>(&self, command: &str, args: I, cwd: Option<&Path>) -> Result<(String, Output)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Error::config("empty tool command"))?
            .to_string();

        let mut cmd = Command::new(&program);
        cmd.args(parts)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        debug!("Running {:?}", cmd.as_std());
        let output = cmd
            .output()
            .await
            .map_err(|e| Error::tool(&program, format!("failed to start: {}", e)))?;

        Ok((program, output))
    }
}

/// stdout followed by stderr, lossily decoded
fn captured(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stderr);
    }
    text
}

fn failure_message(output: &Output) -> String {
    format!("{}: {}", output.status, captured(output).trim())
}

#[async_trait]
impl ZoneTools for BindZoneTools {
    async fn validate_zone(&self, zone: &str, path: &Path) -> Result<ToolOutput> {
        let (program, output) = self
            .run(&self.checkzone, [OsStr::new(zone), path.as_os_str()], None)
            .await?;

        if output.status.success() {
            Ok(ToolOutput::new(program, captured(&output)))
        } else {
            warn!("{} rejected {}", program, path.display());
            Err(Error::validation(failure_message(&output)))
        }
    }

    async fn sign_zone(&self, zone: &str, path: &Path) -> Result<ToolOutput> {
        // Inside the serial directory the file is addressed by name only
        let cwd = path.parent().filter(|dir| !dir.as_os_str().is_empty());
        let file = match (cwd, path.file_name()) {
            (Some(_), Some(name)) => name,
            _ => path.as_os_str(),
        };
        let (program, output) = self
            .run(&self.signzone, [OsStr::new("-o"), OsStr::new(zone), file], cwd)
            .await?;

        if output.status.success() {
            Ok(ToolOutput::new(program, captured(&output)))
        } else {
            Err(Error::tool(program, failure_message(&output)))
        }
    }

    async fn reload_zone(&self, zone: &str) -> Result<ToolOutput> {
        let (program, output) = self.run(&self.rndc, ["reload", zone], None).await?;

        if output.status.success() {
            Ok(ToolOutput::new(program, captured(&output)))
        } else {
            Err(Error::tool(program, failure_message(&output)))
        }
    }

    fn tools_name(&self) -> &'static str {
        "bind"
    }
}
