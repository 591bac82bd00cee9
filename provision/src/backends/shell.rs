use anyhow::{Context, Result};
use log::info;
use std::{collections::BTreeMap as Map, path::Path, process::Command};

use crate::{error::ProvisionError, services::ScriptRunner};

pub struct ShellRunner {
    shell: String,
}

impl ShellRunner {
    pub fn new<S: Into<String>>(shell: S) -> ShellRunner {
        ShellRunner {
            shell: shell.into(),
        }
    }
}

impl ScriptRunner for ShellRunner {
    fn run(
        &mut self,
        script: &Path,
        environment: &Map<String, String>,
        work_dir: &Path,
    ) -> Result<()> {
        info!("running {} {:?} in {:?}", self.shell, script, work_dir);

        let status = Command::new(&self.shell)
            .arg(script)
            .current_dir(work_dir)
            .envs(environment)
            .status()
            .with_context(|| format!("couldn't start {}", self.shell))?;

        if !status.success() {
            let status = match status.code() {
                Some(code) => format!("exit code {}", code),
                None => "termination by signal".into(),
            };

            return Err(ProvisionError::ScriptFailed {
                path: script.to_owned(),
                status,
            }
            .into());
        }

        Ok(())
    }
}
