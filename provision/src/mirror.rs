use anyhow::Result;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::ProvisionError;

pub const UPSTREAM_HOST: &str = "archive.ubuntu.com";
pub const MIRROR_HOST: &str = "mirrors.ustc.edu.cn";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MirrorOutcome {
    Disabled,
    Unchanged,
    Rewritten { replacements: usize },
}

/// Swaps one package repository hostname for another in a source list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorRule {
    pub from: String,
    pub to: String,
}

impl Default for MirrorRule {
    fn default() -> Self {
        MirrorRule {
            from: UPSTREAM_HOST.into(),
            to: MIRROR_HOST.into(),
        }
    }
}

impl MirrorRule {
    /// Rewrites `path` in place. A source list that never mentions the
    /// upstream host is left untouched.
    pub fn apply<P: AsRef<Path>>(&self, path: P) -> Result<MirrorOutcome> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ProvisionError::MissingSourceList {
                path: path.to_owned(),
            }
            .into());
        }

        let contents = fs::read_to_string(path)?;
        let replacements = contents.matches(self.from.as_str()).count();
        if replacements == 0 {
            debug!("{:?} does not mention {}, leaving it alone", path, self.from);
            return Ok(MirrorOutcome::Unchanged);
        }

        fs::write(path, contents.replace(self.from.as_str(), &self.to))?;
        info!(
            "replaced {} with {} in {:?} ({} occurrences)",
            self.from, self.to, path, replacements
        );

        Ok(MirrorOutcome::Rewritten { replacements })
    }
}
