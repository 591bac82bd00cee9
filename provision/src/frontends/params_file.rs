use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap as Map,
    fs::{self, File},
    path::{Path, PathBuf},
};

use crate::{frontends::MapList, mirror::MirrorRule, services::ParameterFrontend};

pub const PARAMS_FILE_NAMES: &[&str] = &["provision.yml", "provision.yaml"];

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ParamsFile {
    #[serde(default)]
    pub args: MapList,

    pub mirror: Option<MirrorRule>,
}

/// Looks for a parameter file in `path` or any of its parents. Relative paths
/// are resolved first so that the search reaches past the working directory.
pub fn find_params_file<P: AsRef<Path>>(path: P) -> Result<Option<PathBuf>> {
    let start = fs::canonicalize(path.as_ref())?;

    for path in start.ancestors() {
        for name in PARAMS_FILE_NAMES {
            let params_file_path = path.join(name);
            if params_file_path.is_file() {
                return Ok(Some(params_file_path));
            }
        }
    }

    Ok(None)
}

pub struct ParamsFileFrontend {
    file: ParamsFile,
}

impl ParamsFileFrontend {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<ParamsFileFrontend> {
        let path = path.as_ref();
        let file: ParamsFile = serde_yaml::from_reader(File::open(path)?)?;
        info!("loaded parameter file {:?}", path);

        Ok(ParamsFileFrontend { file })
    }

    /// Opens the closest parameter file above `context`, or an empty one.
    pub fn discover<P: AsRef<Path>>(context: P) -> Result<ParamsFileFrontend> {
        match find_params_file(context)? {
            Some(path) => ParamsFileFrontend::open(path),
            None => Ok(ParamsFileFrontend {
                file: ParamsFile::default(),
            }),
        }
    }

    pub fn mirror(&self) -> MirrorRule {
        self.file.mirror.clone().unwrap_or_default()
    }
}

impl ParameterFrontend for ParamsFileFrontend {
    fn arguments(&mut self) -> Result<Map<String, String>> {
        self.file.args.arguments()
    }
}
