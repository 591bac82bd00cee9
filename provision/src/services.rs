use anyhow::Result;
use std::{collections::BTreeMap as Map, path::Path};

pub trait ParameterFrontend {
    /// Raw build arguments supplied by this source. Later frontends override
    /// earlier ones.
    fn arguments(&mut self) -> Result<Map<String, String>>;
}

pub trait ScriptFetcher {
    /// Downloads the body behind `url`. Anything but a 2xx response is an error.
    fn fetch(&mut self, url: &str) -> Result<Vec<u8>>;
}

pub trait ScriptRunner {
    fn run(&mut self, script: &Path, environment: &Map<String, String>, work_dir: &Path)
        -> Result<()>;
}
