use anyhow::Result;
use log::debug;
use std::{collections::BTreeMap as Map, env, ffi::OsString};

use crate::{error::ProvisionError, models::BUILD_ARGS, services::ParameterFrontend};

/// Build arguments passed as environment variables, which is how `ARG`s reach
/// a `RUN` step.
pub struct EnvironmentFrontend {
    vars: Vec<(String, String)>,
}

impl EnvironmentFrontend {
    pub fn new() -> Result<EnvironmentFrontend> {
        EnvironmentFrontend::from_os_vars(env::vars_os())
    }

    /// Keeps the build arguments among `vars`. Unrelated variables may hold
    /// anything, a build argument must be unicode.
    pub fn from_os_vars<I>(vars: I) -> Result<EnvironmentFrontend>
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let mut build_vars = Vec::new();

        for (key, value) in vars {
            let key = match key.to_str() {
                Some(key) if BUILD_ARGS.contains(&key) => key.to_owned(),
                _ => continue,
            };
            let value = value
                .into_string()
                .map_err(|_| ProvisionError::NonUnicodeArgument { key: key.clone() })?;
            build_vars.push((key, value));
        }

        Ok(EnvironmentFrontend { vars: build_vars })
    }

    pub fn from_vars<I, K, V>(vars: I) -> EnvironmentFrontend
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();

        EnvironmentFrontend { vars }
    }
}

impl ParameterFrontend for EnvironmentFrontend {
    fn arguments(&mut self) -> Result<Map<String, String>> {
        let arguments = self
            .vars
            .iter()
            .filter(|(key, _)| BUILD_ARGS.contains(&key.as_str()))
            .cloned()
            .collect::<Map<_, _>>();

        debug!("build arguments from the environment: {:?}", arguments);

        Ok(arguments)
    }
}
