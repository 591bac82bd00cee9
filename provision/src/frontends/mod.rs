use anyhow::Result;
use std::collections::BTreeMap as Map;

use crate::services::ParameterFrontend;

mod args;
mod environment;
mod params_file;

pub use args::MapList;
pub use environment::EnvironmentFrontend;
pub use params_file::{find_params_file, ParamsFile, ParamsFileFrontend};

/// Layers the arguments of every frontend, later ones winning. Empty values
/// count as unset and never override a lower layer.
pub fn merge_arguments(
    frontends: &mut [&mut dyn ParameterFrontend],
) -> Result<Map<String, String>> {
    let mut merged = Map::new();

    for frontend in frontends.iter_mut() {
        for (key, value) in frontend.arguments()? {
            if !value.is_empty() {
                merged.insert(key, value);
            }
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_layers_win_unless_empty() -> Result<()> {
        let mut file = MapList::List(vec!["PHP_VERSION=8.1".into(), "TZ=UTC".into()]);
        let mut environment = EnvironmentFrontend::from_vars(vec![
            ("PHP_VERSION", "8.2"),
            ("TZ", ""),
        ]);
        let mut command_line = MapList::List(vec!["PHP_VERSION=8.3".into()]);

        let merged = merge_arguments(&mut [
            &mut file as &mut dyn ParameterFrontend,
            &mut environment,
            &mut command_line,
        ])?;

        assert_eq!(merged["PHP_VERSION"], "8.3");
        assert_eq!(merged["TZ"], "UTC");
        Ok(())
    }
}
