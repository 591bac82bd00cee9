use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap as Map;

use crate::services::ParameterFrontend;

/// Build arguments written either as a map or as a list of `KEY=VALUE`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MapList {
    Map(Map<String, String>),
    List(Vec<String>),
}

impl Default for MapList {
    fn default() -> Self {
        MapList::List(Vec::new())
    }
}

impl MapList {
    pub fn to_map(self) -> Map<String, String> {
        match self {
            MapList::Map(map) => map,
            MapList::List(list) => list.into_iter().map(MapList::split_value).collect(),
        }
    }

    fn split_value(value: String) -> (String, String) {
        match value.find('=') {
            Some(split_index) => {
                let (key, value) = value.split_at(split_index);
                (key.into(), value[1..].into())
            }
            None => (value, "".into()),
        }
    }
}

impl ParameterFrontend for MapList {
    fn arguments(&mut self) -> Result<Map<String, String>> {
        Ok(self.clone().to_map())
    }
}
