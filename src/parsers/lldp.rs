/*!
LLDP adjacency rows as emitted by the collector, one row per (device, local port):

```json
{
    "device": "leaf-a",
    "local_iface": "swp1",
    "remote_device": "spine-1",
    "remote_iface": "swp1",
    "remote_port_state": "up",
    "speed": "100G"
}
```

camelCase spellings (`localIface`, `remoteDevice`, ...) are accepted as well.
*/

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::link::LinkState;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LldpError {
    #[error("Missing data: {0}")]
    MissingData(String),
    #[error("Bad LLDP row: {0}")]
    BadRow(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonLldpRow {
    pub device: String,
    #[serde(alias = "localIface", alias = "local_port")]
    pub local_iface: String,
    #[serde(alias = "remoteDevice", alias = "remote_system")]
    pub remote_device: String,
    #[serde(alias = "remoteIface", alias = "remote_port")]
    pub remote_iface: String,
    #[serde(default, alias = "remotePortState", alias = "state")]
    pub remote_port_state: Option<String>,
    #[serde(default)]
    pub speed: Option<String>,
}

/// One side's view of a cable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LldpNeighbor {
    pub device: String,
    pub local_iface: String,
    pub remote_device: String,
    pub remote_iface: String,
    pub remote_port_state: LinkState,
    pub speed: Option<String>,
}

impl LldpNeighbor {
    pub fn from_value(value: serde_json::Value) -> Result<Self, LldpError> {
        let row: JsonLldpRow = serde_json::from_value(value).map_err(|e| LldpError::BadRow(e.to_string()))?;
        row.try_into()
    }
}

impl TryFrom<JsonLldpRow> for LldpNeighbor {
    type Error = LldpError;

    fn try_from(row: JsonLldpRow) -> Result<Self, Self::Error> {
        let field = |name: &str, value: &str| -> Result<String, LldpError> {
            let value = value.trim();
            if value.is_empty() {
                Err(LldpError::MissingData(format!("{} in row of {}", name, row.device)))
            } else {
                Ok(value.to_string())
            }
        };
        Ok(Self {
            device: field("device", &row.device)?,
            local_iface: field("local_iface", &row.local_iface)?,
            remote_device: field("remote_device", &row.remote_device)?,
            remote_iface: field("remote_iface", &row.remote_iface)?,
            // Collectors that do not report port state only emit rows for live neighbours.
            remote_port_state: row
                .remote_port_state
                .as_deref()
                .map(LinkState::from)
                .unwrap_or(LinkState::Up),
            speed: row.speed.clone().filter(|s| !s.trim().is_empty()),
        })
    }
}
