use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Up,
    Down,
}

impl From<&str> for LinkState {
    /// Anything that is not clearly operationally up is treated as down.
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "up" | "oper-up" | "operup" | "active" | "1" | "true" => LinkState::Up,
            _ => LinkState::Down,
        }
    }
}

/// One end of a cable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Port {
    pub device: String,
    pub iface: String,
}

impl Port {
    pub fn new(device: &str, iface: &str) -> Self {
        Self {
            device: device.to_string(),
            iface: iface.to_string(),
        }
    }
}

impl Display for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.device, self.iface)
    }
}

/// Order-independent identity of a cable, so both LLDP reports land on the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UndirectedLinkKey {
    pub a: Port,
    pub b: Port,
}

impl UndirectedLinkKey {
    pub fn new(x: Port, y: Port) -> Self {
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        UndirectedLinkKey { a, b }
    }

    pub fn endpoints(&self) -> (&Port, &Port) {
        (&self.a, &self.b)
    }
}

/// A cable between two fabric devices.
///
/// `confirmed` is only true when both ends report each other on the stated interfaces.
/// Unconfirmed links are kept for diagnostics but never walked by the classifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub a: String,
    pub a_iface: String,
    pub b: String,
    pub b_iface: String,
    pub confirmed: bool,
    pub state: LinkState,
    pub speed: Option<String>,
}

impl Link {
    pub fn from_key(key: &UndirectedLinkKey, confirmed: bool, state: LinkState, speed: Option<String>) -> Self {
        let (a, b) = key.endpoints();
        Self {
            a: a.device.clone(),
            a_iface: a.iface.clone(),
            b: b.device.clone(),
            b_iface: b.iface.clone(),
            confirmed,
            state,
            speed,
        }
    }

    pub fn connects(&self, x: &str, y: &str) -> bool {
        (self.a == x && self.b == y) || (self.a == y && self.b == x)
    }

    /// Interface this link uses on `device`.
    pub fn iface_on(&self, device: &str) -> Option<&str> {
        if self.a == device {
            Some(&self.a_iface)
        } else if self.b == device {
            Some(&self.b_iface)
        } else {
            None
        }
    }

    pub fn is_up(&self) -> bool {
        self.state == LinkState::Up
    }
}

/// Up/down counts over the confirmed parallel links of an ECMP segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkHealth {
    pub up: usize,
    pub down: usize,
}

impl LinkHealth {
    pub fn record(&mut self, link: &Link) {
        match link.state {
            LinkState::Up => self.up += 1,
            LinkState::Down => self.down += 1,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.down > 0
    }
}
