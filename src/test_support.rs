//! Small fabrics for unit tests.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::parsers::bundle::SnapshotBundle;

pub(crate) const FIXTURE: &str = include_str!("../test_data/fabric_snapshot.json");

pub(crate) fn fixture_bundle() -> SnapshotBundle {
    SnapshotBundle::from_json_str(FIXTURE).unwrap()
}

/// A bundle of bidirectionally reported links, each listed device owning an empty snapshot.
/// `endpoints` attaches that many hosts to a device.
pub(crate) fn fabric_json(links: &[(&str, &str)], endpoints: &[(&str, usize)]) -> Value {
    let mut next_port: BTreeMap<String, usize> = BTreeMap::new();
    let mut port = |device: &str| {
        let n = next_port.entry(device.to_string()).or_insert(0);
        *n += 1;
        format!("swp{}", n)
    };

    let mut lldp = Vec::new();
    let mut devices = serde_json::Map::new();
    for (a, b) in links {
        let (pa, pb) = (port(a), port(b));
        lldp.push(json!({"device": a, "local_iface": pa, "remote_device": b, "remote_iface": pb}));
        lldp.push(json!({"device": b, "local_iface": pb, "remote_device": a, "remote_iface": pa}));
        devices.entry(a.to_string()).or_insert(json!({}));
        devices.entry(b.to_string()).or_insert(json!({}));
    }
    for (device, count) in endpoints {
        for i in 0..*count {
            lldp.push(json!({
                "device": device,
                "local_iface": port(device),
                "remote_device": format!("{}-host{}", device, i),
                "remote_iface": "eth0"
            }));
        }
        devices.entry(device.to_string()).or_insert(json!({}));
    }
    json!({ "lldp": lldp, "devices": devices })
}

pub(crate) fn fabric_bundle(links: &[(&str, &str)], endpoints: &[(&str, usize)]) -> SnapshotBundle {
    SnapshotBundle::from_value(fabric_json(links, endpoints)).unwrap()
}
