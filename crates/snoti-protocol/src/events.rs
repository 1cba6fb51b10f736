//! Event categories pushed by the broker.

use serde::{Deserialize, Serialize};

/// Event categories a client can subscribe to at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "device.online")]
    DeviceOnline,
    #[serde(rename = "device.offline")]
    DeviceOffline,
    #[serde(rename = "device.status.kv")]
    DeviceStatusKv,
    #[serde(rename = "device.attrs_fault")]
    DeviceAttrFault,
    #[serde(rename = "device.attr_alert")]
    DeviceAttrAlert,
}

impl EventType {
    /// Categories sent in every login request.
    pub const SUBSCRIBED: [EventType; 5] = [
        EventType::DeviceOnline,
        EventType::DeviceOffline,
        EventType::DeviceStatusKv,
        EventType::DeviceAttrFault,
        EventType::DeviceAttrAlert,
    ];

    /// Wire name of the category.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::DeviceOnline => "device.online",
            EventType::DeviceOffline => "device.offline",
            EventType::DeviceStatusKv => "device.status.kv",
            EventType::DeviceAttrFault => "device.attrs_fault",
            EventType::DeviceAttrAlert => "device.attr_alert",
        }
    }

    /// Parse a wire name. Unknown names yield `None`.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::SUBSCRIBED.into_iter().find(|t| t.as_str() == name)
    }

    /// Whether events of this category carry an [`AttrReport`] payload.
    pub fn carries_attr_report(self) -> bool {
        matches!(self, EventType::DeviceAttrFault | EventType::DeviceAttrAlert)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of fault and alert events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrReport {
    #[serde(default)]
    pub attr_name: String,
    #[serde(default, rename = "attr_displayname")]
    pub display_name: String,
    /// 1 when the fault/alert is raised, 0 when it clears.
    #[serde(default)]
    pub value: i64,
}
