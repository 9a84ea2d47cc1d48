use crate::pin::{OptionalPin, Pin};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broker the client connects to. Port and retry count stay string-encoded, the way the
/// firmware receives them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerSettings {
    pub ip: String,
    pub port: String,
    pub retry: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub key: String,
    pub name: String,
    /// Free-form type tag, e.g. `string`.
    pub datatype: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub properties: [PropertyDescriptor; 2],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialParameters {
    pub first: String,
    pub second: String,
}

/// Contents of `MMRCsettings.h`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    pub broker: BrokerSettings,
    pub device: DeviceIdentity,
    pub node: NodeDescriptor,
    pub special: SpecialParameters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPoint {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinBindings {
    pub button: Pin,
    pub led: Pin,
    /// Pulled to ground on startup to rebuild the AP with the initial password.
    pub config: OptionalPin,
    /// Connection-status indicator.
    pub status: OptionalPin,
}

/// Contents of `mmrcSettings.h`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSettings {
    pub access_point: AccessPoint,
    pub pins: PinBindings,
}

/// Both settings headers of one MMRC client.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Settings {
    pub client: ClientSettings,
    pub start: StartSettings,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Symbol {0} is not defined.")]
    Missing(&'static str),
    #[error("Symbol {name} must be a {expected}.")]
    WrongKind {
        name: &'static str,
        expected: &'static str,
    },
    #[error("Symbol {name} is not a valid integer: '{value}'")]
    InvalidInteger { name: &'static str, value: String },
    #[error("{name} must be true or false, got '{value}'")]
    InvalidFlag { name: String, value: String },
    #[error("Symbol {name}: {source}")]
    InvalidPin {
        name: &'static str,
        #[source]
        source: crate::pin::PinError,
    },
}

fn parse_int<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, SettingsError> {
    value.trim().parse::<T>().map_err(|_| SettingsError::InvalidInteger {
        name,
        value: value.to_string(),
    })
}

impl BrokerSettings {
    pub fn port(&self) -> Result<u16, SettingsError> {
        parse_int("BROKERPORT", &self.port)
    }

    pub fn retry(&self) -> Result<u32, SettingsError> {
        parse_int("BROKERRETRY", &self.retry)
    }
}

impl SpecialParameters {
    pub fn first(&self) -> Result<i64, SettingsError> {
        parse_int("SPECIAL01", &self.first)
    }

    pub fn second(&self) -> Result<i64, SettingsError> {
        parse_int("SPECIAL02", &self.second)
    }
}

impl PropertyDescriptor {
    pub fn new(key: &str, name: &str, datatype: &str) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            datatype: datatype.to_string(),
        }
    }

    /// True when no part of the (key, name, type) triple is blank.
    pub fn is_complete(&self) -> bool {
        [&self.key, &self.name, &self.datatype]
            .iter()
            .all(|part| !part.trim().is_empty())
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings {
                ip: "192.168.41.1".to_string(),
                port: "1883".to_string(),
                retry: "5".to_string(),
            },
            device: DeviceIdentity {
                id: "signature-name".to_string(),
                name: "Client name".to_string(),
            },
            node: NodeDescriptor {
                id: "signal1".to_string(),
                name: "Node name".to_string(),
                node_type: "signal".to_string(),
                properties: [
                    PropertyDescriptor::new("main", "Property 1 name", "string"),
                    PropertyDescriptor::new("slave", "Property 2 name", "string"),
                ],
            },
            special: SpecialParameters {
                first: "5".to_string(),
                second: "10".to_string(),
            },
        }
    }
}

impl Default for StartSettings {
    fn default() -> Self {
        Self {
            access_point: AccessPoint {
                name: "MMRC-start".to_string(),
                password: "mmrc1234".to_string(),
            },
            pins: PinBindings {
                button: Pin::Digital(5),
                led: Pin::LedBuiltin,
                config: OptionalPin::disabled(Pin::Digital(2)),
                status: OptionalPin::disabled(Pin::LedBuiltin),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_headers() {
        let settings = Settings::default();
        assert_eq!(settings.client.broker.ip, "192.168.41.1");
        assert_eq!(settings.client.device.id, "signature-name");
        assert_eq!(settings.client.node.properties[0].key, "main");
        assert_eq!(settings.client.node.properties[1].key, "slave");
        assert_eq!(settings.start.access_point.name, "MMRC-start");
        assert_eq!(settings.start.pins.button, Pin::Digital(5));
        assert_eq!(settings.start.pins.led, Pin::LedBuiltin);
    }

    #[test]
    fn numeric_constants_parse() {
        let client = ClientSettings::default();
        assert_eq!(client.broker.port(), Ok(1883));
        assert_eq!(client.broker.retry(), Ok(5));
        assert_eq!(client.special.first(), Ok(5));
        assert_eq!(client.special.second(), Ok(10));
    }

    #[test]
    fn non_numeric_port_is_reported_by_symbol() {
        let mut broker = ClientSettings::default().broker;
        broker.port = "mqtt".to_string();
        assert_eq!(
            broker.port(),
            Err(SettingsError::InvalidInteger {
                name: "BROKERPORT",
                value: "mqtt".to_string()
            })
        );
    }

    #[test]
    fn optional_pins_default_to_disabled() {
        let pins = StartSettings::default().pins;
        assert!(!pins.config.enabled);
        assert!(!pins.status.enabled);
        assert_eq!(pins.config.pin, Pin::Digital(2));
        assert_eq!(pins.status.pin, Pin::LedBuiltin);
    }

    #[test]
    fn default_properties_are_complete() {
        let node = ClientSettings::default().node;
        assert!(node.properties.iter().all(PropertyDescriptor::is_complete));
        assert!(!PropertyDescriptor::new("main", " ", "string").is_complete());
    }
}
