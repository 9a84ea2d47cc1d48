//! Binding between header symbols and settings fields.

use crate::header::{Define, Header, HeaderDocument, Value};
use crate::pin::{OptionalPin, Pin};
use crate::settings::{
    AccessPoint, BrokerSettings, ClientSettings, DeviceIdentity, NodeDescriptor, PinBindings,
    PropertyDescriptor, Settings, SettingsError, SpecialParameters, StartSettings,
};
use log::warn;

pub const CLIENT_HEADER_FILE: &str = "MMRCsettings.h";
pub const START_HEADER_FILE: &str = "mmrcSettings.h";

const BANNER: &str = "Settings for this specific MMRC client";

pub mod symbols {
    pub const BROKERIP: &str = "BROKERIP";
    pub const BROKERPORT: &str = "BROKERPORT";
    pub const BROKERRETRY: &str = "BROKERRETRY";
    pub const DEVICEID: &str = "DEVICEID";
    pub const DEVICENAME: &str = "DEVICENAME";
    pub const NODE01ID: &str = "NODE01ID";
    pub const NODE01NAME: &str = "NODE01NAME";
    pub const NODE01TYPE: &str = "NODE01TYPE";
    pub const NODE01PROP01: &str = "NODE01PROP01";
    pub const NODE01PROP01NAME: &str = "NODE01PROP01NAME";
    pub const NODE01PROP01DATATYPE: &str = "NODE01PROP01DATATYPE";
    pub const NODE01PROP02: &str = "NODE01PROP02";
    pub const NODE01PROP02NAME: &str = "NODE01PROP02NAME";
    pub const NODE01PROP02DATATYPE: &str = "NODE01PROP02DATATYPE";
    pub const SPECIAL01: &str = "SPECIAL01";
    pub const SPECIAL02: &str = "SPECIAL02";

    pub const APNAME: &str = "APNAME";
    pub const APPASSWORD: &str = "APPASSWORD";
    pub const BUTTON_PIN: &str = "BUTTON_PIN";
    pub const LED_PIN: &str = "LED_PIN";
    pub const CONFIG_PIN: &str = "CONFIG_PIN";
    pub const STATUS_PIN: &str = "STATUS_PIN";
}

use symbols::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// C string literal.
    Str,
    /// Bare pin token.
    Pin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub name: &'static str,
    pub kind: Kind,
    /// Ships commented out.
    pub optional: bool,
}

const fn string(name: &'static str) -> Symbol {
    Symbol {
        name,
        kind: Kind::Str,
        optional: false,
    }
}

const fn pin(name: &'static str, optional: bool) -> Symbol {
    Symbol {
        name,
        kind: Kind::Pin,
        optional,
    }
}

pub const CLIENT_SYMBOLS: &[Symbol] = &[
    string(BROKERIP),
    string(BROKERPORT),
    string(BROKERRETRY),
    string(DEVICEID),
    string(DEVICENAME),
    string(NODE01ID),
    string(NODE01NAME),
    string(NODE01TYPE),
    string(NODE01PROP01),
    string(NODE01PROP01NAME),
    string(NODE01PROP01DATATYPE),
    string(NODE01PROP02),
    string(NODE01PROP02NAME),
    string(NODE01PROP02DATATYPE),
    string(SPECIAL01),
    string(SPECIAL02),
];

pub const START_SYMBOLS: &[Symbol] = &[
    string(APNAME),
    string(APPASSWORD),
    pin(BUTTON_PIN, false),
    pin(LED_PIN, false),
    pin(CONFIG_PIN, true),
    pin(STATUS_PIN, true),
];

/// Every symbol of both headers.
pub fn all_symbols() -> impl Iterator<Item = &'static Symbol> {
    CLIENT_SYMBOLS.iter().chain(START_SYMBOLS.iter())
}

/// Name of the switch that enables an optional pin outside of a header.
pub fn enabled_key(name: &str) -> String {
    format!("{}_ENABLED", name)
}

fn warn_unknown(header: &Header, table: &[Symbol]) {
    for define in header.defines() {
        if !table.iter().any(|s| s.name == define.name) {
            warn!(
                "Ignoring unknown symbol {} ({})",
                define.name,
                define.value.kind()
            );
        }
    }
}

fn read_string(header: &Header, name: &'static str) -> Result<String, SettingsError> {
    match header.get(name).map(|d| &d.value) {
        Some(Value::Str(s)) => Ok(s.clone()),
        Some(_) => Err(SettingsError::WrongKind {
            name,
            expected: "string literal",
        }),
        None => Err(SettingsError::Missing(name)),
    }
}

fn pin_from_define(define: &Define, name: &'static str) -> Result<Pin, SettingsError> {
    match &define.value {
        Value::Token(token) => token
            .parse()
            .map_err(|source| SettingsError::InvalidPin { name, source }),
        _ => Err(SettingsError::WrongKind {
            name,
            expected: "pin token",
        }),
    }
}

fn read_pin(header: &Header, name: &'static str) -> Result<Pin, SettingsError> {
    let define = header.get(name).ok_or(SettingsError::Missing(name))?;
    pin_from_define(define, name)
}

/// An enabled definition wins; a commented-out one keeps its pin as the disabled default.
fn read_optional_pin(
    header: &Header,
    name: &'static str,
    fallback: Pin,
) -> Result<OptionalPin, SettingsError> {
    if let Some(define) = header.get(name) {
        return Ok(OptionalPin::enabled(pin_from_define(define, name)?));
    }
    match header.get_disabled(name) {
        Some(define) => Ok(OptionalPin::disabled(pin_from_define(define, name)?)),
        None => Ok(OptionalPin::disabled(fallback)),
    }
}

fn read_property(
    header: &Header,
    key: &'static str,
    name: &'static str,
    datatype: &'static str,
) -> Result<PropertyDescriptor, SettingsError> {
    Ok(PropertyDescriptor {
        key: read_string(header, key)?,
        name: read_string(header, name)?,
        datatype: read_string(header, datatype)?,
    })
}

fn str_define(name: &str, value: &str) -> Define {
    Define::new(name, Value::Str(value.to_string()), true)
}

fn pin_define(name: &str, pin: Pin, enabled: bool) -> Define {
    Define::new(name, Value::Token(pin.to_string()), enabled)
}

impl ClientSettings {
    pub fn from_header(header: &Header) -> Result<Self, SettingsError> {
        warn_unknown(header, CLIENT_SYMBOLS);

        Ok(Self {
            broker: BrokerSettings {
                ip: read_string(header, BROKERIP)?,
                port: read_string(header, BROKERPORT)?,
                retry: read_string(header, BROKERRETRY)?,
            },
            device: DeviceIdentity {
                id: read_string(header, DEVICEID)?,
                name: read_string(header, DEVICENAME)?,
            },
            node: NodeDescriptor {
                id: read_string(header, NODE01ID)?,
                name: read_string(header, NODE01NAME)?,
                node_type: read_string(header, NODE01TYPE)?,
                properties: [
                    read_property(header, NODE01PROP01, NODE01PROP01NAME, NODE01PROP01DATATYPE)?,
                    read_property(header, NODE01PROP02, NODE01PROP02NAME, NODE01PROP02DATATYPE)?,
                ],
            },
            special: SpecialParameters {
                first: read_string(header, SPECIAL01)?,
                second: read_string(header, SPECIAL02)?,
            },
        })
    }

    /// Render-ready `MMRCsettings.h`.
    pub fn to_header_document(&self) -> HeaderDocument {
        let [first, second] = &self.node.properties;

        HeaderDocument::new(BANNER)
            .blank()
            .comment("Device settings")
            .define(str_define(BROKERIP, &self.broker.ip))
            .define(str_define(BROKERPORT, &self.broker.port))
            .define(str_define(BROKERRETRY, &self.broker.retry))
            .define(str_define(DEVICEID, &self.device.id))
            .define(str_define(DEVICENAME, &self.device.name))
            .blank()
            .comment("Node one settings")
            .define(str_define(NODE01ID, &self.node.id))
            .define(str_define(NODE01NAME, &self.node.name))
            .define(str_define(NODE01TYPE, &self.node.node_type))
            .define(str_define(NODE01PROP01, &first.key))
            .define(str_define(NODE01PROP01NAME, &first.name))
            .define(str_define(NODE01PROP01DATATYPE, &first.datatype))
            .define(str_define(NODE01PROP02, &second.key))
            .define(str_define(NODE01PROP02NAME, &second.name))
            .define(str_define(NODE01PROP02DATATYPE, &second.datatype))
            .define(str_define(SPECIAL01, &self.special.first))
            .define(str_define(SPECIAL02, &self.special.second))
            .blank()
    }
}

impl StartSettings {
    pub fn from_header(header: &Header) -> Result<Self, SettingsError> {
        warn_unknown(header, START_SYMBOLS);
        let defaults = StartSettings::default().pins;

        Ok(Self {
            access_point: AccessPoint {
                name: read_string(header, APNAME)?,
                password: read_string(header, APPASSWORD)?,
            },
            pins: PinBindings {
                button: read_pin(header, BUTTON_PIN)?,
                led: read_pin(header, LED_PIN)?,
                config: read_optional_pin(header, CONFIG_PIN, defaults.config.pin)?,
                status: read_optional_pin(header, STATUS_PIN, defaults.status.pin)?,
            },
        })
    }

    /// Render-ready `mmrcSettings.h`.
    pub fn to_header_document(&self) -> HeaderDocument {
        let pins = &self.pins;

        HeaderDocument::new(BANNER)
            .comment("Access point")
            .define(str_define(APNAME, &self.access_point.name))
            .define(str_define(APPASSWORD, &self.access_point.password))
            .blank()
            .comment("Define which pin to use for the pushbutton")
            .define(pin_define(BUTTON_PIN, pins.button, true))
            .blank()
            .comment("Define which pin to use for LED output")
            .define(pin_define(LED_PIN, pins.led, true))
            .blank()
            .comment("Configuration pin")
            .comment(
                "When CONFIG_PIN is pulled to ground on startup, the client will use the initial\n\
                 password to build an AP. (E.g. in case of lost password)",
            )
            .define(pin_define(CONFIG_PIN, pins.config.pin, pins.config.enabled))
            .blank()
            .comment("Status indicator pin")
            .comment(
                "First it will light up (kept LOW), on Wifi connection it will blink\n\
                 and when connected to the Wifi it will turn off (kept HIGH).",
            )
            .define(pin_define(STATUS_PIN, pins.status.pin, pins.status.enabled))
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, SettingsError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::InvalidFlag {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

fn apply_overrides<F>(header: &mut Header, table: &[Symbol], lookup: &F) -> Result<(), SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    for symbol in table {
        let flag_key = enabled_key(symbol.name);
        let flag = if symbol.optional {
            lookup(&flag_key)
                .map(|v| parse_flag(&flag_key, &v))
                .transpose()?
        } else {
            None
        };

        match lookup(symbol.name) {
            Some(raw) => {
                let value = match symbol.kind {
                    Kind::Str => Value::Str(raw),
                    Kind::Pin => Value::Token(raw.trim().to_string()),
                };
                header.upsert(Define::new(symbol.name, value, flag.unwrap_or(true)));
            }
            None => {
                if let Some(enabled) = flag {
                    let existing = header
                        .get(symbol.name)
                        .or_else(|| header.get_disabled(symbol.name))
                        .cloned();
                    if let Some(mut define) = existing {
                        define.enabled = enabled;
                        header.upsert(define);
                    }
                }
            }
        }
    }
    Ok(())
}

impl Settings {
    /// Layer values from `lookup` over these settings.
    ///
    /// Keys are header symbol names. Setting an optional pin enables it unless its
    /// `<NAME>_ENABLED` key says otherwise; the flag alone toggles the current pin.
    pub fn with_overrides<F>(&self, lookup: F) -> Result<Settings, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut client = Header::from(&self.client.to_header_document());
        apply_overrides(&mut client, CLIENT_SYMBOLS, &lookup)?;
        let mut start = Header::from(&self.start.to_header_document());
        apply_overrides(&mut start, START_SYMBOLS, &lookup)?;

        Ok(Settings {
            client: ClientSettings::from_header(&client)?,
            start: StartSettings::from_header(&start)?,
        })
    }

    /// Build settings from a complete flat key/value source. Every non-optional symbol must
    /// be present.
    pub fn from_lookup<F>(lookup: F) -> Result<Settings, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(missing) = all_symbols().find(|s| !s.optional && lookup(s.name).is_none()) {
            return Err(SettingsError::Missing(missing.name));
        }
        Settings::default().with_overrides(lookup)
    }

    /// Flatten into `(symbol, value)` pairs, header order, optional pins followed by their
    /// enable switch.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let docs = [
            self.client.to_header_document(),
            self.start.to_header_document(),
        ];
        let mut pairs = Vec::new();

        for doc in &docs {
            for define in Header::from(doc).defines() {
                let text = match &define.value {
                    Value::Str(s) => s.clone(),
                    other => other.to_string(),
                };
                pairs.push((define.name.clone(), text));

                if all_symbols().any(|s| s.name == define.name && s.optional) {
                    pairs.push((enabled_key(&define.name), define.enabled.to_string()));
                }
            }
        }
        pairs
    }
}
