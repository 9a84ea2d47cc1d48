use crate::contract::symbols::*;
use crate::pin::{OptionalPin, Pin};
use crate::settings::{PropertyDescriptor, Settings};
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

pub const MAX_BROKER_RETRY: u32 = 100;
const MAX_AP_NAME_LEN: usize = 32;
const MIN_AP_PASSWORD_LEN: usize = 8;
const MAX_AP_PASSWORD_LEN: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub symbol: String,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.symbol, self.message)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{} invalid setting(s): {}", .0.len(), render_issues(.0))]
pub struct ValidationErrors(pub Vec<Issue>);

fn render_issues(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(Issue::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn issues(&self) -> &[Issue] {
        &self.0
    }
}

#[derive(Default)]
struct Report(Vec<Issue>);

impl Report {
    fn issue(&mut self, symbol: &str, message: impl Into<String>) {
        self.0.push(Issue {
            symbol: symbol.to_string(),
            message: message.into(),
        });
    }

    fn require(&mut self, symbol: &str, value: &str) {
        if value.trim().is_empty() {
            self.issue(symbol, "must not be empty");
        }
    }

    fn pin(&mut self, symbol: &str, pin: Pin) {
        if let Err(e) = pin.check_range() {
            self.issue(symbol, e.to_string());
        }
    }

    fn optional_pin(&mut self, symbol: &str, pin: OptionalPin) {
        if let Some(pin) = pin.active() {
            self.pin(symbol, pin);
        }
    }

    fn property(&mut self, symbols: [&str; 3], property: &PropertyDescriptor) {
        if property.is_complete() {
            return;
        }
        let [key, name, datatype] = symbols;
        self.require(key, &property.key);
        self.require(name, &property.name);
        self.require(datatype, &property.datatype);
    }
}

impl Settings {
    /// Check every constant, collecting all problems instead of stopping at the first.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut report = Report::default();
        let client = &self.client;
        let start = &self.start;

        if client.broker.ip.trim().parse::<IpAddr>().is_err() {
            report.issue(BROKERIP, format!("'{}' is not an IP address", client.broker.ip));
        }
        match client.broker.port() {
            Ok(0) => report.issue(BROKERPORT, "port must not be 0"),
            Ok(_) => {}
            Err(e) => report.issue(BROKERPORT, e.to_string()),
        }
        match client.broker.retry() {
            Ok(n) if n > MAX_BROKER_RETRY => report.issue(
                BROKERRETRY,
                format!("must be at most {}, got {}", MAX_BROKER_RETRY, n),
            ),
            Ok(_) => {}
            Err(e) => report.issue(BROKERRETRY, e.to_string()),
        }
        if let Err(e) = client.special.first() {
            report.issue(SPECIAL01, e.to_string());
        }
        if let Err(e) = client.special.second() {
            report.issue(SPECIAL02, e.to_string());
        }

        report.require(DEVICEID, &client.device.id);
        report.require(NODE01ID, &client.node.id);
        report.require(NODE01TYPE, &client.node.node_type);

        let [first, second] = &client.node.properties;
        report.property([NODE01PROP01, NODE01PROP01NAME, NODE01PROP01DATATYPE], first);
        report.property([NODE01PROP02, NODE01PROP02NAME, NODE01PROP02DATATYPE], second);
        if !first.key.trim().is_empty() && first.key == second.key {
            report.issue(NODE01PROP02, format!("duplicates property key '{}'", first.key));
        }

        let ap = &start.access_point;
        if ap.name.is_empty() || ap.name.len() > MAX_AP_NAME_LEN {
            report.issue(APNAME, format!("must be 1-{} bytes", MAX_AP_NAME_LEN));
        }
        if !ap.password.is_empty()
            && !(MIN_AP_PASSWORD_LEN..=MAX_AP_PASSWORD_LEN).contains(&ap.password.len())
        {
            report.issue(
                APPASSWORD,
                format!(
                    "must be empty or {}-{} bytes",
                    MIN_AP_PASSWORD_LEN, MAX_AP_PASSWORD_LEN
                ),
            );
        }

        report.pin(BUTTON_PIN, start.pins.button);
        report.pin(LED_PIN, start.pins.led);
        report.optional_pin(CONFIG_PIN, start.pins.config);
        report.optional_pin(STATUS_PIN, start.pins.status);

        if report.0.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(report.0))
        }
    }
}
