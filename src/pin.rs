use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const BUILTIN_LED: &str = "LED_BUILTIN";

/// Highest `D<n>` alias a supported board exposes.
pub const MAX_DIGITAL: u8 = 16;
/// Highest `A<n>` alias a supported board exposes.
pub const MAX_ANALOG: u8 = 7;
/// Highest raw GPIO number accepted.
pub const MAX_GPIO: u8 = 48;

/// A symbolic pin identifier as it appears in the firmware headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Pin {
    /// Board digital alias, e.g. `D5`.
    Digital(u8),
    /// Board analog alias, e.g. `A0`.
    Analog(u8),
    /// The board's on-board LED.
    LedBuiltin,
    /// Raw GPIO number.
    Gpio(u8),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PinError {
    #[error("'{0}' is not a pin identifier")]
    Unrecognized(String),
    #[error("pin '{token}' is out of range (max {max})")]
    OutOfRange { token: String, max: u8 },
}

impl Pin {
    /// Check that the pin number is one a board can actually expose.
    pub fn check_range(&self) -> Result<(), PinError> {
        let (n, max) = match *self {
            Pin::Digital(n) => (n, MAX_DIGITAL),
            Pin::Analog(n) => (n, MAX_ANALOG),
            Pin::Gpio(n) => (n, MAX_GPIO),
            Pin::LedBuiltin => return Ok(()),
        };
        if n > max {
            return Err(PinError::OutOfRange {
                token: self.to_string(),
                max,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pin::Digital(n) => write!(f, "D{}", n),
            Pin::Analog(n) => write!(f, "A{}", n),
            Pin::LedBuiltin => f.write_str(BUILTIN_LED),
            Pin::Gpio(n) => write!(f, "{}", n),
        }
    }
}

impl FromStr for Pin {
    type Err = PinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        let unrecognized = || PinError::Unrecognized(token.to_string());

        if token == BUILTIN_LED {
            return Ok(Pin::LedBuiltin);
        }

        let pin = if let Some(n) = token.strip_prefix('D') {
            Pin::Digital(n.parse().map_err(|_| unrecognized())?)
        } else if let Some(n) = token.strip_prefix('A') {
            Pin::Analog(n.parse().map_err(|_| unrecognized())?)
        } else if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            Pin::Gpio(token.parse().map_err(|_| unrecognized())?)
        } else {
            return Err(unrecognized());
        };

        pin.check_range()?;
        Ok(pin)
    }
}

impl TryFrom<String> for Pin {
    type Error = PinError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Pin> for String {
    fn from(pin: Pin) -> Self {
        pin.to_string()
    }
}

/// A pin binding that ships commented out.
///
/// The suggested pin is kept while disabled so that rendering the header reproduces the
/// commented-out `#define`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalPin {
    pub pin: Pin,
    pub enabled: bool,
}

impl OptionalPin {
    pub const fn disabled(pin: Pin) -> Self {
        Self { pin, enabled: false }
    }

    pub const fn enabled(pin: Pin) -> Self {
        Self { pin, enabled: true }
    }

    /// The pin, if the binding is active.
    pub fn active(&self) -> Option<Pin> {
        self.enabled.then_some(self.pin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_board_aliases() {
        assert_eq!("D5".parse::<Pin>(), Ok(Pin::Digital(5)));
        assert_eq!("A0".parse::<Pin>(), Ok(Pin::Analog(0)));
        assert_eq!("LED_BUILTIN".parse::<Pin>(), Ok(Pin::LedBuiltin));
        assert_eq!(" 14 ".parse::<Pin>(), Ok(Pin::Gpio(14)));
    }

    #[test]
    fn rejects_unknown_tokens() {
        assert_eq!(
            "LED".parse::<Pin>(),
            Err(PinError::Unrecognized("LED".to_string()))
        );
        assert!("D".parse::<Pin>().is_err());
        assert!("Dx".parse::<Pin>().is_err());
        assert!("".parse::<Pin>().is_err());
        assert!("-3".parse::<Pin>().is_err());
    }

    #[test]
    fn rejects_out_of_range_pins() {
        assert_eq!(
            "D17".parse::<Pin>(),
            Err(PinError::OutOfRange {
                token: "D17".to_string(),
                max: MAX_DIGITAL
            })
        );
        assert!("A8".parse::<Pin>().is_err());
        assert!("49".parse::<Pin>().is_err());
        assert!("48".parse::<Pin>().is_ok());
    }

    #[test]
    fn display_matches_header_token() {
        assert_eq!(Pin::Digital(2).to_string(), "D2");
        assert_eq!(Pin::LedBuiltin.to_string(), "LED_BUILTIN");
        assert_eq!(Pin::Gpio(4).to_string(), "4");
    }

    #[test]
    fn serializes_as_token_string() {
        let json = serde_json::to_string(&Pin::Digital(5)).unwrap();
        assert_eq!(json, "\"D5\"");
        let pin: Pin = serde_json::from_str("\"LED_BUILTIN\"").unwrap();
        assert_eq!(pin, Pin::LedBuiltin);
        assert!(serde_json::from_str::<Pin>("\"Q1\"").is_err());
    }

    #[test]
    fn optional_pin_is_inactive_while_disabled() {
        let pin = OptionalPin::disabled(Pin::Digital(2));
        assert_eq!(pin.active(), None);
        assert_eq!(OptionalPin::enabled(Pin::Digital(2)).active(), Some(Pin::Digital(2)));
    }
}
