use std::ops::RangeInclusive;

use crate::error::DecodeError;
use crate::steamtrap::SteamTrapType;

/// LoRaWAN DR0 application payload floor.
pub const MAX_FRAGMENT_LEN: usize = 11;

/// Fast check-in interval used while the configuration is applied.
pub const CONFIGURATION_UPLINK_INTERVAL: u32 = 149;

pub const MAX_UPLINK_INTERVAL: u32 = 0xFF_FFFF;

pub const WARN_COUNTER_THRESHOLD: u16 = 36;

pub const ERROR_COUNTER_THRESHOLD: u16 = 72;

/// Temperatures the one-byte temperature command can carry.
pub const SST_CELSIUS_RANGE: RangeInclusive<f64> = 0.0..=255.0;

pub const OP_UPLINK_INTERVAL: u8 = 0x01;
pub const OP_RESET_COUNTERS: u8 = 0x04;
pub const OP_TRAP_TYPE: u8 = 0x0A;
pub const OP_STEAM_TEMPERATURE: u8 = 0x82;
pub const OP_NOISE_THRESHOLD: u8 = 0x83;
pub const OP_WARN_COUNTER: u8 = 0x84;
pub const OP_ERROR_COUNTER: u8 = 0x85;
pub const OP_STEAM_LOSS: u8 = 0x8D;

const TRAP_TYPE_MARKER: u8 = 0x50;
const COUNTER_SELECTOR: u8 = 0x02;
const RESET_ALL_COUNTERS: u8 = 0xFC;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseLevel {
    /// Transition value.
    Tv,
    /// Leak value.
    Lv,
}

impl NoiseLevel {
    fn code(&self) -> u8 {
        match self {
            NoiseLevel::Tv => 0,
            NoiseLevel::Lv => 1,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(NoiseLevel::Tv),
            1 => Some(NoiseLevel::Lv),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Seconds between uplinks, 24 bit.
    UplinkInterval(u32),

    TrapType(SteamTrapType),

    /// Whole degrees Celsius.
    SteamTemperature(u8),

    NoiseThreshold {
        trap_type: SteamTrapType,
        level: NoiseLevel,
        value: u8,
    },

    /// Slots 0..=5 alternate threshold and value: th0, val0, th1, val1, th2, val2.
    SteamLoss {
        trap_type: SteamTrapType,
        slot: u8,
        value: u8,
    },

    WarnCounterThreshold(u16),

    ErrorCounterThreshold(u16),

    ResetCounters,
}

impl Command {
    pub fn opcode(&self) -> u8 {
        match self {
            Command::UplinkInterval(_) => OP_UPLINK_INTERVAL,
            Command::TrapType(_) => OP_TRAP_TYPE,
            Command::SteamTemperature(_) => OP_STEAM_TEMPERATURE,
            Command::NoiseThreshold { .. } => OP_NOISE_THRESHOLD,
            Command::SteamLoss { .. } => OP_STEAM_LOSS,
            Command::WarnCounterThreshold(_) => OP_WARN_COUNTER,
            Command::ErrorCounterThreshold(_) => OP_ERROR_COUNTER,
            Command::ResetCounters => OP_RESET_COUNTERS,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let op = self.opcode();
        match *self {
            Command::UplinkInterval(secs) => {
                let [_, hi, mid, lo] = secs.min(MAX_UPLINK_INTERVAL).to_be_bytes();
                vec![op, hi, mid, lo]
            }
            Command::TrapType(t) => vec![op, TRAP_TYPE_MARKER | t.code()],
            Command::SteamTemperature(celsius) => vec![op, celsius],
            Command::NoiseThreshold {
                trap_type,
                level,
                value,
            } => vec![op, trap_type.code(), level.code(), value],
            Command::SteamLoss {
                trap_type,
                slot,
                value,
            } => vec![op, trap_type.code(), slot, value],
            Command::WarnCounterThreshold(n) | Command::ErrorCounterThreshold(n) => {
                let [hi, lo] = n.to_be_bytes();
                vec![op, COUNTER_SELECTOR, hi, lo]
            }
            Command::ResetCounters => vec![op, RESET_ALL_COUNTERS],
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let Some(&op) = bytes.first() else {
            return Err(DecodeError::Empty);
        };

        let expected = match op {
            OP_UPLINK_INTERVAL => 4,
            OP_RESET_COUNTERS | OP_TRAP_TYPE | OP_STEAM_TEMPERATURE => 2,
            OP_NOISE_THRESHOLD | OP_STEAM_LOSS | OP_WARN_COUNTER | OP_ERROR_COUNTER => 4,
            other => return Err(DecodeError::UnknownCommand(other)),
        };
        if bytes.len() < expected {
            return Err(DecodeError::Truncated {
                command: op,
                expected,
                actual: bytes.len(),
            });
        }
        if bytes.len() > expected {
            return Err(DecodeError::InvalidField {
                command: op,
                field: "length",
                value: u8::try_from(bytes.len()).unwrap_or(u8::MAX),
            });
        }

        let invalid = |field, value| DecodeError::InvalidField {
            command: op,
            field,
            value,
        };
        let trap_type =
            |code: u8| SteamTrapType::from_code(code).ok_or_else(|| invalid("trap type", code));

        let command = match op {
            OP_UPLINK_INTERVAL => {
                Command::UplinkInterval(u32::from_be_bytes([0, bytes[1], bytes[2], bytes[3]]))
            }
            OP_TRAP_TYPE => {
                if bytes[1] & 0xF0 != TRAP_TYPE_MARKER {
                    return Err(invalid("trap type marker", bytes[1]));
                }
                Command::TrapType(trap_type(bytes[1] & 0x0F)?)
            }
            OP_STEAM_TEMPERATURE => Command::SteamTemperature(bytes[1]),
            OP_NOISE_THRESHOLD => Command::NoiseThreshold {
                trap_type: trap_type(bytes[1])?,
                level: NoiseLevel::from_code(bytes[2]).ok_or_else(|| invalid("noise level", bytes[2]))?,
                value: bytes[3],
            },
            OP_STEAM_LOSS => {
                if bytes[2] > 5 {
                    return Err(invalid("steam loss slot", bytes[2]));
                }
                Command::SteamLoss {
                    trap_type: trap_type(bytes[1])?,
                    slot: bytes[2],
                    value: bytes[3],
                }
            }
            OP_WARN_COUNTER | OP_ERROR_COUNTER => {
                if bytes[1] != COUNTER_SELECTOR {
                    return Err(invalid("counter selector", bytes[1]));
                }
                let n = u16::from_be_bytes([bytes[2], bytes[3]]);
                if op == OP_WARN_COUNTER {
                    Command::WarnCounterThreshold(n)
                } else {
                    Command::ErrorCounterThreshold(n)
                }
            }
            _ => {
                if bytes[1] != RESET_ALL_COUNTERS {
                    return Err(invalid("counter mask", bytes[1]));
                }
                Command::ResetCounters
            }
        };

        Ok(command)
    }
}
