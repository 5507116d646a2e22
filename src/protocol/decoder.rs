use crate::error::DecodeError;
use crate::lookup::{SteamLossLevel, Thresholds};
use crate::protocol::{Command, EncodedPayload, NoiseLevel};
use crate::steamtrap::SteamTrapType;

/// Device configuration recovered from a downlink sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedConfiguration {
    pub trap_type: SteamTrapType,

    pub steam_temperature_celsius: u8,

    pub thresholds: Thresholds,

    pub warn_counter_threshold: u16,

    pub error_counter_threshold: u16,

    pub reset_counters: bool,

    /// Interval the device uses while the configuration is being applied.
    pub configuration_interval: u32,

    pub uplink_interval: u32,
}

pub fn decode(payload: &EncodedPayload) -> Result<DecodedConfiguration, DecodeError> {
    decode_fragments(payload.fragments().iter().map(|f| f.bytes()))
}

pub fn decode_fragments<'a>(
    fragments: impl IntoIterator<Item = &'a [u8]>,
) -> Result<DecodedConfiguration, DecodeError> {
    let mut trap_type = None;
    let mut temperature = None;
    let mut noise = [None; 2];
    let mut steam_loss = [None; 6];
    let mut warn = None;
    let mut error = None;
    let mut reset_counters = false;
    let mut intervals = Vec::new();

    for fragment in fragments {
        match Command::parse(fragment)? {
            Command::UplinkInterval(secs) => intervals.push(secs),
            Command::TrapType(t) => trap_type = Some(t),
            Command::SteamTemperature(c) => temperature = Some(c),
            Command::NoiseThreshold { level, value, .. } => match level {
                NoiseLevel::Tv => noise[0] = Some(value),
                NoiseLevel::Lv => noise[1] = Some(value),
            },
            Command::SteamLoss { slot, value, .. } => steam_loss[usize::from(slot)] = Some(value),
            Command::WarnCounterThreshold(n) => warn = Some(n),
            Command::ErrorCounterThreshold(n) => error = Some(n),
            Command::ResetCounters => reset_counters = true,
        }
    }

    let (Some(&configuration_interval), Some(&uplink_interval)) = (intervals.first(), intervals.last())
    else {
        return Err(DecodeError::MissingCommand("uplink interval"));
    };

    let slot = |i: usize| steam_loss[i].ok_or(DecodeError::MissingCommand("steam loss"));
    let mut levels = [SteamLossLevel::default(); 3];
    for (i, level) in levels.iter_mut().enumerate() {
        level.threshold = slot(2 * i)?;
        level.value = slot(2 * i + 1)?;
    }

    Ok(DecodedConfiguration {
        trap_type: trap_type.ok_or(DecodeError::MissingCommand("trap type"))?,
        steam_temperature_celsius: temperature
            .ok_or(DecodeError::MissingCommand("steam temperature"))?,
        thresholds: Thresholds {
            noise_tv: noise[0].ok_or(DecodeError::MissingCommand("noise threshold"))?,
            noise_lv: noise[1].ok_or(DecodeError::MissingCommand("noise threshold"))?,
            steam_loss: levels,
        },
        warn_counter_threshold: warn.ok_or(DecodeError::MissingCommand("warn counter"))?,
        error_counter_threshold: error.ok_or(DecodeError::MissingCommand("error counter"))?,
        reset_counters,
        configuration_interval,
        uplink_interval,
    })
}
