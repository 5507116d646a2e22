use std::fmt;

use crate::error::{ConfigError, DecodeError};
use crate::lookup::Thresholds;
use crate::protocol::{
    CONFIGURATION_UPLINK_INTERVAL, Command, ERROR_COUNTER_THRESHOLD, MAX_FRAGMENT_LEN,
    MAX_UPLINK_INTERVAL, NoiseLevel, WARN_COUNTER_THRESHOLD,
};
use crate::steamtrap::{SteamTrapType, ValidatedRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    fport: u8,

    uplink_interval: u32,

    reset_error_counters: bool,
}

impl EncoderSettings {
    pub fn new(
        fport: u8,
        uplink_interval: u32,
        reset_error_counters: bool,
    ) -> Result<Self, ConfigError> {
        if !(1..=223).contains(&fport) {
            return Err(ConfigError::Invalid(format!(
                "fport {fport} is outside the application range 1..=223"
            )));
        }
        if !(1..=MAX_UPLINK_INTERVAL).contains(&uplink_interval) {
            return Err(ConfigError::Invalid(format!(
                "uplink frequency {uplink_interval} s does not fit 24 bits"
            )));
        }

        Ok(Self {
            fport,
            uplink_interval,
            reset_error_counters,
        })
    }

    pub fn fport(&self) -> u8 {
        self.fport
    }

    pub fn uplink_interval(&self) -> u32 {
        self.uplink_interval
    }

    pub fn reset_error_counters(&self) -> bool {
        self.reset_error_counters
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    index: usize,

    bytes: Vec<u8>,
}

impl Fragment {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    fport: u8,

    fragments: Vec<Fragment>,
}

impl EncodedPayload {
    pub fn new(fport: u8, fragments: impl IntoIterator<Item = Vec<u8>>) -> Self {
        let fragments = fragments
            .into_iter()
            .enumerate()
            .map(|(index, bytes)| Fragment { index, bytes })
            .collect();

        Self { fport, fragments }
    }

    /// Parses fragments as stored in the generated-downlinks file.
    pub fn from_hex<S: AsRef<str>>(fport: u8, fragments: &[S]) -> Result<Self, DecodeError> {
        if fragments.is_empty() {
            return Err(DecodeError::NoFragments);
        }
        let mut decoded = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            let value = fragment.as_ref().trim();
            let bytes = hex::decode(value).map_err(|e| DecodeError::Hex {
                value: value.to_owned(),
                reason: e.to_string(),
            })?;
            if bytes.is_empty() {
                return Err(DecodeError::Empty);
            }
            if bytes.len() > MAX_FRAGMENT_LEN {
                return Err(DecodeError::Hex {
                    value: value.to_owned(),
                    reason: format!("longer than {MAX_FRAGMENT_LEN} bytes"),
                });
            }
            decoded.push(bytes);
        }

        Ok(Self::new(fport, decoded))
    }

    pub fn fport(&self) -> u8 {
        self.fport
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn to_hex(&self) -> Vec<String> {
        self.fragments.iter().map(Fragment::to_hex).collect()
    }
}

/// Command sequence for one validated record, in transmission order.
pub fn commands(record: &ValidatedRecord, settings: &EncoderSettings) -> Vec<Command> {
    let trap_type = record.trap_type();
    let steam = record.steam();

    let mut commands = vec![
        Command::UplinkInterval(CONFIGURATION_UPLINK_INTERVAL),
        Command::TrapType(trap_type),
        Command::SteamTemperature(whole_celsius(steam.temperature_celsius)),
    ];
    commands.extend(threshold_commands(trap_type, &record.thresholds()));
    commands.push(Command::WarnCounterThreshold(WARN_COUNTER_THRESHOLD));
    commands.push(Command::ErrorCounterThreshold(ERROR_COUNTER_THRESHOLD));
    if settings.reset_error_counters {
        commands.push(Command::ResetCounters);
    }
    commands.push(Command::UplinkInterval(settings.uplink_interval));

    commands
}

fn threshold_commands(
    trap_type: SteamTrapType,
    thresholds: &Thresholds,
) -> impl Iterator<Item = Command> {
    let noise = [
        (NoiseLevel::Tv, thresholds.noise_tv),
        (NoiseLevel::Lv, thresholds.noise_lv),
    ]
    .into_iter()
    .map(move |(level, value)| Command::NoiseThreshold {
        trap_type,
        level,
        value,
    });

    let steam_loss = thresholds
        .steam_loss
        .into_iter()
        .flat_map(|level| [level.threshold, level.value])
        .zip(0u8..)
        .map(move |(value, slot)| Command::SteamLoss {
            trap_type,
            slot,
            value,
        });

    noise.chain(steam_loss)
}

pub fn encode(record: &ValidatedRecord, settings: &EncoderSettings) -> EncodedPayload {
    EncodedPayload::new(
        settings.fport,
        commands(record, settings).iter().map(Command::to_bytes),
    )
}

fn whole_celsius(celsius: f64) -> u8 {
    celsius.round().clamp(0.0, f64::from(u8::MAX)) as u8
}
