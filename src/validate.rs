//! Per steam-trap-type validation of raw parameter rows.
//!
//! Every violation on a row is collected so the sheet can be fixed in one
//! pass. The only early exit is an unknown steam trap type, since the
//! required field set depends on it.

use std::ops::RangeInclusive;
use std::str::FromStr;

use tracing::debug;

use crate::device::DeviceIdentifier;
use crate::error::{RecordError, ValidationError};
use crate::lookup::{LookupTables, ProfileQuery, SteamState, Thresholds};
use crate::protocol::SST_CELSIUS_RANGE;
use crate::steamtrap::{
    FloatTrap, MountingType, ParameterRecord, SteamTrapType, TemperatureTrap, ValidatedRecord,
};

pub const DN_RANGE_MM: RangeInclusive<u16> = 15..=300;

/// Ball-float traps from DN 40 upwards report steam loss with a factor of 4.
pub const UNA_CORRECTION_MIN_DN_MM: u16 = 40;
pub const UNA_STEAM_LOSS_CORRECTION: u8 = 4;

enum TrapFields {
    Temperature { sst_celsius: f64, steam: SteamState },
    Float { dn_mm: u16, dp_bar: f64, steam: SteamState },
}

impl TrapFields {
    fn steam(&self) -> SteamState {
        match self {
            TrapFields::Temperature { steam, .. } | TrapFields::Float { steam, .. } => *steam,
        }
    }

    fn correction(&self) -> u8 {
        match self {
            TrapFields::Float { dn_mm, .. } if *dn_mm >= UNA_CORRECTION_MIN_DN_MM => {
                UNA_STEAM_LOSS_CORRECTION
            }
            _ => 1,
        }
    }
}

pub fn validate(
    record: &ParameterRecord,
    tables: &LookupTables,
) -> Result<ValidatedRecord, RecordError> {
    let row = record.row;
    let mut errors = Vec::new();

    let trap_type = match record.stt.as_deref() {
        Some(raw) => Some(
            raw.parse::<SteamTrapType>()
                .map_err(|source| RecordError::UnsupportedType { row, source })?,
        ),
        None => {
            errors.push(ValidationError::Missing { field: "stt" });
            None
        }
    };

    let deveui: Option<DeviceIdentifier> = required(&mut errors, "deveui", &record.deveui);
    let mounting: Option<MountingType> = required(&mut errors, "dmt", &record.dmt);

    let fields = match trap_type {
        Some(SteamTrapType::Bimetallic | SteamTrapType::Membrane) => {
            temperature_fields(&mut errors, record, tables)
        }
        Some(SteamTrapType::BallFloat) => float_fields(&mut errors, record, tables),
        None => None,
    };

    let thresholds = match (trap_type, mounting, &fields) {
        (Some(trap_type), Some(mounting), Some(fields)) => {
            thresholds(&mut errors, record, tables, trap_type, mounting, fields)
        }
        _ => None,
    };

    match (trap_type, deveui, mounting, fields, thresholds) {
        (Some(trap_type), Some(deveui), Some(mounting), Some(fields), Some(thresholds))
            if errors.is_empty() =>
        {
            debug!(row, %deveui, %trap_type, "validated parameter record");
            Ok(assemble(trap_type, deveui, mounting, fields, thresholds))
        }
        _ => Err(RecordError::Invalid { row, errors }),
    }
}

fn assemble(
    trap_type: SteamTrapType,
    deveui: DeviceIdentifier,
    mounting: MountingType,
    fields: TrapFields,
    thresholds: Thresholds,
) -> ValidatedRecord {
    match fields {
        TrapFields::Temperature { sst_celsius, steam } => {
            let trap = TemperatureTrap {
                deveui,
                mounting,
                sst_celsius,
                steam,
                thresholds,
            };
            match trap_type {
                SteamTrapType::Membrane => ValidatedRecord::Membrane(trap),
                _ => ValidatedRecord::Bimetallic(trap),
            }
        }
        TrapFields::Float {
            dn_mm,
            dp_bar,
            steam,
        } => ValidatedRecord::BallFloat(FloatTrap {
            deveui,
            mounting,
            dn_mm,
            dp_bar,
            steam,
            thresholds,
        }),
    }
}

fn temperature_fields(
    errors: &mut Vec<ValidationError>,
    record: &ParameterRecord,
    tables: &LookupTables,
) -> Option<TrapFields> {
    let raw_sst = required(errors, "sst", &record.sst)?;
    let sst_celsius: f64 = finite(errors, "sst", raw_sst)?;
    let steam = match tables.steam.at_temperature(sst_celsius) {
        Ok(steam) => steam,
        Err(source) => {
            errors.push(ValidationError::OutOfRange { field: "sst", source });
            return None;
        }
    };

    if !SST_CELSIUS_RANGE.contains(&sst_celsius) {
        errors.push(ValidationError::Constraint {
            field: "sst",
            reason: format!(
                "{sst_celsius} °C is not representable, expected {}..={} °C",
                SST_CELSIUS_RANGE.start(),
                SST_CELSIUS_RANGE.end()
            ),
        });
        return None;
    }

    Some(TrapFields::Temperature { sst_celsius, steam })
}

fn float_fields(
    errors: &mut Vec<ValidationError>,
    record: &ParameterRecord,
    tables: &LookupTables,
) -> Option<TrapFields> {
    let dn_mm: Option<u16> = required(errors, "dn", &record.dn);
    let dn_mm = dn_mm.filter(|dn| {
        let ok = DN_RANGE_MM.contains(dn);
        if !ok {
            errors.push(ValidationError::Constraint {
                field: "dn",
                reason: format!(
                    "DN {dn} outside {}..={} mm",
                    DN_RANGE_MM.start(),
                    DN_RANGE_MM.end()
                ),
            });
        }
        ok
    });

    let dp_bar = required(errors, "dp", &record.dp).and_then(|v| finite(errors, "dp", v));
    let steam = dp_bar.and_then(|dp| match tables.steam.at_pressure(dp) {
        Ok(steam) if SST_CELSIUS_RANGE.contains(&steam.temperature_celsius) => Some(steam),
        Ok(steam) => {
            errors.push(ValidationError::Constraint {
                field: "dp",
                reason: format!(
                    "saturation temperature {:.1} °C is not representable",
                    steam.temperature_celsius
                ),
            });
            None
        }
        Err(source) => {
            errors.push(ValidationError::OutOfRange { field: "dp", source });
            None
        }
    });

    Some(TrapFields::Float {
        dn_mm: dn_mm?,
        dp_bar: dp_bar?,
        steam: steam?,
    })
}

fn thresholds(
    errors: &mut Vec<ValidationError>,
    record: &ParameterRecord,
    tables: &LookupTables,
    trap_type: SteamTrapType,
    mounting: MountingType,
    fields: &TrapFields,
) -> Option<Thresholds> {
    let query = ProfileQuery {
        trap_type,
        mounting,
        hardware_model: record.hardware_model.as_deref(),
        condensate_load: record.condensate_load.as_deref(),
        pressure_bar: fields.steam().pressure_bar,
    };

    let Some(profile) = tables.thresholds.find(&query) else {
        errors.push(ValidationError::Constraint {
            field: "thresholds",
            reason: format!(
                "no threshold profile matches {trap_type}/{mounting} at {:.2} bar",
                query.pressure_bar
            ),
        });
        return None;
    };

    let factor = fields.correction();
    let corrected = profile.thresholds.with_steam_loss_correction(factor);
    if corrected.is_none() {
        errors.push(ValidationError::Constraint {
            field: "thresholds",
            reason: format!("steam-loss values exceed one byte after correction x{factor}"),
        });
    }

    corrected
}

fn required<T>(
    errors: &mut Vec<ValidationError>,
    field: &'static str,
    raw: &Option<String>,
) -> Option<T>
where
    T: FromStr,
    T::Err: ToString,
{
    let Some(raw) = raw.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
        errors.push(ValidationError::Missing { field });
        return None;
    };

    match raw.parse() {
        Ok(value) => Some(value),
        Err(err) => {
            errors.push(ValidationError::Malformed {
                field,
                value: raw.to_owned(),
                reason: err.to_string(),
            });
            None
        }
    }
}

fn finite(errors: &mut Vec<ValidationError>, field: &'static str, value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        errors.push(ValidationError::Malformed {
            field,
            value: value.to_string(),
            reason: "not a finite number".into(),
        });
        None
    }
}
