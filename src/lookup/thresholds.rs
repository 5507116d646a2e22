//! Decision parameter matrix ("Conf-Table" sheet).
//!
//! Each row maps a device class and pressure band to the noise and
//! steam-loss thresholds the firmware should use. Blank hardware-model or
//! condensate-load cells match any value.

use std::io;
use std::path::Path;

use csv::Reader;

use crate::error::TableError;
use crate::sheet::{Columns, cell, parse_cell};
use crate::steamtrap::{MountingType, SteamTrapType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SteamLossLevel {
    pub threshold: u8,

    pub value: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Thresholds {
    pub noise_tv: u8,

    pub noise_lv: u8,

    pub steam_loss: [SteamLossLevel; 3],
}

impl Thresholds {
    /// Scales the steam-loss values; `None` if any no longer fits a byte.
    pub fn with_steam_loss_correction(&self, factor: u8) -> Option<Thresholds> {
        let mut corrected = *self;
        for level in corrected.steam_loss.iter_mut() {
            level.value = level.value.checked_mul(factor)?;
        }
        Some(corrected)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdProfile {
    pub trap_type: SteamTrapType,

    pub mounting: MountingType,

    pub hardware_model: Option<String>,

    pub condensate_load: Option<String>,

    pub pressure_min_bar: f64,

    pub pressure_max_bar: f64,

    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, Copy)]
pub struct ProfileQuery<'a> {
    pub trap_type: SteamTrapType,

    pub mounting: MountingType,

    pub hardware_model: Option<&'a str>,

    pub condensate_load: Option<&'a str>,

    pub pressure_bar: f64,
}

impl ThresholdProfile {
    pub fn matches(&self, query: &ProfileQuery<'_>) -> bool {
        self.trap_type == query.trap_type
            && self.mounting == query.mounting
            && wildcard_matches(self.hardware_model.as_deref(), query.hardware_model)
            && wildcard_matches(self.condensate_load.as_deref(), query.condensate_load)
            && query.pressure_bar >= self.pressure_min_bar
            && query.pressure_bar <= self.pressure_max_bar
    }
}

fn wildcard_matches(profile: Option<&str>, query: Option<&str>) -> bool {
    match (profile, query) {
        (None, _) => true,
        (Some(p), Some(q)) => p.eq_ignore_ascii_case(q.trim()),
        (Some(_), None) => false,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdTable {
    profiles: Vec<ThresholdProfile>,
}

impl ThresholdTable {
    pub fn new(profiles: Vec<ThresholdProfile>) -> Self {
        Self { profiles }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TableError> {
        Self::from_csv(Reader::from_path(path)?)
    }

    pub fn from_reader(reader: impl io::Read) -> Result<Self, TableError> {
        Self::from_csv(Reader::from_reader(reader))
    }

    fn from_csv<R: io::Read>(mut reader: Reader<R>) -> Result<Self, TableError> {
        let columns = Columns::from_headers(reader.headers()?);
        let stt = columns.require(&["stt", "steam-trap-type"])?;
        let dmt = columns.require(&["dmt", "mounting-type"])?;
        let hardware_model = columns.find(&["hardware-model"]);
        let condensate_load = columns.find(&["condensate-load"]);
        let p_min = columns.require(&["p-min"])?;
        let p_max = columns.require(&["p-max"])?;
        let tv = columns.require(&["tv"])?;
        let lv = columns.require(&["lv"])?;
        let mut steam_loss = [(0, 0); 3];
        for (i, level) in steam_loss.iter_mut().enumerate() {
            *level = (
                columns.require(&[format!("slth{i}").as_str()])?,
                columns.require(&[format!("slval{i}").as_str()])?,
            );
        }

        let mut profiles = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record?;
            let row = i + 1;

            let trap_type = parse_cell(&record, stt, row, "stt")?;
            let mounting = parse_cell(&record, dmt, row, "dmt")?;
            let mut levels = [SteamLossLevel::default(); 3];
            for (level, (th, val)) in levels.iter_mut().zip(steam_loss) {
                level.threshold = parse_cell(&record, th, row, "slth")?;
                level.value = parse_cell(&record, val, row, "slval")?;
            }

            profiles.push(ThresholdProfile {
                trap_type,
                mounting,
                hardware_model: cell(&record, hardware_model).map(str::to_owned),
                condensate_load: cell(&record, condensate_load).map(str::to_owned),
                pressure_min_bar: parse_cell(&record, p_min, row, "p-min")?,
                pressure_max_bar: parse_cell(&record, p_max, row, "p-max")?,
                thresholds: Thresholds {
                    noise_tv: parse_cell(&record, tv, row, "tv")?,
                    noise_lv: parse_cell(&record, lv, row, "lv")?,
                    steam_loss: levels,
                },
            });
        }

        Ok(Self { profiles })
    }

    /// First matching row wins, in sheet order.
    pub fn find(&self, query: &ProfileQuery<'_>) -> Option<&ThresholdProfile> {
        self.profiles.iter().find(|p| p.matches(query))
    }

    pub fn profiles(&self) -> &[ThresholdProfile] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONF_TABLE: &str = "\
Steam Trap Type,Mounting Type,Hardware Model,Condensate Load,P-Min [bar],P-Max [bar],TV,LV,SLTh0,SLVal0,SLTh1,SLVal1,SLTh2,SLVal2
bimetallic,ADP,,,0.5,10,20,10,30,5,40,10,50,20
bimetallic,ADP,ecoBolt,high,10,32,25,12,35,6,45,12,55,24
ball-float,PBS,,,0.5,32,18,9,28,4,38,8,48,16
";

    fn table() -> ThresholdTable {
        ThresholdTable::from_reader(CONF_TABLE.as_bytes()).unwrap()
    }

    fn query(trap_type: SteamTrapType, pressure_bar: f64) -> ProfileQuery<'static> {
        ProfileQuery {
            trap_type,
            mounting: MountingType::Adapter,
            hardware_model: None,
            condensate_load: None,
            pressure_bar,
        }
    }

    #[test]
    fn loads_every_row() {
        let table = table();
        assert_eq!(table.len(), 3);
        assert_eq!(table.profiles()[1].hardware_model.as_deref(), Some("ecoBolt"));
        assert_eq!(
            table.profiles()[0].thresholds.steam_loss[2],
            SteamLossLevel {
                threshold: 50,
                value: 20
            }
        );
    }

    #[test]
    fn matches_on_class_and_pressure_band() {
        let table = table();
        let profile = table.find(&query(SteamTrapType::Bimetallic, 2.9)).unwrap();
        assert_eq!(profile.thresholds.noise_tv, 20);

        assert!(table.find(&query(SteamTrapType::Membrane, 2.9)).is_none());
        assert!(table.find(&query(SteamTrapType::Bimetallic, 40.0)).is_none());
    }

    #[test]
    fn specific_cells_require_a_value() {
        let table = table();
        let mut q = query(SteamTrapType::Bimetallic, 12.0);
        assert!(table.find(&q).is_none());

        q.hardware_model = Some("ECOBOLT");
        q.condensate_load = Some("high");
        assert_eq!(table.find(&q).unwrap().thresholds.noise_tv, 25);
    }

    #[test]
    fn correction_overflow_is_detected() {
        let thresholds = table().profiles()[0].thresholds;
        let corrected = thresholds.with_steam_loss_correction(4).unwrap();
        assert_eq!(corrected.steam_loss[2].value, 80);
        assert_eq!(corrected.steam_loss[2].threshold, 50);

        assert!(thresholds.with_steam_loss_correction(13).is_none());
    }
}
