//! Generation stage: parameter rows in, stored downlinks and a report out.

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::config::{
    DownlinkConfig, DownlinkSettingsConfig, GatewayAddress, GatewayConfig, GenerationConfig,
    LookupConfig, Scheme, TransmissionConfig,
};
use crate::delivery::{DeviceOutcome, Downlink, FlushSettings, Outcome, RunReport, Stage};
use crate::device::DeviceIdentifier;
use crate::error::{GenerationError, OutputError};
use crate::lookup::{LookupTables, SteamTable, ThresholdTable};
use crate::output::write_json;
use crate::protocol::{EncoderSettings, encode};
use crate::steamtrap::ParameterRecord;
use crate::store::DownlinkStore;
use crate::validate::validate;

/// Host placeholder for devices whose row names no server.
pub const UNASSIGNED_HOST: &str = "unassigned";

pub fn load_tables(lookup: &LookupConfig) -> Result<LookupTables, GenerationError> {
    let steam_path = lookup.steam_table_path();
    let steam = SteamTable::from_path(&steam_path).map_err(|source| GenerationError::Table {
        path: steam_path,
        source,
    })?;
    let thresholds_path = lookup.threshold_table_path();
    let thresholds =
        ThresholdTable::from_path(&thresholds_path).map_err(|source| GenerationError::Table {
            path: thresholds_path,
            source,
        })?;
    info!(
        breakpoints = steam.breakpoints().len(),
        profiles = thresholds.len(),
        "loaded lookup tables"
    );

    Ok(LookupTables::new(steam, thresholds))
}

#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub tables: LookupTables,

    pub encoder: EncoderSettings,

    pub confirmed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Generation {
    pub report: RunReport,

    /// Generated devices grouped by the `server` column, in input order.
    pub servers: IndexMap<Option<String>, Vec<DeviceIdentifier>>,
}

/// Validates and encodes every record into `store`.
///
/// A bad row is reported and skipped; it never stops the others.
pub fn generate(
    records: impl IntoIterator<Item = ParameterRecord>,
    ctx: &GenerationContext,
    store: &DownlinkStore,
) -> Generation {
    let mut generation = Generation::default();

    for record in records {
        let key = report_key(&record);
        let validated = match validate(&record, &ctx.tables) {
            Ok(validated) => validated,
            Err(err) => {
                warn!(row = record.row, %err, "record rejected");
                generation
                    .report
                    .record(key, DeviceOutcome::failed(Stage::Validation, 0, err));
                continue;
            }
        };

        let deveui = validated.deveui();
        let payload = encode(&validated, &ctx.encoder);
        debug!(%deveui, fragments = payload.len(), "encoded downlink");

        if let Err(err) = store.insert(Downlink::new(deveui, payload, ctx.confirmed)) {
            warn!(row = record.row, %err, "downlink not stored");
            generation
                .report
                .record(key, DeviceOutcome::failed(Stage::Encoding, 0, err));
            continue;
        }

        generation.report.record(
            key,
            DeviceOutcome {
                stage: Stage::Done,
                outcome: Outcome::Generated,
                attempts: 0,
                reason: None,
            },
        );
        let server = record
            .server
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);
        // A replaced device belongs only to the server of its latest row.
        for devices in generation.servers.values_mut() {
            devices.retain(|id| *id != deveui);
        }
        generation.servers.retain(|_, devices| !devices.is_empty());
        generation.servers.entry(server).or_default().push(deveui);
    }

    info!(summary = %generation.report.summary(), "generation finished");
    generation
}

fn report_key(record: &ParameterRecord) -> String {
    record
        .deveui
        .as_deref()
        .and_then(|raw| raw.parse::<DeviceIdentifier>().ok())
        .map(|id| id.to_string())
        .unwrap_or_else(|| format!("row {}", record.row))
}

/// Parses a `server` cell: `host`, `host:port`, optionally with a scheme.
///
/// Without a scheme the gateway is reached over HTTPS.
pub fn parse_server(server: &str) -> GatewayAddress {
    let server = server.trim().trim_end_matches('/');
    let (scheme, rest) = match server.split_once("://") {
        Some((s, rest)) if s.eq_ignore_ascii_case("http") => (Scheme::Http, rest),
        Some((_, rest)) => (Scheme::Https, rest),
        None => (Scheme::Https, server),
    };

    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host, Some(port)),
            Err(_) => (rest, None),
        },
        None => (rest, None),
    };

    GatewayAddress {
        host: host.to_owned(),
        port,
        scheme,
    }
}

/// A transmission configuration listing each server's generated downlinks.
///
/// Credentials are left for the operator to fill in.
pub fn transmission_skeleton(
    generation: &Generation,
    store: &DownlinkStore,
    downlinks: &DownlinkConfig,
) -> TransmissionConfig {
    let hex = store.to_hex_map();
    let gateways = generation
        .servers
        .iter()
        .map(|(server, devices)| GatewayConfig {
            address: server
                .as_deref()
                .map(parse_server)
                .unwrap_or_else(|| parse_server(UNASSIGNED_HOST)),
            credentials: Default::default(),
            backup: Default::default(),
            downlink_settings: DownlinkSettingsConfig {
                fport: downlinks.fport,
                confirmed: downlinks.confirmed,
                flush_queue: FlushSettings {
                    pre_process: downlinks.flush_queue,
                    post_process: false,
                },
            },
            downlinks: devices
                .iter()
                .filter_map(|id| hex.get(id).map(|h| (*id, h.clone())))
                .collect(),
            downlinks_file: None,
        })
        .collect();

    TransmissionConfig {
        client: Default::default(),
        delivery: Default::default(),
        backup_dir: None,
        logging: Default::default(),
        gateways,
    }
}

/// Loads tables, generates, and writes the downlinks file (and skeleton if configured).
pub fn run_generation(
    config: &GenerationConfig,
    records: impl IntoIterator<Item = ParameterRecord>,
) -> Result<(DownlinkStore, Generation), GenerationError> {
    let tables = load_tables(&config.lookup)?;
    let ctx = GenerationContext {
        tables,
        encoder: config.downlinks.encoder_settings()?,
        confirmed: config.downlinks.confirmed,
    };

    let store = DownlinkStore::new(config.duplicate_policy);
    let generation = generate(records, &ctx, &store);

    write_outputs(config, &store, &generation)?;

    Ok((store, generation))
}

fn write_outputs(
    config: &GenerationConfig,
    store: &DownlinkStore,
    generation: &Generation,
) -> Result<(), OutputError> {
    let output = &config.output;
    write_json(&output.filepath, &store.to_hex_map(), output.indent)?;
    info!(path = %output.filepath.display(), devices = store.len(), "wrote generated downlinks");

    if let Some(path) = &output.transmission_config {
        let skeleton = transmission_skeleton(generation, store, &config.downlinks);
        write_json(path, &skeleton, output.indent)?;
        info!(path = %path.display(), gateways = skeleton.gateways.len(), "wrote transmission skeleton");
    }

    Ok(())
}
