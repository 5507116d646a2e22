use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};

use anyhow::{Context as _, Result, bail};
use bolt_downlinks::sheet::{Columns, cell, normalize_header};
use bolt_downlinks::steamtrap::ParameterRecord;
use csv::{Reader, ReaderBuilder, StringRecord};
use tracing::debug;

const DEVEUI: &[&str] = &["deveui", "dev-eui"];
const STT: &[&str] = &["stt", "steam-trap-type"];
const DMT: &[&str] = &["dmt", "mounting-type", "device-mounting-type"];
const SST: &[&str] = &["sst", "saturated-steam-temperature"];
const DN: &[&str] = &["dn", "nominal-diameter"];
const DP: &[&str] = &["dp", "differential-pressure"];
const HARDWARE_MODEL: &[&str] = &["hardware-model"];
const CONDENSATE_LOAD: &[&str] = &["condensate-load"];
const SERVER: &[&str] = &["server"];

#[derive(Debug, Clone, Copy)]
struct ParameterColumns {
    deveui: usize,
    stt: usize,
    dmt: Option<usize>,
    sst: Option<usize>,
    dn: Option<usize>,
    dp: Option<usize>,
    hardware_model: Option<usize>,
    condensate_load: Option<usize>,
    server: Option<usize>,
}

impl ParameterColumns {
    fn detect(headers: &StringRecord) -> Result<Self> {
        let columns = Columns::from_headers(headers);

        let known: HashSet<&str> = [DEVEUI, STT, DMT, SST, DN, DP, HARDWARE_MODEL, CONDENSATE_LOAD, SERVER]
            .concat()
            .into_iter()
            .collect();
        for header in headers.iter() {
            let normalized = normalize_header(header);
            if !known.contains(normalized.as_str()) {
                debug!(column = header, "ignoring unknown column");
            }
        }

        let Some(deveui) = columns.find(DEVEUI) else {
            bail!("parameter sheet has no deveui column");
        };
        let Some(stt) = columns.find(STT) else {
            bail!("parameter sheet has no stt column");
        };

        Ok(Self {
            deveui,
            stt,
            dmt: columns.find(DMT),
            sst: columns.find(SST),
            dn: columns.find(DN),
            dp: columns.find(DP),
            hardware_model: columns.find(HARDWARE_MODEL),
            condensate_load: columns.find(CONDENSATE_LOAD),
            server: columns.find(SERVER),
        })
    }
}

/// Parameter rows of a CSV sheet, numbered by their line in the file.
#[derive(Debug)]
pub struct CsvParameterIter {
    reader: Reader<BufReader<File>>,
    columns: ParameterColumns,
    first_line: usize,
    index: usize,
}

impl CsvParameterIter {
    pub fn new(file: File, skip_rows: usize) -> Result<Self> {
        let mut buf_reader = BufReader::new(file);
        let mut line = String::new();
        for i in 0..skip_rows {
            line.clear();
            let read = buf_reader
                .read_line(&mut line)
                .with_context(|| format!("failed to skip line {}", i + 1))?;
            if read == 0 {
                bail!("file ends before the {skip_rows} rows to skip");
            }
        }

        let mut reader = ReaderBuilder::new().flexible(true).from_reader(buf_reader);
        let headers = reader.headers().context("failed to read CSV header")?.clone();
        let columns = ParameterColumns::detect(&headers)?;

        Ok(Self {
            reader,
            columns,
            first_line: skip_rows + 2,
            index: 0,
        })
    }
}

impl Iterator for CsvParameterIter {
    type Item = Result<ParameterRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match self.reader.records().next()? {
            Ok(row) => row,
            Err(e) => return Some(Err(e).context("failed to read CSV record")),
        };
        let line = self.first_line + self.index;
        self.index += 1;

        let c = self.columns;
        let text = |index: Option<usize>| cell(&row, index).map(str::to_owned);

        Some(Ok(ParameterRecord {
            row: line,
            deveui: text(Some(c.deveui)),
            stt: text(Some(c.stt)),
            dmt: text(c.dmt),
            sst: text(c.sst),
            dn: text(c.dn),
            dp: text(c.dp),
            hardware_model: text(c.hardware_model),
            condensate_load: text(c.condensate_load),
            server: text(c.server),
        }))
    }
}
