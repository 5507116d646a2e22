//! JSON artifacts written by the binaries.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::error::OutputError;

/// Serializes `value` with `indent` spaces per level; 0 writes compact JSON.
/// Either way the output ends with a newline.
pub fn to_json<T: Serialize + ?Sized>(value: &T, indent: usize) -> Result<Vec<u8>, OutputError> {
    let mut out = if indent == 0 {
        serde_json::to_vec(value)?
    } else {
        let indent = b" ".repeat(indent);
        let mut out = Vec::new();
        let mut serializer =
            Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(&indent));
        value.serialize(&mut serializer)?;
        out
    };
    out.push(b'\n');

    Ok(out)
}

pub fn write_json<T: Serialize + ?Sized>(
    path: impl AsRef<Path>,
    value: &T,
    indent: usize,
) -> Result<(), OutputError> {
    let path = path.as_ref();
    let json = to_json(value, indent)?;
    let io_err = |source| OutputError::Io {
        path: path.to_owned(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
    writer.write_all(&json).map_err(io_err)?;
    writer.flush().map_err(io_err)?;

    Ok(())
}
