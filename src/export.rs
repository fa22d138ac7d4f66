use anyhow::{Context, Result};
use csv::WriterBuilder;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const EXTENSION: &str = "csv";

/// Appends `.csv` unless the name already carries it.
pub fn csv_path(name: &str) -> PathBuf {
    let path = PathBuf::from(name.trim());
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case(EXTENSION) => path,
        _ => PathBuf::from(format!("{}.{EXTENSION}", name.trim())),
    }
}

/// Writes rows without a header; rows may differ in length.
pub fn write_rows<W, I>(writer: W, rows: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = Vec<String>>,
{
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(writer);
    for row in rows {
        wtr.write_record(&row).context("writing csv record")?;
    }
    wtr.flush().context("flushing csv output")?;
    Ok(())
}

pub fn write_csv_file<I>(name: &str, rows: I) -> Result<PathBuf>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let path = csv_path(name);
    create_parent(&path)?;
    let file = File::create(&path).with_context(|| format!("creating {:?}", path))?;
    write_rows(file, rows).with_context(|| format!("writing {:?}", path))?;
    Ok(path)
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {:?}", parent)),
        _ => Ok(()),
    }
}
