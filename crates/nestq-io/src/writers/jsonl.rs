//! NDJSON writer: one result record per line, fields in record order.

use std::fs::File;
use std::io::{BufWriter, Write};

use nestq_core::types::Record;

use crate::error::Result;

pub struct JsonlWriter<W: Write> {
    writer: BufWriter<W>,
    rows: u64,
}

impl JsonlWriter<File> {
    pub fn to_path(path: &str) -> Result<Self> {
        let f = File::create(path)?;
        Ok(Self::to_writer(f))
    }
}

impl<W: Write> JsonlWriter<W> {
    pub fn to_writer(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            rows: 0,
        }
    }

    pub fn write_records(&mut self, records: &[Record]) -> Result<()> {
        for rec in records {
            serde_json::to_writer(&mut self.writer, rec)?;
            self.writer.write_all(b"\n")?;
            self.rows += 1;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| crate::error::Error::Io(e.into_error()))
    }
}
