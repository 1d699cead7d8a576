//! # FASTQ Output
//!
//! Formats decoded reads as `@id\nseq\n+\nqstring\n`. Paths ending in
//! `.gz` are compressed on the fly.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::data::read::DecodedRead;
use crate::error::Result;

pub struct FastqWriter {
    writer: Box<dyn Write + Send>,
}

impl FastqWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        let writer: Box<dyn Write + Send> =
            if path.extension().is_some_and(|e| e == "gz") {
                Box::new(BufWriter::new(GzEncoder::new(file, Compression::default())))
            } else {
                Box::new(BufWriter::new(file))
            };
        Ok(Self { writer })
    }

    pub fn write_record(&mut self, read: &DecodedRead) -> Result<()> {
        debug_assert_eq!(read.sequence.len(), read.qstring.len());
        writeln!(self.writer, "@{}", read.read_id)?;
        writeln!(self.writer, "{}", read.sequence)?;
        writeln!(self.writer, "+")?;
        writeln!(self.writer, "{}", read.qstring)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
