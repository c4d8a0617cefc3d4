//! Module implement the delimited-text file storage backend.
//!
//! One record per line, no header row, comma-delimited by default.
//! Each record is the canonical token row of a point. Timestamps are
//! ISO-8601 without offset and re-interpreted as UTC on read.
//!
//! Appends go to the end of the file and are flushed, fsynced and
//! truncated to the cursor per batch. Whole-file writes truncate then
//! rewrite. An exclusive advisory lock is held on the storage file for
//! the lifetime of the handle, there is no separate lockfile.

use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use fs2::FileExt;
use log::debug;

use std::{
    ffi, fs,
    io::{Seek, SeekFrom},
    path, vec,
};

use crate::{
    point::Point,
    storage::{AccessMode, Config, Storage},
    Error, Result,
};

/// Record shape of the file backend, one row of string tokens.
pub type Row = Vec<String>;

/// Delimited-text file storage.
pub struct CsvStorage {
    loc: ffi::OsString,
    fd: Option<fs::File>,
    mode: AccessMode,
    delimiter: u8,
    flush_on_insert: bool,
    index_intact: bool,
    latest_time: Option<DateTime<Utc>>,
}

impl CsvStorage {
    /// Open, and create if necessary, the storage file described by
    /// `config`. Opening never reads data, so a non-empty file starts
    /// with the sort tracker in the unknown state.
    pub fn open(config: &Config) -> Result<CsvStorage> {
        let mode = config.access_mode;
        let loc = path::Path::new(&config.path);

        if mode != AccessMode::Read && config.create_dirs {
            match loc.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => {
                    err_at!(IOError, fs::create_dir_all(parent), "create {:?}", parent)?
                }
                Some(_) => (),
                None => err_at!(InvalidFile, msg: "{:?}", loc)?,
            }
        }

        let mut opts = fs::OpenOptions::new();
        match mode {
            AccessMode::Read => opts.read(true),
            AccessMode::ReadWrite => opts.read(true).write(true).create(true),
            AccessMode::Write => opts.write(true).create(true).truncate(true),
            AccessMode::WriteRead => opts.read(true).write(true).create(true).truncate(true),
            AccessMode::Append => opts.append(true).create(true),
            AccessMode::AppendRead => opts.read(true).append(true).create(true),
        };
        let fd = err_at!(IOError, opts.open(loc), "open {:?}", loc)?;
        err_at!(IOError, fd.try_lock_exclusive(), "lock {:?}", loc)?;

        let size = err_at!(IOError, fd.metadata())?.len();
        debug!(target: "tsdb", "opened {:?} mode:{} size:{}", loc, mode.as_str(), size);

        let val = CsvStorage {
            loc: config.path.clone(),
            fd: Some(fd),
            mode,
            delimiter: config.delimiter,
            flush_on_insert: config.flush_on_insert,
            index_intact: size == 0,
            latest_time: None,
        };

        Ok(val)
    }

    fn as_fd(&mut self) -> Result<&mut fs::File> {
        match &mut self.fd {
            Some(fd) => Ok(fd),
            None => err_at!(Closed, msg: "storage handle closed {:?}", self.loc),
        }
    }

    fn track(&mut self, time: DateTime<Utc>) {
        if self.index_intact {
            match self.latest_time {
                Some(latest) if time < latest => {
                    self.index_intact = false;
                    self.latest_time = None;
                }
                _ => self.latest_time = Some(time),
            }
        }
    }
}

impl Storage for CsvStorage {
    type Item = Row;

    fn append(&mut self, points: &[Point]) -> Result<()> {
        self.can_append()?;

        for point in points {
            self.track(point.time);
        }

        let (delimiter, flush) = (self.delimiter, self.flush_on_insert);
        let loc = self.loc.clone();
        let fd = self.as_fd()?;
        err_at!(IOError, fd.seek(SeekFrom::End(0)))?;
        {
            let mut wtr = WriterBuilder::new()
                .delimiter(delimiter)
                .flexible(true)
                .from_writer(&mut *fd);
            for point in points {
                err_at!(IOError, wtr.write_record(&point.to_row()))?;
            }
            err_at!(IOError, wtr.flush())?;
        }
        if flush {
            err_at!(IOError, fd.sync_all(), "sync {:?}", loc)?;
        }
        // drop anything behind the cursor.
        let fpos = err_at!(IOError, fd.seek(SeekFrom::Current(0)))?;
        err_at!(IOError, fd.set_len(fpos))?;

        Ok(())
    }

    fn iter(&mut self) -> Result<vec::IntoIter<Row>> {
        self.can_read()?;

        let delimiter = self.delimiter;
        let fd = self.as_fd()?;
        err_at!(IOError, fd.seek(SeekFrom::Start(0)))?;

        let mut rdr = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(&mut *fd);

        let mut items = vec![];
        for record in rdr.records() {
            let record = err_at!(DecodeFail, record)?;
            items.push(record.iter().map(|token| token.to_string()).collect());
        }

        Ok(items.into_iter())
    }

    fn read(&mut self) -> Result<Vec<Point>> {
        let mut points = vec![];
        for row in self.iter()? {
            points.push(Point::from_row(&row)?);
        }
        Ok(points)
    }

    fn write(&mut self, items: Vec<Row>, is_sorted: bool) -> Result<()> {
        self.can_write()?;

        let latest = match items.last() {
            Some(row) => Some(Point::row_timestamp(row)?),
            None => None,
        };

        let delimiter = self.delimiter;
        let loc = self.loc.clone();
        let fd = self.as_fd()?;
        err_at!(IOError, fd.seek(SeekFrom::Start(0)))?;
        err_at!(IOError, fd.set_len(0))?;
        {
            let mut wtr = WriterBuilder::new()
                .delimiter(delimiter)
                .flexible(true)
                .from_writer(&mut *fd);
            for row in items.iter() {
                err_at!(IOError, wtr.write_record(row))?;
            }
            err_at!(IOError, wtr.flush())?;
        }
        err_at!(IOError, fd.sync_all(), "sync {:?}", loc)?;
        let fpos = err_at!(IOError, fd.seek(SeekFrom::Current(0)))?;
        err_at!(IOError, fd.set_len(fpos))?;

        if is_sorted {
            self.index_intact = true;
            self.latest_time = latest;
        } else {
            self.index_intact = false;
            self.latest_time = None;
        }

        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.write(vec![], true)
    }

    fn len(&mut self) -> Result<usize> {
        Ok(self.iter()?.len())
    }

    fn is_sorted(&mut self) -> Result<bool> {
        let mut latest: Option<DateTime<Utc>> = None;
        for row in self.iter()? {
            let time = Point::row_timestamp(&row)?;
            match latest {
                Some(l) if time < l => {
                    self.index_intact = false;
                    self.latest_time = None;
                    return Ok(false);
                }
                _ => latest = Some(time),
            }
        }
        self.index_intact = true;
        self.latest_time = latest;
        Ok(true)
    }

    fn index_intact(&self) -> bool {
        self.index_intact
    }

    fn latest_time(&self) -> Option<DateTime<Utc>> {
        self.latest_time
    }

    fn serialize_point(&self, point: &Point) -> Row {
        point.to_row()
    }

    fn item_to_point(&self, item: &Row) -> Result<Point> {
        Point::from_row(item)
    }

    fn item_measurement(&self, item: &Row) -> Result<String> {
        Point::row_measurement(item)
    }

    fn item_timestamp(&self, item: &Row) -> Result<DateTime<Utc>> {
        Point::row_timestamp(item)
    }

    fn can_read(&self) -> Result<()> {
        if self.mode.is_readable() {
            Ok(())
        } else {
            err_at!(InvalidMode, msg: "cannot read, access mode is {:?}", self.mode.as_str())
        }
    }

    fn can_append(&self) -> Result<()> {
        if self.mode.is_appendable() {
            Ok(())
        } else {
            err_at!(InvalidMode, msg: "cannot append, access mode is {:?}", self.mode.as_str())
        }
    }

    fn can_write(&self) -> Result<()> {
        if self.mode.is_writable() {
            Ok(())
        } else {
            err_at!(InvalidMode, msg: "cannot write, access mode is {:?}", self.mode.as_str())
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(fd) = self.fd.take() {
            fd.unlock().ok();
            debug!(target: "tsdb", "closed {:?}", self.loc);
        }
        Ok(())
    }
}

impl Drop for CsvStorage {
    fn drop(&mut self) {
        self.close().ok();
    }
}

#[cfg(test)]
#[path = "csv_test.rs"]
mod csv_test;
