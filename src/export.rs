//! CSV output. One [`Exporter`] owns both files for the whole run; station jobs hand it
//! finished [`StationBatch`]es instead of writing themselves.

use crate::error::{Result, StaError};
use crate::model::StationStream;
use crate::resample::HourlyValue;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use tracing::{debug, info};

pub const EVENT_FILE: &str = "event.csv";
pub const META_FILE: &str = "meta_data.csv";
const META_NULL: &str = "NA";

/// Everything one station contributes to the output.
#[derive(Debug, Clone)]
pub struct StationBatch {
    pub stream: StationStream,
    pub hourly: Vec<HourlyValue>,
}

/// `stationID,resultTime,resultAverage`, one row per hour.
pub fn event_frame(thing_id: &str, hourly: &[HourlyValue]) -> Result<DataFrame> {
    let ids = vec![thing_id.to_string(); hourly.len()];
    let times = hourly
        .iter()
        .map(|row| {
            row.hour
                .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]+00:00"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let values: Vec<Option<f64>> = hourly.iter().map(|row| row.value).collect();

    let df = DataFrame::new(vec![
        Series::new("stationID".into(), ids),
        Series::new("resultTime".into(), times),
        Series::new("resultAverage".into(), values),
    ])?;
    Ok(df)
}

/// `thingID,description,coordinatesX,coordinatesY` for the given streams.
pub fn meta_frame(streams: &[&StationStream]) -> Result<DataFrame> {
    let ids: Vec<String> = streams.iter().map(|s| s.thing_id.clone()).collect();
    let descriptions: Vec<String> = streams.iter().map(|s| s.description.clone()).collect();
    let xs: Vec<Option<f64>> = streams.iter().map(|s| s.coordinates.map(|c| c.0)).collect();
    let ys: Vec<Option<f64>> = streams.iter().map(|s| s.coordinates.map(|c| c.1)).collect();

    let df = DataFrame::new(vec![
        Series::new("thingID".into(), ids),
        Series::new("description".into(), descriptions),
        Series::new("coordinatesX".into(), xs),
        Series::new("coordinatesY".into(), ys),
    ])?;
    Ok(df)
}

struct OutputFile {
    path: PathBuf,
    file: File,
    null_value: &'static str,
}

impl OutputFile {
    /// Truncates `path` and writes the header row of `schema`.
    fn create(path: PathBuf, mut schema: DataFrame, null_value: &'static str) -> Result<Self> {
        let file = File::create(&path).map_err(|e| StaError::OutputIo(path.clone(), e))?;
        let mut out = Self {
            path,
            file,
            null_value,
        };
        out.write(&mut schema, true)?;
        Ok(out)
    }

    fn write(&mut self, df: &mut DataFrame, header: bool) -> Result<()> {
        CsvWriter::new(&mut self.file)
            .include_header(header)
            .with_null_value(self.null_value.to_string())
            .finish(df)
            .map_err(|e| StaError::OutputFrame(self.path.clone(), e))
    }
}

pub struct Exporter {
    event: OutputFile,
    meta: OutputFile,
}

impl Exporter {
    /// Recreates both output files in `out_dir`, discarding anything a previous run left.
    pub fn create(out_dir: &Path) -> Result<Self> {
        let event = OutputFile::create(out_dir.join(EVENT_FILE), event_frame("", &[])?, "")?;
        let meta = OutputFile::create(out_dir.join(META_FILE), meta_frame(&[])?, META_NULL)?;
        info!(
            events = %event.path.display(),
            meta = %meta.path.display(),
            "output files created"
        );
        Ok(Self { event, meta })
    }

    pub fn append(&mut self, batch: &StationBatch) -> Result<()> {
        let mut events = event_frame(&batch.stream.thing_id, &batch.hourly)?;
        let mut meta = meta_frame(&[&batch.stream])?;
        debug!(station = %batch.stream.thing_id, rows = events.height(), "appending batch");
        self.event.write(&mut events, false)?;
        self.meta.write(&mut meta, false)?;
        Ok(())
    }
}
