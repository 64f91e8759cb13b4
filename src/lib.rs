pub mod coordinates;
pub mod error;
pub mod export;
pub mod model;
pub mod paginate;
pub mod resample;

use crate::error::{Result, StaError};
use crate::export::{Exporter, StationBatch};
use crate::model::{Collection, Datastream, Observation, Station, StationStream, Thing};
use crate::paginate::{collect_pages, PageWindow};
use crate::resample::{is_unobserved, resample_hourly, HourlyWindow};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use time::Date;
use time::macros::date;
use tracing::{debug, error, info, warn};

/// Bike-share stations owned by DB Connect in the Hamburg urban data platform.
pub const DEFAULT_THINGS_URL: &str = "https://iot.hamburg.de/v1.1/Things?$skip=0&$top=5000&$filter=((properties%2FownerThing+eq+%27DB+Connect%27))";

/// Tunables for a run. `Default` reproduces the 2022 season export.
#[derive(Debug, Clone)]
pub struct Settings {
    pub things_url: String,
    pub start_date: Date,
    pub end_date: Date,
    pub pages: PageWindow,
    /// Station jobs in flight at once.
    pub workers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            things_url: DEFAULT_THINGS_URL.to_string(),
            start_date: date!(2022-05-01),
            end_date: date!(2022-09-30),
            pages: PageWindow::default(),
            workers: 4,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub succeeded: usize,
    /// Thing id and error message of every station whose job failed.
    pub failed: Vec<(String, String)>,
}

impl RunSummary {
    /// Stations finished so far, successful or not.
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed.len()
    }
}

/// Extracts hourly station series from a SensorThings service into CSV.
///
/// Holds the shared HTTP client and output directory; each station is processed
/// independently and the results funnel into a single [`Exporter`].
pub struct StaHourly {
    client: reqwest::Client,
    out_dir: PathBuf,
    settings: Settings,
}

impl StaHourly {
    /// Create a new instance and ensure the output directory exists.
    pub fn new(out_dir: impl Into<PathBuf>, settings: Settings) -> Result<Self> {
        if settings.start_date > settings.end_date {
            return Err(StaError::InvalidWindow {
                start: settings.start_date,
                end: settings.end_date,
            });
        }
        let out_dir = out_dir.into();
        ensure_out_dir(&out_dir)?;
        let client = reqwest::Client::builder()
            .user_agent("sta-hourly/0.1")
            .build()
            .map_err(|e| StaError::NetworkRequest("client setup".to_string(), e))?;
        Ok(Self {
            client,
            out_dir,
            settings,
        })
    }

    pub fn window(&self) -> HourlyWindow {
        HourlyWindow::new(self.settings.start_date, self.settings.end_date)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| StaError::NetworkRequest(url.to_string(), e))?;
        let resp = match resp.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                return Err(match e.status() {
                    Some(status) => StaError::HttpStatus {
                        url: url.to_string(),
                        status,
                        source: e,
                    },
                    None => StaError::NetworkRequest(url.to_string(), e),
                });
            }
        };
        let body = resp
            .text()
            .await
            .map_err(|e| StaError::NetworkRequest(url.to_string(), e))?;
        serde_json::from_str(&body).map_err(|source| StaError::JsonDecode {
            url: url.to_string(),
            source,
        })
    }

    /// Fetch every station listed at the configured things URL, in upstream order.
    pub async fn discover_stations(&self) -> Result<Vec<Thing>> {
        let url = &self.settings.things_url;
        info!(%url, "discovering stations");
        let things: Collection<Thing> = self.get_json(url, &[]).await?;
        info!(stations = things.value.len(), "stations discovered");
        Ok(things.value)
    }

    /// Look up the station's datastreams and keep the first one.
    pub async fn resolve_stream(&self, station: &Station) -> Result<StationStream> {
        debug!(station = %station.thing_id, url = %station.datastream_url, "resolving datastream");
        let streams: Collection<Datastream> = self.get_json(&station.datastream_url, &[]).await?;
        let stream = StationStream::resolve(station, streams.value)?;
        if stream.coordinates.is_none() {
            warn!(station = %stream.thing_id, "no plausible coordinate pair in observed area");
        }
        Ok(stream)
    }

    /// Page through all observations whose phenomenon time falls inside the configured dates.
    pub async fn fetch_observations(&self, stream: &StationStream) -> Result<Vec<Observation>> {
        let url = stream.observations_url.as_str();
        let filter = format!(
            "date(phenomenontime) ge date({}) and date(phenomenontime) le date({})",
            self.settings.start_date, self.settings.end_date
        );
        let pages = self.settings.pages;
        collect_pages(url, pages, |offset| {
            let query = [
                ("$top", pages.page_size.to_string()),
                ("$skip", offset.to_string()),
                ("$filter", filter.clone()),
            ];
            async move {
                let page: Collection<Observation> = self.get_json(url, &query).await?;
                Ok(page.value)
            }
        })
        .await
    }

    /// Run the full pipeline for one station and return its output rows.
    pub async fn process_station(&self, thing: Thing) -> Result<StationBatch> {
        let station = Station::try_from(thing)?;
        let stream = self.resolve_stream(&station).await?;
        let observations = self.fetch_observations(&stream).await?;
        build_batch(stream, &observations, &self.window())
    }

    /// Discover stations, recreate the output files, then process stations concurrently.
    ///
    /// Discovery and output failures abort the run; a failing station is only recorded in
    /// the returned summary.
    pub async fn run(&self) -> Result<RunSummary> {
        let things = self.discover_stations().await?;
        let mut exporter = Exporter::create(&self.out_dir)?;
        let mut summary = RunSummary::default();
        let total = things.len();

        let mut jobs = futures_util::stream::iter(things)
            .map(|thing| async move {
                let label = thing.id_text().unwrap_or_else(|| "<unknown>".to_string());
                (label, self.process_station(thing).await)
            })
            .buffer_unordered(self.settings.workers.max(1));

        while let Some((station, outcome)) = jobs.next().await {
            match outcome {
                Ok(batch) => {
                    exporter.append(&batch)?;
                    summary.succeeded += 1;
                }
                Err(e) => {
                    error!(%station, error = %e, "failed to process station");
                    summary.failed.push((station, e.to_string()));
                }
            }
            info!(done = summary.completed(), total, failed = summary.failed.len(), "progress");
        }
        Ok(summary)
    }
}

/// Turn a station's raw observations into its output rows.
///
/// Logs a warning when the resolved series holds no value at all, whether the station
/// reported nothing or only readings outside the window.
pub fn build_batch(
    stream: StationStream,
    observations: &[Observation],
    window: &HourlyWindow,
) -> Result<StationBatch> {
    let mut readings = Vec::with_capacity(observations.len());
    for observation in observations {
        match observation.reading()? {
            Some(reading) => readings.push(reading),
            None => debug!(station = %stream.thing_id, result = %observation.result, "skipping unusable observation"),
        }
    }
    info!(station = %stream.thing_id, observations = readings.len(), "resampling");
    let hourly = resample_hourly(readings, window);
    if is_unobserved(&hourly) {
        warn!(station = %stream.thing_id, "no observations in window");
    }
    Ok(StationBatch { stream, hourly })
}

fn ensure_out_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| StaError::OutputIo(dir.to_path_buf(), e))?;
    }
    Ok(())
}
