//! SensorThings payloads and the flattened records derived from them.

use crate::coordinates::CoordinateTree;
use crate::error::{Result, StaError};
use serde::Deserialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

/// The `{"value": [...]}` envelope every SensorThings collection is wrapped in.
#[derive(Debug, Deserialize)]
pub struct Collection<T> {
    pub value: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thing {
    #[serde(rename = "@iot.id")]
    pub id: Option<Value>,
    #[serde(rename = "Datastreams@iot.navigationLink")]
    pub datastreams_link: Option<String>,
    pub description: Option<String>,
}

impl Thing {
    /// The `@iot.id` as text, whether the service sends it as a number or a string.
    pub fn id_text(&self) -> Option<String> {
        match self.id.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Datastream {
    #[serde(rename = "Observations@iot.navigationLink")]
    pub observations_link: Option<String>,
    #[serde(rename = "observedArea")]
    pub observed_area: Option<ObservedArea>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservedArea {
    pub coordinates: Option<CoordinateTree>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Observation {
    #[serde(rename = "resultTime")]
    pub result_time: Option<String>,
    #[serde(rename = "phenomenonTime")]
    pub phenomenon_time: Option<String>,
    #[serde(default)]
    pub result: Value,
}

/// A station reduced to the fields the job needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub thing_id: String,
    pub datastream_url: String,
    pub description: String,
}

impl TryFrom<Thing> for Station {
    type Error = StaError;

    fn try_from(thing: Thing) -> Result<Self> {
        let thing_id = thing.id_text().ok_or_else(|| StaError::MissingField {
            thing: "<unknown>".to_string(),
            field: "@iot.id",
        })?;
        let missing = |field| StaError::MissingField {
            thing: thing_id.clone(),
            field,
        };
        let datastream_url = thing
            .datastreams_link
            .ok_or_else(|| missing("Datastreams@iot.navigationLink"))?;
        let description = thing.description.ok_or_else(|| missing("description"))?;
        Ok(Self {
            thing_id,
            datastream_url,
            description,
        })
    }
}

/// A station joined with its first datastream.
#[derive(Debug, Clone, PartialEq)]
pub struct StationStream {
    pub thing_id: String,
    pub description: String,
    pub observations_url: String,
    /// `None` when the observed area holds no plausible coordinate pair.
    pub coordinates: Option<(f64, f64)>,
}

impl StationStream {
    /// Only the first datastream is considered; any others are ignored.
    pub fn resolve(station: &Station, datastreams: Vec<Datastream>) -> Result<Self> {
        let missing = |field| StaError::MissingField {
            thing: station.thing_id.clone(),
            field,
        };
        let first = datastreams
            .into_iter()
            .next()
            .ok_or_else(|| StaError::NoDatastream(station.thing_id.clone()))?;
        let observations_url = first
            .observations_link
            .ok_or_else(|| missing("Observations@iot.navigationLink"))?;
        let tree = first
            .observed_area
            .and_then(|area| area.coordinates)
            .ok_or_else(|| missing("observedArea.coordinates"))?;

        Ok(Self {
            thing_id: station.thing_id.clone(),
            description: station.description.clone(),
            observations_url,
            coordinates: tree.find_pair(),
        })
    }
}

/// One numeric reading with its UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub time: OffsetDateTime,
    pub value: f64,
}

impl Observation {
    /// Converts to a [`Reading`]. `Ok(None)` means the observation carries no usable time
    /// or a non-numeric result; a malformed timestamp is an error.
    pub fn reading(&self) -> Result<Option<Reading>> {
        // phenomenonTime may be an interval "start/end"; its start is used
        let Some(raw) = self
            .result_time
            .as_deref()
            .or_else(|| self.phenomenon_time.as_deref()?.split('/').next())
        else {
            return Ok(None);
        };
        let time = OffsetDateTime::parse(raw, &Rfc3339)
            .map_err(|source| StaError::Timestamp {
                value: raw.to_string(),
                source,
            })?
            .to_offset(UtcOffset::UTC);

        let value = match &self.result {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        Ok(value.map(|value| Reading { time, value }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const THINGS: &str = r#"{
        "value": [
            {
                "@iot.id": 5321,
                "description": "StadtRad-Station Jungfernstieg",
                "Datastreams@iot.navigationLink": "https://iot.example/v1.1/Things(5321)/Datastreams"
            },
            {
                "@iot.id": "abc",
                "Datastreams@iot.navigationLink": "https://iot.example/v1.1/Things(abc)/Datastreams"
            }
        ]
    }"#;

    const DATASTREAMS: &str = r#"{
        "value": [
            {
                "Observations@iot.navigationLink": "https://iot.example/v1.1/Datastreams(11)/Observations",
                "observedArea": {"type": "Polygon", "coordinates": [[[53.55, 9.99], [53.56, 10.0]]]}
            },
            {
                "Observations@iot.navigationLink": "https://iot.example/v1.1/Datastreams(12)/Observations",
                "observedArea": {"type": "Point", "coordinates": [1.0, 1.0]}
            }
        ]
    }"#;

    fn station() -> Station {
        Station {
            thing_id: "5321".into(),
            datastream_url: "https://iot.example/v1.1/Things(5321)/Datastreams".into(),
            description: "StadtRad-Station Jungfernstieg".into(),
        }
    }

    #[test]
    fn numeric_thing_becomes_station() {
        let things: Collection<Thing> = serde_json::from_str(THINGS).unwrap();
        let station = Station::try_from(things.value[0].clone()).unwrap();
        assert_eq!(station, self::station());
    }

    #[test]
    fn thing_without_description_is_rejected() {
        let things: Collection<Thing> = serde_json::from_str(THINGS).unwrap();
        match Station::try_from(things.value[1].clone()) {
            Err(StaError::MissingField { thing, field }) => {
                assert_eq!(thing, "abc");
                assert_eq!(field, "description");
            }
            other => panic!("expected missing field, got {other:?}"),
        }
    }

    #[test]
    fn first_datastream_is_used() {
        let streams: Collection<Datastream> = serde_json::from_str(DATASTREAMS).unwrap();
        let resolved = StationStream::resolve(&station(), streams.value).unwrap();
        assert_eq!(
            resolved.observations_url,
            "https://iot.example/v1.1/Datastreams(11)/Observations"
        );
        assert_eq!(resolved.coordinates, Some((53.55, 9.99)));
    }

    #[test]
    fn implausible_coordinates_degrade_to_none() {
        let json = r#"[{
            "Observations@iot.navigationLink": "https://iot.example/obs",
            "observedArea": {"coordinates": [[-9.99, -53.55]]}
        }]"#;
        let streams: Vec<Datastream> = serde_json::from_str(json).unwrap();
        let resolved = StationStream::resolve(&station(), streams).unwrap();
        assert_eq!(resolved.coordinates, None);
    }

    #[test]
    fn missing_datastream_fields_are_errors() {
        assert!(matches!(
            StationStream::resolve(&station(), Vec::new()),
            Err(StaError::NoDatastream(_))
        ));

        let json = r#"[{"Observations@iot.navigationLink": "https://iot.example/obs"}]"#;
        let streams: Vec<Datastream> = serde_json::from_str(json).unwrap();
        assert!(matches!(
            StationStream::resolve(&station(), streams),
            Err(StaError::MissingField {
                field: "observedArea.coordinates",
                ..
            })
        ));
    }

    #[test]
    fn observation_results_accept_numbers_and_numeric_strings() {
        let json = r#"[
            {"resultTime": "2022-05-01T10:15:00.000Z", "result": 4},
            {"resultTime": "2022-05-01T12:15:00+02:00", "result": "6.5"},
            {"resultTime": "2022-05-01T10:20:00Z", "result": "offline"},
            {"resultTime": null, "phenomenonTime": "2022-05-01T11:00:00Z/2022-05-01T11:05:00Z", "result": 2}
        ]"#;
        let observations: Vec<Observation> = serde_json::from_str(json).unwrap();
        let readings: Vec<Option<Reading>> =
            observations.iter().map(|o| o.reading().unwrap()).collect();

        assert_eq!(
            readings[0],
            Some(Reading {
                time: datetime!(2022-05-01 10:15 UTC),
                value: 4.0
            })
        );
        assert_eq!(
            readings[1],
            Some(Reading {
                time: datetime!(2022-05-01 10:15 UTC),
                value: 6.5
            })
        );
        assert_eq!(readings[2], None);
        assert_eq!(
            readings[3],
            Some(Reading {
                time: datetime!(2022-05-01 11:00 UTC),
                value: 2.0
            })
        );
    }

    #[test]
    fn malformed_timestamp_is_an_error() {
        let observation = Observation {
            result_time: Some("yesterday".into()),
            phenomenon_time: None,
            result: Value::from(3),
        };
        assert!(matches!(
            observation.reading(),
            Err(StaError::Timestamp { .. })
        ));
    }
}
