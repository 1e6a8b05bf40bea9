//! Floating-car-data traces.
//!
//! The trace is SUMO's FCD export with geographic coordinates: an
//! `<fcd-export>` root holding `<timestep time="…">` elements, each with
//! zero or more `<vehicle id="…" x="…" y="…" speed="…"/>` children.
//! The whole file is parsed up front; the runner then consumes frames one
//! per tick.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use bevy_ecs::prelude::Resource;
use thiserror::Error;
use xml::reader::{EventReader, XmlEvent};

#[derive(Debug, Error)]
pub enum FcdError {
    #[error("cannot read FCD trace: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed FCD XML: {0}")]
    Xml(#[from] xml::reader::Error),
    #[error("<{element}> is missing the {attribute:?} attribute")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error("bad {attribute:?} value {value:?} on <{element}>")]
    InvalidNumber {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },
    #[error("timestep t={next} does not advance past t={prev}")]
    NonMonotonicTime { prev: f64, next: f64 },
}

/// One vehicle sample inside a frame. `xgeo`/`ygeo` are WGS84
/// longitude/latitude degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FcdVehicle {
    pub id: u16,
    pub xgeo: f64,
    pub ygeo: f64,
    pub speed: f64,
}

/// One FCD timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct FcdFrame {
    pub time: f64,
    pub vehicles: Vec<FcdVehicle>,
}

/// The full parsed trace plus a consumption cursor.
#[derive(Debug, Resource)]
pub struct FcdTrace {
    frames: Vec<FcdFrame>,
    cursor: usize,
}

impl FcdTrace {
    pub fn new(frames: Vec<FcdFrame>) -> Self {
        Self { frames, cursor: 0 }
    }

    /// Timestamp of the next unconsumed frame, if any.
    pub fn peek_time(&self) -> Option<f64> {
        self.frames.get(self.cursor).map(|f| f.time)
    }

    pub fn next_frame(&mut self) -> Option<FcdFrame> {
        let frame = self.frames.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(frame)
    }

    pub fn remaining(&self) -> usize {
        self.frames.len() - self.cursor
    }
}

/// The frame currently being processed by the tick schedule.
#[derive(Debug, Clone, Resource)]
pub struct CurrentFrame(pub FcdFrame);

fn attr(
    attributes: &[xml::attribute::OwnedAttribute],
    element: &'static str,
    name: &'static str,
) -> Result<String, FcdError> {
    attributes
        .iter()
        .find(|a| a.name.local_name == name)
        .map(|a| a.value.clone())
        .ok_or(FcdError::MissingAttribute {
            element,
            attribute: name,
        })
}

fn parse_f64(element: &'static str, attribute: &'static str, value: String) -> Result<f64, FcdError> {
    value.parse().map_err(|_| FcdError::InvalidNumber {
        element,
        attribute,
        value,
    })
}

fn parse_u16(element: &'static str, attribute: &'static str, value: String) -> Result<u16, FcdError> {
    value.parse().map_err(|_| FcdError::InvalidNumber {
        element,
        attribute,
        value,
    })
}

/// Parse a complete FCD document, enforcing strictly increasing timesteps.
pub fn parse_fcd<R: Read>(reader: R) -> Result<Vec<FcdFrame>, FcdError> {
    let mut frames: Vec<FcdFrame> = Vec::new();
    let mut current: Option<FcdFrame> = None;

    for event in EventReader::new(reader) {
        match event? {
            XmlEvent::StartElement {
                name, attributes, ..
            } => match name.local_name.as_str() {
                "timestep" => {
                    let time = parse_f64("timestep", "time", attr(&attributes, "timestep", "time")?)?;
                    if let Some(prev) = frames.last().map(|f| f.time) {
                        if time <= prev {
                            return Err(FcdError::NonMonotonicTime { prev, next: time });
                        }
                    }
                    current = Some(FcdFrame {
                        time,
                        vehicles: Vec::new(),
                    });
                }
                "vehicle" => {
                    // Vehicles outside a timestep (or foreign elements such
                    // as <person>) are not part of the trace contract.
                    if let Some(frame) = current.as_mut() {
                        frame.vehicles.push(FcdVehicle {
                            id: parse_u16("vehicle", "id", attr(&attributes, "vehicle", "id")?)?,
                            xgeo: parse_f64("vehicle", "x", attr(&attributes, "vehicle", "x")?)?,
                            ygeo: parse_f64("vehicle", "y", attr(&attributes, "vehicle", "y")?)?,
                            speed: parse_f64(
                                "vehicle",
                                "speed",
                                attr(&attributes, "vehicle", "speed")?,
                            )?,
                        });
                    }
                }
                _ => {}
            },
            XmlEvent::EndElement { name } => {
                if name.local_name == "timestep" {
                    if let Some(frame) = current.take() {
                        frames.push(frame);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(frames)
}

/// Parse an FCD trace from disk.
pub fn load_fcd_file<P: AsRef<Path>>(path: P) -> Result<Vec<FcdFrame>, FcdError> {
    let file = File::open(path)?;
    parse_fcd(BufReader::new(file))
}
