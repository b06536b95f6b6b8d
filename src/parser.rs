//! Frame decoding
//!
//! Each line on the wire is one JSON object carrying a `samples` array of
//! numeric readings, e.g. `{"samples":[1.203,1.207,1.199]}`. Extra fields are
//! ignored so firmware can add metadata without breaking older monitors.

use std::time::Instant;

use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::types::Batch;

/// Field holding the readings.
const SAMPLES_FIELD: &str = "samples";

/// Stateless decoder from one line of text to a typed [`Batch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameParser;

impl FrameParser {
    /// Decode `line`, stamping the batch with `received_at`.
    ///
    /// Returns [`ParseError::Malformed`] for anything that is not an object with
    /// a numeric `samples` array, and [`ParseError::Empty`] when the array has
    /// no elements.
    pub fn parse(line: &str, received_at: Instant) -> Result<Batch, ParseError> {
        // Going through `Map` keeps sequences like `[[1.0]]` from decoding
        // positionally into the frame
        let frame: Map<String, Value> =
            serde_json::from_str(line).map_err(|e| ParseError::malformed(e.to_string()))?;

        let readings = match frame.get(SAMPLES_FIELD) {
            Some(Value::Array(values)) => values
                .iter()
                .enumerate()
                .map(|(i, value)| {
                    value.as_f64().ok_or_else(|| {
                        ParseError::malformed(format!("sample {i} is not a number: {value}"))
                    })
                })
                .collect::<Result<Vec<f64>, _>>()?,
            Some(other) => {
                return Err(ParseError::malformed(format!(
                    "`{SAMPLES_FIELD}` must be an array, got {other}"
                )));
            }
            None => return Err(ParseError::malformed(format!("missing `{SAMPLES_FIELD}` field"))),
        };

        Batch::new(readings, received_at).ok_or(ParseError::Empty)
    }
}
