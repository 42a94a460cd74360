//! Result manifest decoding (`xcresulttool get build-results` output).
//!
//! The tool happily runs against a bundle Xcode is still writing. In that
//! window it prints nothing, a truncated document, or a document without a
//! `destination`. Those cases are `ContentNotReady`. A document that is
//! complete but shaped differently is `ContentMalformed`.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ExtractionError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationInfo {
    pub device_name: String,
    pub os_version: String,
    pub platform: String,
}

pub fn parse_build_results(bytes: &[u8]) -> Result<DestinationInfo, ExtractionError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ExtractionError::ContentNotReady("empty output".to_string()));
    }

    let document: Value = serde_json::from_slice(bytes).map_err(|err| {
        if err.is_eof() {
            ExtractionError::ContentNotReady(format!("truncated output: {err}"))
        } else {
            ExtractionError::ContentMalformed(err.to_string())
        }
    })?;

    let Some(object) = document.as_object() else {
        return Err(ExtractionError::ContentMalformed(
            "top-level value is not an object".to_string(),
        ));
    };

    let destination = match object.get("destination") {
        None | Some(Value::Null) => {
            return Err(ExtractionError::ContentNotReady(
                "destination not written yet".to_string(),
            ))
        }
        Some(value) => value,
    };

    DestinationInfo::deserialize(destination)
        .map_err(|err| ExtractionError::ContentMalformed(format!("destination: {err}")))
}
