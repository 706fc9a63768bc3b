//! Loading of normalized location datasets from disk.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{DatasetError, DatasetResult};
use crate::model::{DeviceDescriptor, LocationDataset};

/// Read a dataset file and parse it as JSON
///
/// This is the only step of a filter or device request that touches the
/// filesystem. The file is never modified. The read is async; parsing runs
/// on the blocking pool since documents can be hundreds of megabytes.
///
/// # Arguments
/// * `path` - Path of the normalized dataset document
///
/// # Returns
/// * `DatasetResult<Value>` - The raw JSON document
///
/// # Errors
/// * `DataUnavailable` if the file cannot be read
/// * `MalformedData` if the content is not JSON
pub async fn read_document(path: impl AsRef<Path>) -> DatasetResult<Value> {
    parse_blocking(path.as_ref(), |text| parse_document(&text)).await
}

fn parse_document(text: &str) -> DatasetResult<Value> {
    serde_json::from_str(text).map_err(DatasetError::MalformedData)
}

/// Read `path` asynchronously, then hand its text to `parse` on the blocking pool
async fn parse_blocking<T, F>(path: &Path, parse: F) -> DatasetResult<T>
where
    T: Send + 'static,
    F: FnOnce(String) -> DatasetResult<T> + Send + 'static,
{
    let unavailable = |source: std::io::Error| DatasetError::DataUnavailable {
        path: path.to_path_buf(),
        source,
    };

    let text = tokio::fs::read_to_string(path).await.map_err(unavailable)?;
    tokio::task::spawn_blocking(move || parse(text))
        .await
        .map_err(|e| unavailable(std::io::Error::other(e)))?
}

/// Validate a raw document and convert it into a typed dataset
///
/// # Errors
/// * `InvalidSchema` if the document is not an object, has no `locations`
///   array, or holds records or devices of the wrong shape
pub fn dataset_from_document(document: Value) -> DatasetResult<LocationDataset> {
    match document.get("locations") {
        Some(Value::Array(_)) => {}
        Some(_) => {
            return Err(DatasetError::InvalidSchema(
                "`locations` is not an array".to_string(),
            ));
        }
        None => {
            return Err(DatasetError::InvalidSchema(
                "document has no `locations` array".to_string(),
            ));
        }
    }

    serde_json::from_value(document).map_err(|e| DatasetError::InvalidSchema(e.to_string()))
}

/// Extract the device catalog from a raw document
///
/// A missing or null `devices` entry yields an empty list. `locations` is not
/// required here.
pub fn devices_from_document(document: &Value) -> DatasetResult<Vec<DeviceDescriptor>> {
    if !document.is_object() {
        return Err(DatasetError::InvalidSchema(
            "document is not a JSON object".to_string(),
        ));
    }

    match document.get("devices") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(devices @ Value::Array(_)) => Vec::<DeviceDescriptor>::deserialize(devices)
            .map_err(|e| DatasetError::InvalidSchema(format!("invalid `devices`: {e}"))),
        Some(_) => Err(DatasetError::InvalidSchema(
            "`devices` is not an array".to_string(),
        )),
    }
}

/// Read and validate a dataset in one step
pub async fn load_dataset(path: impl AsRef<Path>) -> DatasetResult<LocationDataset> {
    parse_blocking(path.as_ref(), |text| {
        dataset_from_document(parse_document(&text)?)
    })
    .await
}

/// Read a document and return its device catalog
pub async fn list_devices(path: impl AsRef<Path>) -> DatasetResult<Vec<DeviceDescriptor>> {
    parse_blocking(path.as_ref(), |text| {
        devices_from_document(&parse_document(&text)?)
    })
    .await
}
