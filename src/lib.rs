/*!
# Location Heatmap Server

Backend of a small location-history visualization tool, built in Rust.

## Overview

Users upload a location-history export and the matching settings file. Once
an external parser has normalized the export into a `{ locations, devices }`
JSON document, the front end asks this server for the records of a date range,
optionally restricted to a set of devices, and renders them on a map as pins,
circles or a heatmap.

## Architecture

### HTTP Layer (`app`)
- **Technologies**: Rust, axum, tower-http
- `POST /upload` - Stores the records and settings files under unique names
- `POST /filter-data` - Filters a dataset by date range and devices
- `GET /devices` - Lists the devices of a dataset
- `GET /health` - Liveness check

### Core
- **filter**: Date/device predicate and order-preserving decimation to a point budget
- **dataset**: Async read-and-validate of dataset documents
- **model**: Record, device and dataset types (serde)

### Storage
- **upload**: UUID-named upload directory with a periodic retention sweep

## Design Highlights

- The filter is a pure function: same dataset and request, same output
- Records with unusable timestamps are excluded rather than rejected
- Decimation never reorders and never grows the result
- All settings come from `config::ServerConfig`, including the point budget
*/

#[cfg(feature = "web")]
pub mod app;
pub mod config;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod model;
pub mod upload;

/// Re-export the commonly used types
pub use error::{DatasetError, UploadError};
pub use filter::{Decimation, FilterOutcome, FilterRequest, MAX_POINTS};
pub use model::{Coordinates, DeviceDescriptor, DeviceTag, LocationDataset, LocationRecord};
