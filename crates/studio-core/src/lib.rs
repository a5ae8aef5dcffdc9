// SPDX-License-Identifier: Apache-2.0

//! Core types for the DB Studio table-data layer: catalog metadata, request
//! and result shapes, the [`DataEngine`] seam and the error taxonomy.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{EngineError, EngineResult};
pub use traits::DataEngine;
pub use types::*;
