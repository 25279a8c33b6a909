#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/cardiff/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod dom;
mod extract;
mod rules;

pub mod error;
pub mod row;
pub mod value;

pub use error::{ExtractError, Result};
pub use extract::document_to_rows;
pub use row::{Row, SCHEMA};
pub use value::Value;

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
