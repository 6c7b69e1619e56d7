pub mod alerts;
pub mod analysis;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod feed;
pub mod geo;
pub mod llm;
pub mod model;
pub mod records;
pub mod registry;
pub mod route;
pub mod rules;
pub mod scanner;
pub mod selector;
pub mod tools;

pub use error::{DispatchError, ReasoningError, StoreError};
