//! Rule-driven file organizing with sandboxed destinations and reversible history.

pub mod error;
pub mod filesystem;
pub mod history;
pub mod logging;
pub mod model;
pub mod organizer;
pub mod prediction;
pub mod rules;
pub mod store;

pub use error::{Error, Result};
pub use organizer::Organizer;
