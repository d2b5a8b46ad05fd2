pub mod codec;
pub mod directory;
mod error;
pub mod io_helper;

pub use error::{Error, Result};
pub use codec::DocId;
