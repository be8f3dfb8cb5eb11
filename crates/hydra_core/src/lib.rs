pub mod api;
pub mod dataset;
pub mod error;
pub mod hash;
pub mod hierarchy;
pub mod time;
pub mod value;

pub use api::*;
pub use dataset::*;
pub use error::{HydraError, HydraResult};
pub use hash::{ContentHash, canonical_decimal, content_hash};
pub use hierarchy::*;
pub use time::*;
pub use value::*;
