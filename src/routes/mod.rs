pub mod categories;
pub(crate) mod health_check;
pub mod preferences;
pub mod videos;

pub use categories::*;
pub use health_check::*;
pub use preferences::*;
pub use videos::*;
