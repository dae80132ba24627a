//! Data models shared by the core library and the package layer.
//!
//! These types are serialized into `settings.json` and handed to frontends,
//! so field names are kept stable with `camelCase` renames.

mod github;
mod package;
mod progress;

pub use github::*;
pub use package::*;
pub use progress::*;
