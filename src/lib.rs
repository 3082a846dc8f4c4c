#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod ir;
pub mod layout;
pub mod layout_dump;
pub mod session;
pub mod snapshot;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, LayoutConfig, load_config};
pub use layout::{Layout, LayoutEngine, LayoutError, compute_layout, compute_layout_blocking};
pub use session::{Commit, LayoutSession};
