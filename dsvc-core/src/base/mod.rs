//! Pipelines over a `Repo`: save, history, removal and listing.

pub mod list;
pub mod log;
pub mod name;
pub mod remove;
pub mod save;

pub use list::list;
pub use log::{dataset_log, walk_history};
pub use name::{generate_available_name, infer_name};
pub use remove::{remove, RemoveResult, Revisions};
pub use save::{save, SaveSwitches, SavedDataset};
