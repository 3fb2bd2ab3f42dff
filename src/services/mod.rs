pub mod estimates;
pub mod progress;
pub mod reconcile;
pub mod transit;

pub use transit::{QueryError, TransitService};
