pub(crate) mod cadence;
pub mod daemon;
pub(crate) mod jobs;

pub use jobs::BatchRunner;
