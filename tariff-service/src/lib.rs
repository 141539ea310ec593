pub mod cache;
pub mod clock;
pub mod config;
pub mod decision;
pub mod delivery;
pub mod enrich;
pub mod error;
pub mod jobs;
pub mod metrics_server;
pub mod notify;
pub mod observability;
pub mod pipeline;
pub mod reconcile;
pub mod response;
pub mod retry;
pub mod sinks;
pub mod sources;
pub mod transform;
pub mod upstream;

pub use jobs::JobContext;
pub use pipeline::{Envelope, Pipeline};
pub use response::Response;
