pub mod db;
pub mod identity;
pub mod telemetry;

pub use db::DbAdapter;
pub use identity::SessionIdentity;
pub use telemetry::HttpTelemetryAdapter;
