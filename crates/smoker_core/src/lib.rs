pub mod domain;
pub mod guard;
pub mod ports;
pub mod role_cache;
pub mod routes;
pub mod sensors;
pub mod sessions;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use domain::{
    AuthUser, Credentials, LatestSensorData, NewSensorReading, NewSession, ReadingPoint, Role,
    RouteMeta, SensorConfig, SensorDescriptor, SensorHistory, SensorReading, SensorType,
    SessionDraft, SessionStatus, SessionUpdate, SmokingSession, UserCredentials,
    ADMIN_DASHBOARD_PATH, LOGIN_PATH, USER_DASHBOARD_PATH,
};
pub use guard::{GuardFailurePolicy, NavigationDecision, RouteGuard};
pub use ports::{
    AccountStore, DocumentStore, IdentityProvider, PortError, PortResult, TelemetryPayload, TelemetrySource,
};
pub use role_cache::{watch_auth_state, RoleCache};
pub use routes::{MatchedRoute, Resolution, RouteRecord, RouteTable};
pub use sensors::{ReadingObserver, SensorManager, DEFAULT_POLL_INTERVAL};
pub use sessions::SessionRecorder;
