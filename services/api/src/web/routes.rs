//! services/api/src/web/routes.rs
//!
//! The application's route table. The guard middleware resolves every request
//! path against it before the axum router sees the request.

use smoker_core::domain::{Role, RouteMeta, ADMIN_DASHBOARD_PATH, LOGIN_PATH, USER_DASHBOARD_PATH};
use smoker_core::routes::{RouteRecord, RouteTable};

/// Children shared by both dashboards, guarded for `role`.
fn sensor_routes(role: Role) -> Vec<RouteRecord> {
    vec![
        RouteRecord::new("sensors/latest", RouteMeta::inherit(role)),
        RouteRecord::new("sensors/:sensor_id", RouteMeta::inherit(role)),
        RouteRecord::new("sensors/:sensor_id/history", RouteMeta::inherit(role)),
    ]
}

pub fn app_routes() -> RouteTable {
    let mut admin_children = vec![
        RouteRecord::new("sessions", RouteMeta::inherit(Role::Admin)),
        RouteRecord::new("sessions/active", RouteMeta::inherit(Role::Admin)),
        RouteRecord::new("sessions/history", RouteMeta::inherit(Role::Admin)),
        RouteRecord::new("sessions/:session_id", RouteMeta::inherit(Role::Admin)),
        RouteRecord::new("sessions/:session_id/end", RouteMeta::inherit(Role::Admin)),
    ];
    admin_children.extend(sensor_routes(Role::Admin));

    let mut user_children = vec![RouteRecord::new("session", RouteMeta::inherit(Role::User))];
    user_children.extend(sensor_routes(Role::User));

    RouteTable::new(vec![
        RouteRecord::redirect("/", LOGIN_PATH),
        RouteRecord::new(LOGIN_PATH, RouteMeta::public()),
        RouteRecord::new("/logout", RouteMeta::public()),
        // Admin registration
        RouteRecord::new("/register", RouteMeta::public()),
        // User registration
        RouteRecord::new("/user-register", RouteMeta::public()),
        RouteRecord::new("/api-docs/openapi.json", RouteMeta::public()),
        RouteRecord::new("/swagger-ui", RouteMeta::public())
            .with_children(vec![RouteRecord::new("*", RouteMeta::public())]),
        RouteRecord::new(ADMIN_DASHBOARD_PATH, RouteMeta::protected(Role::Admin))
            .with_children(admin_children),
        RouteRecord::new(USER_DASHBOARD_PATH, RouteMeta::protected(Role::User))
            .with_children(user_children),
        RouteRecord::redirect("*", LOGIN_PATH),
    ])
}
