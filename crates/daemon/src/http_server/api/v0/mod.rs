use axum::Router;

pub mod sync;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .nest("/sync", sync::router(state.clone()))
        .with_state(state)
}
