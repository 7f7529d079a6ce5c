use crate::api::routes;
use crate::config::SharedConfig;
use crate::dns::ZoneServer;
use std::future::Future;

#[derive(Clone)]
pub(super) struct AppState {
    pub config: SharedConfig,
    pub zone_server: ZoneServer,
}

pub fn new(
    config: SharedConfig,
    zone_server: ZoneServer,
) -> impl Future<Output = hyper::Result<()>> {
    axum::Server::bind(&config.api_bind_addr)
        .serve(routes::new(AppState { config, zone_server }).into_make_service())
}
