mod adapter;
mod client;
mod error;
mod model;
mod search;
mod store;
mod utils;
mod var_source;
mod versions;

use log::trace;

pub use adapter::{
    ApiEndpoint, DatasetSource, EndpointMode, HttpAdapter, ManifestSource, ShipsSource,
    TeamsSource, VersionSource,
};
pub use client::FleetClient;
pub use error::Error;
pub use model::*;
pub use search::{SearchCoordinator, SearchRequest, SearchResponse};
pub use store::{DataStore, StoreState};
pub use var_source::{default_var_source, load_var_source, new_var_source, VarSource};
pub use versions::{RegistryState, VersionRegistry};

/// Log if `Result` is an error
pub(crate) trait Logged {
    fn log(self) -> Self;
}

impl<T, E> Logged for std::result::Result<T, E>
where
    E: std::fmt::Debug,
{
    fn log(self) -> Self {
        if let Err(e) = &self {
            trace!("---TraceError--- {:#?}", e)
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use dotenv;
    use std::sync::Once;

    static INIT_ENV_LOGGER: Once = Once::new();

    pub fn init_logger() {
        dotenv::dotenv().ok();
        INIT_ENV_LOGGER.call_once(|| env_logger::init());
    }
}
