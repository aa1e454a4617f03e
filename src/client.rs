use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join3;
use indexmap::IndexMap;
use log::debug;
use serde_json::Value;

use crate::utils::parse_duration;
use crate::{
    load_var_source, new_var_source, ApiEndpoint, DataStore, DatasetSource, EndpointMode, Error,
    HttpAdapter, Manifest, ManifestSource, SearchCoordinator, ShipMap, ShipsSource, TeamMap,
    TeamsSource, VarSource, VersionRegistry, VersionSource,
};

const DEFAULT_API_TIMEOUT: &str = "30s";
const DEFAULT_SEARCH_TIMEOUT: &str = "10s";

/// Entry point of the data layer: the version registry, one store per
/// dataset kind, and the search coordinator, constructed once at startup
/// and shared by reference.
#[derive(Clone)]
pub struct FleetClient {
    pub(crate) inner: Arc<FleetClientImpl>,
}

pub struct FleetClientImpl {
    registry: VersionRegistry,
    ships: DataStore<ShipMap>,
    teams: DataStore<TeamMap>,
    manifest: DataStore<Manifest>,
    search: SearchCoordinator,
}

impl FleetClient {
    pub async fn load<T>(conf_file: T) -> Result<Self, Error>
    where
        T: AsRef<Path>,
    {
        Self::from_var_source(load_var_source(conf_file)).await
    }

    pub async fn from_str(content: &str) -> Result<Self, Error> {
        Self::from_var_source(new_var_source(content)).await
    }

    async fn from_var_source(
        var_source: Arc<dyn VarSource + Send + Sync>,
    ) -> Result<Self, Error> {
        let endpoint = var_source
            .get_environment_variable(&["api", "endpoint"])
            .await?;
        let mode: EndpointMode = var_source
            .get_environment_variable(&["api", "mode"])
            .await
            .unwrap_or_else(|_| "api".to_string())
            .parse()?;
        let api_timeout = parse_duration(
            &var_source
                .get_environment_variable(&["api", "timeout"])
                .await
                .unwrap_or_else(|_| DEFAULT_API_TIMEOUT.to_string()),
        )?;
        let search_timeout = parse_duration(
            &var_source
                .get_environment_variable(&["search", "timeout"])
                .await
                .unwrap_or_else(|_| DEFAULT_SEARCH_TIMEOUT.to_string()),
        )?;
        let api = Arc::new(HttpAdapter::new(ApiEndpoint::new(&endpoint, mode)));
        Self::with_sources(
            api.clone(),
            Arc::new(ShipsSource::new(api.clone())),
            Arc::new(TeamsSource::new(api.clone())),
            Arc::new(ManifestSource::new(api)),
            api_timeout,
            search_timeout,
        )
    }

    /// Wires the data layer over explicit collaborators, e.g. a non-HTTP
    /// backend or mocks in tests.
    pub fn with_sources(
        versions: Arc<dyn VersionSource>,
        ships: Arc<dyn DatasetSource<ShipMap>>,
        teams: Arc<dyn DatasetSource<TeamMap>>,
        manifest: Arc<dyn DatasetSource<Manifest>>,
        api_timeout: Duration,
        search_timeout: Duration,
    ) -> Result<Self, Error> {
        Ok(Self {
            inner: Arc::new(FleetClientImpl {
                registry: VersionRegistry::new(versions, api_timeout),
                ships: DataStore::new("ships", ships, api_timeout),
                teams: DataStore::new("teams", teams, api_timeout),
                manifest: DataStore::new("manifest", manifest, api_timeout),
                search: SearchCoordinator::spawn(search_timeout)?,
            }),
        })
    }

    pub fn registry(&self) -> &VersionRegistry {
        &self.inner.registry
    }

    pub fn ships(&self) -> &DataStore<ShipMap> {
        &self.inner.ships
    }

    pub fn teams(&self) -> &DataStore<TeamMap> {
        &self.inner.teams
    }

    pub fn manifest(&self) -> &DataStore<Manifest> {
        &self.inner.manifest
    }

    /// Loads the version list if needed, then all three datasets for the
    /// effective latest version. Load failures stay observable on the
    /// individual stores.
    pub async fn refresh(&self) {
        self.inner.registry.load().await;
        let latest = self.inner.registry.latest();
        debug!("Refreshing datasets for version `{}`", latest);
        join3(
            self.inner.ships.load(&latest),
            self.inner.teams.load(&latest),
            self.inner.manifest.load(&latest),
        )
        .await;
    }

    /// Spawns a task that reloads all stores whenever the effective latest
    /// version changes (initial load, external selection). The task ends
    /// when the client is dropped.
    pub fn follow_latest(&self) -> tokio::task::JoinHandle<()> {
        let inner = self.inner.clone();
        let mut rx = inner.registry.subscribe();
        tokio::spawn(async move {
            let mut current = inner.registry.latest();
            while rx.changed().await.is_ok() {
                let latest = inner.registry.latest();
                if latest == current {
                    continue;
                }
                debug!("Latest version changed to `{}`", latest);
                current = latest.clone();
                join3(
                    inner.ships.load(&latest),
                    inner.teams.load(&latest),
                    inner.manifest.load(&latest),
                )
                .await;
            }
        })
    }

    /// Runs a full-text query over the current working ship dataset on the
    /// search worker. An absent working copy searches as an empty dataset.
    pub async fn search_ships(&self, query: &str) -> Result<IndexMap<String, Value>, Error> {
        let ships = self.inner.ships.working().unwrap_or_default();
        self.inner.search.search(&ships, query).await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use crate::{ShipConfig, TeamConfig};

    use super::*;

    struct FakeBackend;

    #[async_trait]
    impl VersionSource for FakeBackend {
        async fn fetch_versions(&self) -> Result<Vec<String>, Error> {
            Ok(vec!["v1".to_string(), "v2".to_string()])
        }
    }

    fn ship(version: &str, name: &str) -> ShipConfig {
        let mut ship = ShipConfig::default();
        ship.boat_info.name = format!("{}-{}", name, version);
        ship
    }

    #[async_trait]
    impl DatasetSource<ShipMap> for FakeBackend {
        async fn fetch(&self, version: &str) -> Result<ShipMap, Error> {
            let mut map = ShipMap::new();
            map.insert("windchaser".to_string(), ship(version, "Windchaser"));
            map.insert("mistral".to_string(), ship(version, "Mistral"));
            Ok(map)
        }
    }

    #[async_trait]
    impl DatasetSource<TeamMap> for FakeBackend {
        async fn fetch(&self, version: &str) -> Result<TeamMap, Error> {
            let mut map = TeamMap::new();
            map.insert(
                "northwind".to_string(),
                TeamConfig {
                    name: format!("Northwind {}", version),
                    members: vec![],
                },
            );
            Ok(map)
        }
    }

    #[async_trait]
    impl DatasetSource<Manifest> for FakeBackend {
        async fn fetch(&self, version: &str) -> Result<Manifest, Error> {
            Ok(Manifest {
                engine_version: version.to_string(),
                timestamp: 1700000000,
            })
        }
    }

    fn client() -> FleetClient {
        let backend = Arc::new(FakeBackend);
        FleetClient::with_sources(
            backend.clone(),
            backend.clone(),
            backend.clone(),
            backend,
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn refresh_loads_latest_version_everywhere() {
        crate::tests::init_logger();
        let client = client();
        client.refresh().await;
        // Fetch order reversed: v2 is latest.
        assert_eq!(client.registry().latest(), "v2");
        assert_eq!(
            client.ships().working().unwrap()["windchaser"].boat_info.name,
            "Windchaser-v2"
        );
        assert_eq!(
            client.teams().working().unwrap()["northwind"].name,
            "Northwind v2"
        );
        assert_eq!(client.manifest().working().unwrap().engine_version, "v2");
    }

    #[tokio::test]
    async fn follow_latest_reloads_on_selection() {
        let client = client();
        let follower = client.follow_latest();
        client.refresh().await;
        client.registry().select("v1");

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if client
                .manifest()
                .working()
                .map(|m| m.engine_version == "v1")
                .unwrap_or(false)
            {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "stores never caught up with the selected version"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            client.ships().working().unwrap()["mistral"].boat_info.name,
            "Mistral-v1"
        );
        follower.abort();
    }

    #[tokio::test]
    async fn search_runs_over_working_ships() {
        let client = client();
        client.refresh().await;
        let matches = client.search_ships("mistral").await.unwrap();
        let keys: Vec<&str> = matches.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["mistral"]);

        // Search covers local edits, not just canonical data.
        let mut edited = client.ships().working().unwrap();
        edited.insert("zephyr".to_string(), ship("v2", "Zephyr"));
        client.ships().replace(edited);
        let matches = client.search_ships("zephyr").await.unwrap();
        assert_eq!(matches.len(), 1);

        // Searching with no data loaded matches nothing.
        let empty = FleetClient::with_sources(
            Arc::new(FakeBackend),
            Arc::new(FakeBackend),
            Arc::new(FakeBackend),
            Arc::new(FakeBackend),
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(empty.search_ships("").await.unwrap().is_empty());
    }
}
