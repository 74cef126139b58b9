use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum_server::Handle;
use tokio::signal;
use tracing::info;

use crate::{
    asset_store::{
        delivery::{DeliveryClient, HttpDeliveryClient},
        http::HttpAssetStore,
        memory::InMemoryAssetStore,
        AssetStore,
        AssetStoreBackend,
    },
    config::ServerConfig,
    folders::FolderTreeFetcher,
    organizer::AssetOrganizer,
    proxy::ProxyCache,
    registry::{sync::synchronizer_from_config, Registry},
    routes::{create_routes, RouteState},
    transform::DeliveryUrlBuilder,
};

#[derive(Clone)]
pub struct Service {
    pub config: Arc<ServerConfig>,
    pub route_state: RouteState,
}

impl Service {
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let config = Arc::new(config);
        let asset_store: Arc<dyn AssetStore> = match config.asset_store.backend {
            AssetStoreBackend::Http => Arc::new(
                HttpAssetStore::new(&config.asset_store)
                    .context("error initializing asset store client")?,
            ),
            AssetStoreBackend::Memory => Arc::new(InMemoryAssetStore::new()),
        };
        let delivery: Arc<dyn DeliveryClient> = Arc::new(
            HttpDeliveryClient::new(config.asset_store.request_timeout_secs)
                .context("error initializing delivery client")?,
        );
        Self::with_clients(config, asset_store, delivery).await
    }

    pub async fn with_clients(
        config: Arc<ServerConfig>,
        asset_store: Arc<dyn AssetStore>,
        delivery: Arc<dyn DeliveryClient>,
    ) -> Result<Self> {
        let registry = Arc::new(
            Registry::load(synchronizer_from_config(&config.registry))
                .await
                .with_context(|| {
                    format!(
                        "error loading media registry from {}",
                        config.registry.path.display()
                    )
                })?,
        );
        let urls = DeliveryUrlBuilder::new(
            &config.asset_store.delivery_base_url,
            &config.asset_store.cloud_name,
        );
        let route_state = RouteState {
            registry: registry.clone(),
            urls: urls.clone(),
            asset_store: asset_store.clone(),
            folders: Arc::new(FolderTreeFetcher::new(asset_store.clone())),
            organizer: Arc::new(AssetOrganizer::new(asset_store)),
            proxy: Arc::new(ProxyCache::new(registry, urls, delivery)),
            config: config.clone(),
        };
        Ok(Self {
            config,
            route_state,
        })
    }

    pub async fn start(&self) -> Result<()> {
        let handle = Handle::new();
        let handle_sh = handle.clone();
        tokio::spawn(async move {
            shutdown_signal(handle_sh).await;
            info!("graceful shutdown signal received, shutting down server gracefully");
        });

        let addr: SocketAddr = self.config.listen_addr.parse()?;
        info!("server api listening on {}", self.config.listen_addr);
        let routes = create_routes(self.route_state.clone());
        axum_server::bind(addr)
            .handle(handle)
            .serve(routes.into_make_service())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {:?}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to install signal handler: {:?}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
        },
        _ = terminate => {
        },
    }
    handle.shutdown();
    info!("signal received, shutting down server gracefully");
}
