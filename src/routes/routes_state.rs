use std::sync::Arc;

use crate::{
    asset_store::AssetStore,
    config::ServerConfig,
    folders::FolderTreeFetcher,
    organizer::AssetOrganizer,
    proxy::ProxyCache,
    registry::Registry,
    transform::DeliveryUrlBuilder,
};

#[derive(Clone)]
pub struct RouteState {
    pub registry: Arc<Registry>,
    pub urls: DeliveryUrlBuilder,
    pub asset_store: Arc<dyn AssetStore>,
    pub folders: Arc<FolderTreeFetcher>,
    pub organizer: Arc<AssetOrganizer>,
    pub proxy: Arc<ProxyCache>,
    pub config: Arc<ServerConfig>,
}
