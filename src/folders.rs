use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::{info, warn};

use crate::{
    asset_store::{AssetStore, AssetStoreError, RemoteFolder},
    data_model::FolderNode,
};

/// Walks the remote folder hierarchy one listing call at a time.
pub struct FolderTreeFetcher {
    store: Arc<dyn AssetStore>,
}

impl FolderTreeFetcher {
    pub fn new(store: Arc<dyn AssetStore>) -> Self {
        Self { store }
    }

    /// Only the root listing can fail the whole call. A node whose children
    /// cannot be listed keeps empty `subfolders` and records the error.
    pub async fn fetch_tree(&self) -> Result<Vec<FolderNode>, AssetStoreError> {
        let roots = self.store.root_folders().await?;
        let mut tree = Vec::with_capacity(roots.len());
        for root in roots {
            tree.push(self.fetch_node(root).await);
        }
        let partial = tree.iter().filter(|node| node.is_partial()).count();
        info!(roots = tree.len(), partial, "fetched folder tree");
        Ok(tree)
    }

    fn fetch_node(&self, folder: RemoteFolder) -> BoxFuture<'_, FolderNode> {
        async move {
            let path = if folder.path.is_empty() {
                folder.name.clone()
            } else {
                folder.path.clone()
            };
            let mut node = FolderNode::new(&folder.name, &path);
            match self.store.subfolders(&path).await {
                Ok(children) => {
                    for child in children {
                        let child = if child.path.is_empty() {
                            RemoteFolder {
                                path: format!("{}/{}", path, child.name),
                                ..child
                            }
                        } else {
                            child
                        };
                        node.subfolders.push(self.fetch_node(child).await);
                    }
                }
                Err(err) => {
                    warn!(path = %path, error = %err, "unable to list subfolders");
                    node.error = Some(err.to_string());
                }
            }
            node
        }
        .boxed()
    }
}
