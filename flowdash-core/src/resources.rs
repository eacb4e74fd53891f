//! List endpoints of the backend, exposed as [`ListSource`]s.

use crate::error::DashboardError;
use crate::http_client::ApiClient;
use crate::list_controller::{ListSource, PagedListController};
use crate::models::{AssetFile, ModelPerformance, UploadKind, Workflow, WorkflowRun};
use crate::pagination::{PageRequest, RawListResponse};
use log::warn;
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Workflows,
    Runs,
    Leaderboard,
    Files(UploadKind),
}

impl ResourceKind {
    pub fn list_path(&self) -> String {
        match self {
            ResourceKind::Workflows => "/api/workflow/".to_string(),
            ResourceKind::Runs => "/api/workflow/run".to_string(),
            ResourceKind::Leaderboard => "/api/modelperformance/".to_string(),
            ResourceKind::Files(kind) => format!("/files/list/{}", kind.as_str()),
        }
    }

    pub fn label(&self) -> String {
        match self {
            ResourceKind::Workflows => "Workflows".to_string(),
            ResourceKind::Runs => "Results".to_string(),
            ResourceKind::Leaderboard => "Leaderboard".to_string(),
            ResourceKind::Files(kind) => format!("{} files", kind.label()),
        }
    }

    /// Whether the endpoint understands search, sort and creator filters.
    pub fn supports_query(&self) -> bool {
        matches!(self, ResourceKind::Workflows)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Fetches one list endpoint through the shared client.
pub struct ResourceSource<T> {
    client: Arc<ApiClient>,
    kind: ResourceKind,
    _item: PhantomData<fn() -> T>,
}

impl<T> Clone for ResourceSource<T> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            kind: self.kind,
            _item: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ResourceSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSource").field("kind", &self.kind).finish()
    }
}

impl<T> ResourceSource<T> {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn query(&self, request: &PageRequest) -> Vec<(String, String)> {
        if self.kind.supports_query() {
            request.query_pairs()
        } else {
            vec![
                ("page".to_string(), request.page.to_string()),
                ("page_size".to_string(), request.page_size.to_string()),
            ]
        }
    }
}

impl ResourceSource<Workflow> {
    pub fn workflows(client: Arc<ApiClient>) -> Self {
        Self::with_kind(client, ResourceKind::Workflows)
    }
}

impl ResourceSource<WorkflowRun> {
    pub fn runs(client: Arc<ApiClient>) -> Self {
        Self::with_kind(client, ResourceKind::Runs)
    }
}

impl ResourceSource<ModelPerformance> {
    pub fn leaderboard(client: Arc<ApiClient>) -> Self {
        Self::with_kind(client, ResourceKind::Leaderboard)
    }
}

impl ResourceSource<AssetFile> {
    pub fn files(client: Arc<ApiClient>, kind: UploadKind) -> Self {
        Self::with_kind(client, ResourceKind::Files(kind))
    }
}

impl<T> ResourceSource<T> {
    fn with_kind(client: Arc<ApiClient>, kind: ResourceKind) -> Self {
        Self {
            client,
            kind,
            _item: PhantomData,
        }
    }
}

impl<T: DeserializeOwned + Send> ListSource<T> for ResourceSource<T> {
    async fn fetch(&self, request: &PageRequest) -> Result<RawListResponse<T>, DashboardError> {
        let path = self.kind.list_path();
        let body = self.client.get_json(&path, &self.query(request)).await?;
        let raw = RawListResponse::from_value(body);
        if let RawListResponse::Malformed(reason) = &raw {
            warn!("Unexpected list shape from {}: {}", path, reason);
        }
        Ok(raw)
    }
}

impl PagedListController<Workflow> {
    /// Creators present on the loaded page, for the creator filter.
    pub fn creator_options(&self) -> Vec<String> {
        let mut creators = self.distinct_values(|workflow| workflow.created_by.clone());
        creators.retain(|creator| !creator.is_empty());
        creators
    }
}
