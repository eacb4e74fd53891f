pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http_client;
pub mod list_controller;
pub mod metrics;
pub mod models;
pub mod page_nav;
pub mod pagination;
pub mod resources;
pub mod workflow_graph;

pub use api::{UploadMode, UploadRequest, delete_path, download_file_name};
pub use config::DashboardConfig;
pub use credentials::{CredentialProvider, FileTokenStore, MemoryTokenStore, TokenPair};
pub use error::DashboardError;
pub use http_client::{ApiCall, ApiClient, UploadPart};
pub use list_controller::{FetchTicket, ListPhase, ListSource, PagedListController};
pub use metrics::{ModelComparison, Scorecard, compare_models, format_run_duration};
pub use models::{
    AssetFile, InputType, LEADERBOARD_SORT_KEY, ListItem, ModelPerformance, NewWorkflow, NewWorkflowStep, RunStatus,
    UploadKind, UserInfo, Workflow, WorkflowRun, WorkflowStep,
};
pub use page_nav::{NavTarget, PageNav, PageToken, page_tokens};
pub use pagination::{
    LocalQuery, PageRequest, PageResult, RawListResponse, SortOrder, SortSpec, normalize,
    normalize_request, total_pages,
};
pub use resources::{ResourceKind, ResourceSource};
pub use workflow_graph::{PipelineGraph, pipeline_graph};
