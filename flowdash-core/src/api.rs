use crate::credentials::TokenPair;
use crate::error::DashboardError;
use crate::http_client::{ApiClient, UploadPart};
use crate::models::{
    AssetFile, ModelPerformance, NewWorkflow, UploadKind, UserInfo, Workflow, WorkflowRun,
};
use crate::pagination::RawListResponse;
use crate::resources::ResourceKind;
use log::{info, warn};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

const LOGIN_PATH: &str = "/users/token/";
const CURRENT_USER_PATH: &str = "/users/me/";
const CREATE_WORKFLOW_PATH: &str = "/api/workflow/create/";
const DOWNLOAD_FILE_PATH: &str = "/files/downloadfile/";
const DOWNLOAD_OUTPUT_PATH: &str = "/files/download/output_path/";
const DEFAULT_DOWNLOAD_NAME: &str = "output.zip";

#[derive(Deserialize)]
struct LoginResponse {
    access: String,
    refresh: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadMode {
    #[default]
    File,
    Folder,
}

/// One multipart upload of assets of a single kind.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub kind: Option<UploadKind>,
    pub mode: UploadMode,
    pub description: String,
    pub folder_name: String,
    pub files: Vec<UploadPart>,
}

impl UploadRequest {
    pub fn new(kind: UploadKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    fn upload_kind(&self) -> Result<UploadKind, DashboardError> {
        self.kind
            .ok_or_else(|| DashboardError::Validation("Choose what kind of file to upload.".to_string()))
    }

    pub fn validate(&self) -> Result<(), DashboardError> {
        let kind = self.upload_kind()?;
        if self.files.is_empty() {
            return Err(DashboardError::Validation("No files selected.".to_string()));
        }
        if kind == UploadKind::Input
            && self.mode == UploadMode::Folder
            && self.folder_name.trim().is_empty()
        {
            return Err(DashboardError::Validation("Please enter a folder name.".to_string()));
        }
        Ok(())
    }

    /// Inputs go to a file or folder endpoint; every other kind has its own.
    pub fn endpoint(&self) -> Result<String, DashboardError> {
        let kind = self.upload_kind()?;
        Ok(match (kind, self.mode) {
            (UploadKind::Input, UploadMode::Folder) => "/files/upload/folder".to_string(),
            (UploadKind::Input, UploadMode::File) => "/files/upload/file".to_string(),
            (other, _) => format!("/files/upload/{}/", other.as_str()),
        })
    }

    fn fields(&self) -> Result<Vec<(String, String)>, DashboardError> {
        let kind = self.upload_kind()?;
        let mut fields = vec![("description".to_string(), self.description.clone())];
        if kind == UploadKind::Input {
            fields.push(("folder".to_string(), self.folder_name.trim().to_string()));
        }
        fields.push(("upload_type".to_string(), kind.as_str().to_string()));
        Ok(fields)
    }
}

/// Path of the DELETE endpoint for one row of a list.
pub fn delete_path(kind: ResourceKind, id: u64, is_folder: bool) -> Result<String, DashboardError> {
    match kind {
        ResourceKind::Workflows => Ok(format!("/api/workflow/{}/", id)),
        ResourceKind::Runs => Ok(format!("/api/workflow/run/{}/", id)),
        ResourceKind::Files(UploadKind::Input) if is_folder => {
            Ok(format!("/files/delete/folder/{}/", id))
        }
        ResourceKind::Files(upload_kind) => {
            Ok(format!("/files/delete/file/{}/{}", id, upload_kind.as_str()))
        }
        ResourceKind::Leaderboard => Err(DashboardError::Validation(
            "Leaderboard entries cannot be deleted".to_string(),
        )),
    }
}

/// Last path segment of a download, used as the saved file name.
pub fn download_file_name(relative_path: &str) -> String {
    relative_path
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_DOWNLOAD_NAME)
        .to_string()
}

/// Accepts either list shape and returns every item it carries.
fn all_items<T: DeserializeOwned>(body: Value, what: &str) -> Result<Vec<T>, DashboardError> {
    match RawListResponse::from_value(body) {
        RawListResponse::Envelope { results, .. } => Ok(results),
        RawListResponse::Flat(items) => Ok(items),
        RawListResponse::Malformed(reason) => Err(DashboardError::MalformedResponse(format!(
            "{}: {}",
            what, reason
        ))),
    }
}

impl ApiClient {
    pub async fn login(&self, username: &str, password: &str) -> Result<UserInfo, DashboardError> {
        let body = self
            .post_json(LOGIN_PATH, &json!({ "username": username, "password": password }))
            .await
            .map_err(|e| match e {
                DashboardError::Auth(_) | DashboardError::Http { status: 400 | 401, .. } => {
                    DashboardError::Auth("Invalid credentials".to_string())
                }
                other => other,
            })?;
        let tokens: LoginResponse = serde_json::from_value(body)?;
        self.credentials().store(TokenPair {
            access: Some(tokens.access),
            refresh: Some(tokens.refresh),
        })?;
        let user = self.current_user().await?;
        info!("Logged in as {}", user.username);
        Ok(user)
    }

    pub fn logout(&self) -> Result<(), DashboardError> {
        self.credentials().clear()?;
        info!("Logged out");
        Ok(())
    }

    pub async fn current_user(&self) -> Result<UserInfo, DashboardError> {
        let body = self.get_json(CURRENT_USER_PATH, &[]).await?;
        Ok(serde_json::from_value(body)?)
    }

    pub async fn get_workflow(&self, id: u64) -> Result<Workflow, DashboardError> {
        let body = self.get_json(&format!("/api/workflow/{}/", id), &[]).await?;
        Ok(serde_json::from_value(body)?)
    }

    pub async fn create_workflow(&self, workflow: &NewWorkflow) -> Result<(), DashboardError> {
        workflow.validate()?;
        self.post_json(CREATE_WORKFLOW_PATH, workflow).await?;
        info!("Created workflow '{}'", workflow.name);
        Ok(())
    }

    pub async fn update_workflow(&self, id: u64, workflow: &NewWorkflow) -> Result<(), DashboardError> {
        workflow.validate()?;
        self.put_json(&format!("/api/workflow/{}/", id), workflow).await?;
        Ok(())
    }

    pub async fn delete_workflow(&self, id: u64) -> Result<(), DashboardError> {
        self.delete_item(ResourceKind::Workflows, id, false).await
    }

    pub async fn execute_workflow(&self, id: u64) -> Result<(), DashboardError> {
        self.post_empty(&format!("/api/workflow/execute/{}/", id)).await?;
        info!("Started execution of workflow {}", id);
        Ok(())
    }

    /// Toggles the pinned flag on the server.
    pub async fn pin_workflow(&self, id: u64) -> Result<(), DashboardError> {
        self.put_empty(&format!("/api/pinworkflow/{}/", id)).await?;
        Ok(())
    }

    pub async fn get_run(&self, id: u64) -> Result<WorkflowRun, DashboardError> {
        let body = self.get_json(&format!("/api/workflow/run/{}/", id), &[]).await?;
        Ok(serde_json::from_value(body)?)
    }

    pub async fn delete_run(&self, id: u64) -> Result<(), DashboardError> {
        self.delete_item(ResourceKind::Runs, id, false).await
    }

    pub async fn run_performance(&self, run_id: u64) -> Result<Vec<ModelPerformance>, DashboardError> {
        let body = self
            .get_json(&format!("/api/modelperformance/{}", run_id), &[])
            .await?;
        all_items(body, "model performance")
    }

    /// Every uploaded asset of one kind, unpaged. Used for pickers.
    pub async fn list_files(&self, kind: UploadKind) -> Result<Vec<AssetFile>, DashboardError> {
        let body = self
            .get_json(&ResourceKind::Files(kind).list_path(), &[])
            .await?;
        all_items(body, kind.as_str())
    }

    pub async fn delete_file(&self, kind: UploadKind, file: &AssetFile) -> Result<(), DashboardError> {
        self.delete_item(ResourceKind::Files(kind), file.id, file.is_folder())
            .await
    }

    pub async fn delete_item(&self, kind: ResourceKind, id: u64, is_folder: bool) -> Result<(), DashboardError> {
        let path = delete_path(kind, id, is_folder)?;
        self.delete(&path).await.inspect_err(|e| {
            warn!("Delete of {} {} failed: {}", kind, id, e);
        })?;
        info!("Deleted {} {}", kind, id);
        Ok(())
    }

    pub async fn upload(&self, request: &UploadRequest) -> Result<(), DashboardError> {
        request.validate()?;
        let endpoint = request.endpoint()?;
        let fields = request.fields()?;
        self.post_multipart(&endpoint, &fields, &request.files).await?;
        info!("Uploaded {} file(s) to {}", request.files.len(), endpoint);
        Ok(())
    }

    pub async fn download_file(&self, relative_path: &str) -> Result<Vec<u8>, DashboardError> {
        self.post_for_bytes(DOWNLOAD_FILE_PATH, &json!({ "relative_path": relative_path }))
            .await
    }

    pub async fn download_output(&self, relative_path: &str) -> Result<Vec<u8>, DashboardError> {
        self.post_for_bytes(DOWNLOAD_OUTPUT_PATH, &json!({ "relative_path": relative_path }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(name: &str) -> UploadPart {
        UploadPart {
            file_name: name.to_string(),
            bytes: vec![1, 2, 3],
        }
    }

    #[test]
    fn test_upload_endpoints() {
        let mut request = UploadRequest::new(UploadKind::Input);
        assert_eq!(request.endpoint().unwrap(), "/files/upload/file");
        request.mode = UploadMode::Folder;
        assert_eq!(request.endpoint().unwrap(), "/files/upload/folder");

        let wheel = UploadRequest {
            mode: UploadMode::Folder,
            ..UploadRequest::new(UploadKind::Wheel)
        };
        assert_eq!(wheel.endpoint().unwrap(), "/files/upload/wheel/");
    }

    #[test]
    fn test_upload_validation() {
        let mut request = UploadRequest::new(UploadKind::Input);
        assert!(matches!(request.validate(), Err(DashboardError::Validation(m)) if m == "No files selected."));

        request.files.push(part("a.png"));
        request.mode = UploadMode::Folder;
        assert!(matches!(
            request.validate(),
            Err(DashboardError::Validation(m)) if m == "Please enter a folder name."
        ));

        request.folder_name = "frames".to_string();
        assert!(request.validate().is_ok());

        let missing_kind = UploadRequest {
            files: vec![part("x")],
            ..Default::default()
        };
        assert!(missing_kind.validate().is_err());
    }

    #[test]
    fn test_upload_fields() {
        let mut input = UploadRequest::new(UploadKind::Input);
        input.description = "night shots".to_string();
        input.folder_name = " frames ".to_string();
        assert_eq!(
            input.fields().unwrap(),
            vec![
                ("description".to_string(), "night shots".to_string()),
                ("folder".to_string(), "frames".to_string()),
                ("upload_type".to_string(), "input".to_string()),
            ]
        );

        let model = UploadRequest::new(UploadKind::Model);
        assert!(model.fields().unwrap().iter().all(|(k, _)| k != "folder"));
    }

    #[test]
    fn test_delete_paths() {
        assert_eq!(delete_path(ResourceKind::Workflows, 4, false).unwrap(), "/api/workflow/4/");
        assert_eq!(delete_path(ResourceKind::Runs, 4, false).unwrap(), "/api/workflow/run/4/");
        assert_eq!(
            delete_path(ResourceKind::Files(UploadKind::Input), 4, true).unwrap(),
            "/files/delete/folder/4/"
        );
        assert_eq!(
            delete_path(ResourceKind::Files(UploadKind::Input), 4, false).unwrap(),
            "/files/delete/file/4/input"
        );
        assert_eq!(
            delete_path(ResourceKind::Files(UploadKind::Model), 4, true).unwrap(),
            "/files/delete/file/4/model"
        );
        assert!(delete_path(ResourceKind::Leaderboard, 4, false).is_err());
    }

    #[test]
    fn test_download_file_name() {
        assert_eq!(download_file_name("runs/12/output.csv"), "output.csv");
        assert_eq!(download_file_name("runs/12/"), "output.zip");
        assert_eq!(download_file_name("single.bin"), "single.bin");
    }

    #[test]
    fn test_all_items_accepts_both_shapes() {
        let flat: Vec<AssetFile> = all_items(json!([{ "id": 1 }, { "id": 2 }]), "files").unwrap();
        assert_eq!(flat.len(), 2);

        let envelope: Vec<AssetFile> =
            all_items(json!({ "results": [{ "id": 3 }], "count": 9 }), "files").unwrap();
        assert_eq!(envelope[0].id, 3);

        let bad = all_items::<AssetFile>(json!({ "detail": "nope" }), "files");
        assert!(matches!(bad, Err(DashboardError::MalformedResponse(_))));
    }
}
