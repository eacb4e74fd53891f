use crate::error::DashboardError;
use crate::pagination::{LocalQuery, PageRequest, SortSpec};
use ord_subset::OrdSubset;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Sort key the leaderboard ranks by.
pub const LEADERBOARD_SORT_KEY: &str = "accuracy";

/// Roles allowed to download and delete uploaded assets and runs.
const MANAGER_ROLES: [&str; 3] = ["admin", "scientist", "engineer"];

/// Anything a list view can show and delete by key.
pub trait ListItem {
    fn item_id(&self) -> u64;
}

pub fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339).ok()
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    Wheel,
    Input,
    Model,
    Class,
    Groundtruth,
}

impl UploadKind {
    pub const ALL: [UploadKind; 5] = [
        UploadKind::Wheel,
        UploadKind::Input,
        UploadKind::Model,
        UploadKind::Class,
        UploadKind::Groundtruth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadKind::Wheel => "wheel",
            UploadKind::Input => "input",
            UploadKind::Model => "model",
            UploadKind::Class => "class",
            UploadKind::Groundtruth => "groundtruth",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            UploadKind::Wheel => "Wheel",
            UploadKind::Input => "Input",
            UploadKind::Model => "Model",
            UploadKind::Class => "Class",
            UploadKind::Groundtruth => "Groundtruth",
        }
    }
}

impl fmt::Display for UploadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for UploadKind {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UploadKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.to_lowercase())
            .ok_or_else(|| DashboardError::Validation(format!("Unknown upload kind '{}'", s)))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    #[default]
    File,
    Folder,
}

/// An uploaded asset: input file or folder, model, wheel, class list or
/// ground-truth set. The backend fills different path fields per kind.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct AssetFile {
    pub id: u64,
    pub name: Option<String>,
    pub file_name: Option<String>,
    pub path: Option<String>,
    pub file: Option<String>,
    pub folder_path: Option<String>,
    pub description: Option<String>,
    pub size: Option<u64>,
    pub uploaded_at: Option<String>,
    pub input_type: Option<InputType>,
}

impl AssetFile {
    pub fn display_path(&self) -> Option<&str> {
        self.file
            .as_deref()
            .or(self.path.as_deref())
            .or(self.folder_path.as_deref())
    }

    pub fn display_name(&self) -> String {
        self.name
            .as_deref()
            .or(self.file_name.as_deref())
            .or(self.display_path())
            .or(self.description.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| self.id.to_string())
    }

    pub fn size_mb(&self) -> Option<f64> {
        self.size.map(|bytes| bytes as f64 / (1024.0 * 1024.0))
    }

    pub fn is_folder(&self) -> bool {
        self.input_type == Some(InputType::Folder)
    }
}

impl ListItem for AssetFile {
    fn item_id(&self) -> u64 {
        self.id
    }
}

impl LocalQuery for AssetFile {
    fn matches(&self, request: &PageRequest) -> bool {
        let Some(q) = request.filter("q") else {
            return true;
        };
        let target = self
            .file
            .as_deref()
            .or(self.folder_path.as_deref())
            .unwrap_or("");
        target.to_lowercase().contains(&q.to_lowercase())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct WorkflowStep {
    pub step_number: u32,
    pub wheel_file: Option<AssetFile>,
    pub model_file: Option<AssetFile>,
    pub result_file: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Workflow {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub input: Option<AssetFile>,
    pub steps: Vec<WorkflowStep>,
    pub created_by: String,
    pub created_at: Option<String>,
    pub pinned: bool,
}

impl ListItem for Workflow {
    fn item_id(&self) -> u64 {
        self.id
    }
}

impl Workflow {
    fn sort_field(&self, key: &str) -> &str {
        match key {
            "name" => &self.name,
            "description" => self.description.as_deref().unwrap_or(""),
            "created_by" => &self.created_by,
            _ => "",
        }
    }
}

impl LocalQuery for Workflow {
    fn matches(&self, request: &PageRequest) -> bool {
        if let Some(q) = request.filter("q") {
            let q = q.to_lowercase();
            let in_name = self.name.to_lowercase().contains(&q);
            let in_description = self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&q));
            if !in_name && !in_description {
                return false;
            }
        }
        request
            .filter("created_by")
            .is_none_or(|creator| self.created_by == creator)
    }

    /// Pinned workflows first, then by the requested key.
    fn compare(&self, other: &Self, sort: Option<&SortSpec>) -> Ordering {
        let pinned = other.pinned.cmp(&self.pinned);
        if pinned != Ordering::Equal {
            return pinned;
        }
        let Some(sort) = sort else {
            return Ordering::Equal;
        };
        let ascending = if sort.key == "created_at" {
            let a = self.created_at.as_deref().and_then(parse_timestamp);
            let b = other.created_at.as_deref().and_then(parse_timestamp);
            a.cmp(&b)
        } else {
            self.sort_field(&sort.key).cmp(other.sort_field(&sort.key))
        };
        sort.order.apply(ascending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Error,
    Success,
    InProgress,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Error => f.write_str("Error"),
            RunStatus::Success => f.write_str("Success"),
            RunStatus::InProgress => f.write_str("In Progress"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct WorkflowRun {
    pub id: u64,
    pub name: Option<String>,
    pub workflow: Option<Workflow>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub error: Value,
}

impl WorkflowRun {
    /// An error of any truthy value wins; otherwise a recorded end time means
    /// the run finished.
    pub fn status(&self) -> RunStatus {
        let has_error = match &self.error {
            Value::Null | Value::Bool(false) => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        };
        if has_error {
            RunStatus::Error
        } else if self.end_time.as_deref().is_some_and(|t| !t.is_empty()) {
            RunStatus::Success
        } else {
            RunStatus::InProgress
        }
    }
}

impl ListItem for WorkflowRun {
    fn item_id(&self) -> u64 {
        self.id
    }
}

impl LocalQuery for WorkflowRun {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct RunSummary {
    pub id: u64,
    pub run_by: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct StepDefinition {
    pub model_file: Option<AssetFile>,
    pub wheel_file: Option<AssetFile>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct StepRun {
    pub id: u64,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub workflow_step: StepDefinition,
}

/// Leaderboard row: how one model performed in one step of one run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct ModelPerformance {
    pub id: u64,
    pub accuracy: f64,
    pub workflow_run: RunSummary,
    pub workflow_step_run: StepRun,
}

impl ModelPerformance {
    pub fn model(&self) -> Option<&AssetFile> {
        self.workflow_step_run.workflow_step.model_file.as_ref()
    }

    pub fn model_name(&self) -> String {
        self.model()
            .map(AssetFile::display_name)
            .unwrap_or_else(|| "None".to_string())
    }
}

impl ListItem for ModelPerformance {
    fn item_id(&self) -> u64 {
        self.id
    }
}

impl LocalQuery for ModelPerformance {
    /// Ranks by accuracy in the requested order. A NaN accuracy is always last.
    fn compare(&self, other: &Self, sort: Option<&SortSpec>) -> Ordering {
        let Some(sort) = sort.filter(|sort| sort.key == LEADERBOARD_SORT_KEY) else {
            return Ordering::Equal;
        };
        match (
            self.accuracy.is_outside_order(),
            other.accuracy.is_outside_order(),
        ) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => sort.order.apply(
                self.accuracy
                    .partial_cmp(&other.accuracy)
                    .unwrap_or(Ordering::Equal),
            ),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct UserInfo {
    pub username: String,
    pub role: Option<String>,
}

impl UserInfo {
    pub fn can_manage_assets(&self) -> bool {
        self.role
            .as_deref()
            .is_some_and(|role| MANAGER_ROLES.contains(&role))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewWorkflowStep {
    pub step_number: u32,
    pub wheel_file: Option<u64>,
    pub model_file: Option<u64>,
}

/// Payload for `POST /api/workflow/create/` and `PUT /api/workflow/<id>/`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct NewWorkflow {
    pub name: String,
    pub description: String,
    pub input: Option<u64>,
    pub steps: Vec<NewWorkflowStep>,
}

impl NewWorkflow {
    pub fn validate(&self) -> Result<(), DashboardError> {
        if self.name.trim().is_empty() {
            return Err(DashboardError::Validation("Workflow name is required".to_string()));
        }
        if self.input.is_none() {
            return Err(DashboardError::Validation("Select an input file".to_string()));
        }
        if self.steps.is_empty() {
            return Err(DashboardError::Validation("Add at least one step".to_string()));
        }
        if let Some(step) = self.steps.iter().find(|s| s.wheel_file.is_none()) {
            return Err(DashboardError::Validation(format!(
                "Step {} has no wheel file",
                step.step_number
            )));
        }
        Ok(())
    }

    /// Renumbers steps 1..n in their current order, e.g. after removing one.
    pub fn renumber_steps(&mut self) {
        for (i, step) in self.steps.iter_mut().enumerate() {
            step.step_number = i as u32 + 1;
        }
    }
}

impl From<&Workflow> for NewWorkflow {
    fn from(workflow: &Workflow) -> Self {
        NewWorkflow {
            name: workflow.name.clone(),
            description: workflow.description.clone().unwrap_or_default(),
            input: workflow.input.as_ref().map(|input| input.id),
            steps: workflow
                .steps
                .iter()
                .map(|step| NewWorkflowStep {
                    step_number: step.step_number,
                    wheel_file: step.wheel_file.as_ref().map(|f| f.id),
                    model_file: step.model_file.as_ref().map(|f| f.id),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::SortOrder;
    use serde_json::json;

    fn workflow(id: u64, name: &str, created_by: &str, created_at: &str, pinned: bool) -> Workflow {
        Workflow {
            id,
            name: name.to_string(),
            created_by: created_by.to_string(),
            created_at: Some(created_at.to_string()),
            pinned,
            ..Default::default()
        }
    }

    #[test]
    fn test_workflow_deserializes_with_nested_assets() {
        let value = json!({
            "id": 7,
            "name": "Count cells",
            "description": "Segmentation then counting",
            "input": {"id": 3, "name": "plate-01", "path": "inputs/plate-01"},
            "steps": [
                {"step_number": 1, "wheel_file": {"id": 11, "name": "segmenter"}, "model_file": null},
                {"step_number": 2, "wheel_file": {"id": 12, "name": "counter"}, "model_file": {"id": 21, "name": "unet", "size": 2097152}}
            ],
            "created_by": "alice",
            "created_at": "2024-05-01T10:00:00Z",
            "pinned": true
        });
        let wf: Workflow = serde_json::from_value(value).unwrap();
        assert_eq!(wf.id, 7);
        assert_eq!(wf.steps.len(), 2);
        assert_eq!(wf.steps[1].model_file.as_ref().unwrap().size_mb(), Some(2.0));
        assert!(wf.pinned);
    }

    #[test]
    fn test_workflow_search_and_creator_filter() {
        let mut wf = workflow(1, "Cell Counter", "alice", "2024-01-01T00:00:00Z", false);
        wf.description = Some("Counts nuclei".to_string());

        let by_name = PageRequest::default().with_filter("q", Some("counter".to_string()));
        let by_desc = PageRequest::default().with_filter("q", Some("NUCLEI".to_string()));
        let miss = PageRequest::default().with_filter("q", Some("tumor".to_string()));
        let wrong_creator =
            PageRequest::default().with_filter("created_by", Some("bob".to_string()));

        assert!(wf.matches(&by_name));
        assert!(wf.matches(&by_desc));
        assert!(!wf.matches(&miss));
        assert!(!wf.matches(&wrong_creator));
        assert!(wf.matches(&PageRequest::default()));
    }

    #[test]
    fn test_pinned_first_then_date() {
        let mut list = vec![
            workflow(1, "b", "x", "2024-01-02T00:00:00Z", false),
            workflow(2, "a", "x", "2024-01-03T00:00:00Z", false),
            workflow(3, "c", "x", "2024-01-01T00:00:00Z", true),
        ];
        let newest_first = SortSpec::new("created_at", SortOrder::Desc);
        list.sort_by(|a, b| a.compare(b, Some(&newest_first)));
        assert_eq!(list.iter().map(|w| w.id).collect::<Vec<_>>(), vec![3, 2, 1]);

        let by_name = SortSpec::new("name", SortOrder::Asc);
        list.sort_by(|a, b| a.compare(b, Some(&by_name)));
        assert_eq!(list.iter().map(|w| w.id).collect::<Vec<_>>(), vec![3, 2, 1]);
        list[0].pinned = false;
        list.sort_by(|a, b| a.compare(b, Some(&by_name)));
        assert_eq!(list.iter().map(|w| w.name.as_str()).collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_run_status() {
        let mut run = WorkflowRun::default();
        assert_eq!(run.status(), RunStatus::InProgress);
        run.end_time = Some("2024-01-01T00:10:00Z".to_string());
        assert_eq!(run.status(), RunStatus::Success);
        run.error = json!("Traceback ...");
        assert_eq!(run.status(), RunStatus::Error);
        run.error = json!(false);
        assert_eq!(run.status(), RunStatus::Success);
    }

    #[test]
    fn test_asset_search_uses_file_or_folder_path() {
        let file = AssetFile {
            id: 1,
            file: Some("uploads/Plate-01.tif".to_string()),
            ..Default::default()
        };
        let folder = AssetFile {
            id: 2,
            folder_path: Some("inputs/batch-7".to_string()),
            input_type: Some(InputType::Folder),
            ..Default::default()
        };
        let q = PageRequest::default().with_filter("q", Some("plate".to_string()));
        assert!(file.matches(&q));
        assert!(!folder.matches(&q));
        assert!(folder.is_folder());
        assert_eq!(folder.display_name(), "inputs/batch-7");
    }

    #[test]
    fn test_manager_roles() {
        let mut user = UserInfo {
            username: "sam".to_string(),
            role: Some("scientist".to_string()),
        };
        assert!(user.can_manage_assets());
        user.role = Some("viewer".to_string());
        assert!(!user.can_manage_assets());
        user.role = None;
        assert!(!user.can_manage_assets());
    }

    #[test]
    fn test_new_workflow_validation() {
        let mut payload = NewWorkflow {
            name: "Pipeline".to_string(),
            description: String::new(),
            input: Some(4),
            steps: vec![NewWorkflowStep {
                step_number: 1,
                wheel_file: Some(9),
                model_file: None,
            }],
        };
        assert!(payload.validate().is_ok());

        payload.steps.push(NewWorkflowStep {
            step_number: 2,
            wheel_file: None,
            model_file: Some(3),
        });
        match payload.validate() {
            Err(DashboardError::Validation(msg)) => assert_eq!(msg, "Step 2 has no wheel file"),
            other => panic!("Expected validation error, got {:?}", other),
        }

        payload.steps.remove(0);
        payload.renumber_steps();
        assert_eq!(payload.steps[0].step_number, 1);

        payload.input = None;
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_upload_kind_parsing() {
        assert_eq!("GroundTruth".parse::<UploadKind>().unwrap(), UploadKind::Groundtruth);
        assert!("video".parse::<UploadKind>().is_err());
        assert_eq!(serde_json::to_value(UploadKind::Wheel).unwrap(), json!("wheel"));
    }

    #[test]
    fn test_leaderboard_order_puts_nan_last() {
        let entry = |id: u64, accuracy: f64| ModelPerformance {
            id,
            accuracy,
            ..Default::default()
        };
        let best_first = SortSpec::new(LEADERBOARD_SORT_KEY, SortOrder::Desc);
        let mut entries = vec![entry(1, 0.5), entry(2, f64::NAN), entry(3, 0.9)];

        entries.sort_by(|a, b| a.compare(b, Some(&best_first)));
        assert_eq!(entries.iter().map(|e| e.id).collect::<Vec<_>>(), vec![3, 1, 2]);

        let worst_first = SortSpec::new(LEADERBOARD_SORT_KEY, SortOrder::Asc);
        entries.sort_by(|a, b| a.compare(b, Some(&worst_first)));
        assert_eq!(entries.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 3, 2]);

        let other_key = SortSpec::new("name", SortOrder::Desc);
        assert_eq!(entries[0].compare(&entries[1], Some(&other_key)), Ordering::Equal);
    }
}
