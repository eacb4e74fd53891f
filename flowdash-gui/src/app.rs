use crate::list_view::{ListEvent, ListView, list_body, list_footer};
use flowdash_core::{
    ApiClient, AssetFile, DashboardConfig, DashboardError, FetchTicket, ModelComparison,
    ModelPerformance, PagedListController, RawListResponse, ResourceKind, ResourceSource,
    RunStatus, SortOrder, UploadKind, UploadMode, UploadPart, UploadRequest, UserInfo, Workflow,
    WorkflowRun, compare_models, download_file_name, format_run_duration, models::parse_timestamp,
    pipeline_graph, LEADERBOARD_SORT_KEY,
};
use iced::widget::{button, column, container, pick_list, row, text, text_input};
use iced::{Element, Length, Task};
use rfd::AsyncFileDialog;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

const COLUMN_WIDTH: f32 = 180.0;
const WORKFLOW_SEARCH_PLACEHOLDER: &str = "Search workflows...";
const FILE_SEARCH_PLACEHOLDER: &str = "Search files...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Workflows,
    Results,
    Leaderboard,
    Uploads,
}

impl Tab {
    const ALL: [Tab; 4] = [Tab::Workflows, Tab::Results, Tab::Leaderboard, Tab::Uploads];

    fn label(&self) -> &'static str {
        match self {
            Tab::Workflows => "Workflows",
            Tab::Results => "Results",
            Tab::Leaderboard => "Leaderboard",
            Tab::Uploads => "Uploads",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowSortKey {
    CreatedAt,
    Name,
}

impl WorkflowSortKey {
    const ALL: [WorkflowSortKey; 2] = [WorkflowSortKey::CreatedAt, WorkflowSortKey::Name];

    fn key(&self) -> &'static str {
        match self {
            WorkflowSortKey::CreatedAt => "created_at",
            WorkflowSortKey::Name => "name",
        }
    }
}

impl fmt::Display for WorkflowSortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowSortKey::CreatedAt => write!(f, "Sort by Created Date"),
            WorkflowSortKey::Name => write!(f, "Sort by Name"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunDetails {
    pub run: WorkflowRun,
    pub performance: Vec<ModelPerformance>,
}

#[derive(Debug, Clone)]
pub enum Message {
    // Session
    UsernameChanged(String),
    PasswordChanged(String),
    SubmitLogin,
    LoggedIn(Result<UserInfo, String>),
    UserLoaded(Result<UserInfo, String>),
    Logout,

    // Navigation between screens
    TabSelected(Tab),
    UploadKindSelected(UploadKind),

    // Lists
    WorkflowList(ListEvent),
    RunList(ListEvent),
    LeaderboardList(ListEvent),
    FileList(UploadKind, ListEvent),
    WorkflowsLoaded(FetchTicket, Result<RawListResponse<Workflow>, String>),
    RunsLoaded(FetchTicket, Result<RawListResponse<WorkflowRun>, String>),
    LeaderboardLoaded(FetchTicket, Result<RawListResponse<ModelPerformance>, String>),
    FilesLoaded(UploadKind, FetchTicket, Result<RawListResponse<AssetFile>, String>),

    // Workflow toolbar
    CreatorSelected(String),
    ClearCreator,
    SortKeySelected(WorkflowSortKey),
    ToggleSortOrder,

    // Row actions
    DeleteRequested {
        kind: ResourceKind,
        id: u64,
        is_folder: bool,
    },
    Deleted(ResourceKind, u64, Result<(), String>),
    ExecuteWorkflow(u64),
    Executed(Result<u64, String>),
    PinWorkflow(u64),
    Pinned(Result<u64, String>),
    ShowRun(u64),
    RunDetailsLoaded(Result<RunDetails, String>),
    CloseRunDetails,

    // Leaderboard comparison, keyed by row on the loaded page
    ToggleCompare(usize),
    Compare,
    ClearComparison,

    // Uploads
    UploadModeSelected(UploadMode),
    UploadDescriptionChanged(String),
    UploadFolderChanged(String),
    PickUploadFiles,
    UploadFilesPicked(Result<Vec<UploadPart>, String>),
    SubmitUpload,
    UploadFinished(UploadKind, Result<(), String>),

    // Downloads
    DownloadRequested { relative_path: String, output: bool },
    DownloadFetched(Result<(String, Vec<u8>), String>),
    DownloadSaved(Option<String>),
}

pub struct AppState {
    client: Arc<ApiClient>,
    config: DashboardConfig,
    user: Option<UserInfo>,
    username: String,
    password: String,
    is_logging_in: bool,

    tab: Tab,
    upload_kind: UploadKind,

    workflows: ListView<Workflow>,
    runs: ListView<WorkflowRun>,
    leaderboard: ListView<ModelPerformance>,
    // One list per upload kind, in `UploadKind::ALL` order.
    files: Vec<ListView<AssetFile>>,

    sort_key: WorkflowSortKey,
    run_details: Option<RunDetails>,
    compare_selection: Vec<usize>,
    comparison: Vec<ModelComparison>,

    upload: UploadRequest,
    is_uploading: bool,
    pending_download: Option<Vec<u8>>,

    display_text: String,
    error_message: Option<String>,
}

impl AppState {
    fn new(client: Arc<ApiClient>, config: DashboardConfig) -> Self {
        let page_size = config.default_page_size;
        let files = UploadKind::ALL
            .into_iter()
            .map(|kind| {
                ListView::new(
                    ResourceSource::files(Arc::clone(&client), kind),
                    PagedListController::new(page_size),
                )
            })
            .collect();

        AppState {
            workflows: ListView::new(
                ResourceSource::workflows(Arc::clone(&client)),
                PagedListController::new(page_size).with_sort("created_at", SortOrder::Desc),
            ),
            runs: ListView::new(
                ResourceSource::runs(Arc::clone(&client)),
                PagedListController::new(page_size),
            ),
            leaderboard: ListView::new(
                ResourceSource::leaderboard(Arc::clone(&client)),
                PagedListController::new(page_size).with_sort(LEADERBOARD_SORT_KEY, SortOrder::Desc),
            ),
            files,
            client,
            config,
            user: None,
            username: String::new(),
            password: String::new(),
            is_logging_in: false,
            tab: Tab::Workflows,
            upload_kind: UploadKind::Wheel,
            sort_key: WorkflowSortKey::CreatedAt,
            run_details: None,
            compare_selection: Vec::new(),
            comparison: Vec::new(),
            upload: UploadRequest::new(UploadKind::Wheel),
            is_uploading: false,
            pending_download: None,
            display_text: String::new(),
            error_message: None,
        }
    }

    fn is_signed_in(&self) -> bool {
        self.client.credentials().is_authenticated()
    }

    fn can_manage_assets(&self) -> bool {
        self.user.as_ref().is_some_and(UserInfo::can_manage_assets)
    }

    fn file_index(kind: UploadKind) -> usize {
        UploadKind::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or_default()
    }

    fn files_view(&self, kind: UploadKind) -> &ListView<AssetFile> {
        &self.files[Self::file_index(kind)]
    }

    fn files_view_mut(&mut self, kind: UploadKind) -> &mut ListView<AssetFile> {
        &mut self.files[Self::file_index(kind)]
    }

    fn fetch_files(&self, kind: UploadKind, ticket: Option<FetchTicket>) -> Task<Message> {
        self.files_view(kind)
            .fetch_maybe(ticket, move |t, o| Message::FilesLoaded(kind, t, o))
    }

    /// Loads the list behind the active tab if it has never been fetched.
    fn load_active_tab(&mut self) -> Task<Message> {
        match self.tab {
            Tab::Workflows => {
                let ticket = self.workflows.ensure_loaded();
                self.workflows.fetch_maybe(ticket, Message::WorkflowsLoaded)
            }
            Tab::Results => {
                let ticket = self.runs.ensure_loaded();
                self.runs.fetch_maybe(ticket, Message::RunsLoaded)
            }
            Tab::Leaderboard => {
                let ticket = self.leaderboard.ensure_loaded();
                self.leaderboard.fetch_maybe(ticket, Message::LeaderboardLoaded)
            }
            Tab::Uploads => {
                let kind = self.upload_kind;
                let ticket = self.files_view_mut(kind).ensure_loaded();
                self.fetch_files(kind, ticket)
            }
        }
    }

    fn report(&mut self, context: &str, error: String) {
        log::error!("{}: {}", context, error);
        self.error_message = Some(format!("{}: {}", context, error));
    }
}

pub fn connect() -> Result<(Arc<ApiClient>, DashboardConfig), DashboardError> {
    let config = DashboardConfig::load()?;
    let credentials = Arc::new(flowdash_core::FileTokenStore::new()?);
    let client = ApiClient::new(&config, credentials)?;
    Ok((Arc::new(client), config))
}

pub fn initialize(client: Arc<ApiClient>, config: DashboardConfig) -> (AppState, Task<Message>) {
    let mut state = AppState::new(client, config);
    if !state.is_signed_in() {
        return (state, Task::none());
    }

    let client = Arc::clone(&state.client);
    let user = Task::perform(
        async move { client.current_user().await.map_err(|e| e.to_string()) },
        Message::UserLoaded,
    );
    let list = state.load_active_tab();
    (state, Task::batch([user, list]))
}

async fn load_run_details(client: Arc<ApiClient>, id: u64) -> Result<RunDetails, DashboardError> {
    let run = client.get_run(id).await?;
    let performance = client.run_performance(id).await?;
    Ok(RunDetails { run, performance })
}

async fn read_folder(dir: PathBuf) -> Result<Vec<UploadPart>, std::io::Error> {
    let folder = dir
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut entries = tokio::fs::read_dir(&dir).await?;
    let mut parts = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            parts.push(UploadPart {
                file_name: format!("{}/{}", folder, entry.file_name().to_string_lossy()),
                bytes: tokio::fs::read(entry.path()).await?,
            });
        }
    }
    Ok(parts)
}

async fn pick_upload_files(mode: UploadMode) -> Result<Vec<UploadPart>, String> {
    match mode {
        UploadMode::Folder => match AsyncFileDialog::new().pick_folder().await {
            Some(handle) => read_folder(handle.path().to_path_buf())
                .await
                .map_err(|e| format!("Failed to read folder: {}", e)),
            None => Ok(Vec::new()),
        },
        UploadMode::File => {
            let mut parts = Vec::new();
            for handle in AsyncFileDialog::new().pick_files().await.unwrap_or_default() {
                parts.push(UploadPart {
                    file_name: handle.file_name(),
                    bytes: handle.read().await,
                });
            }
            Ok(parts)
        }
    }
}

pub fn update(state: &mut AppState, message: Message) -> Task<Message> {
    match message {
        Message::UsernameChanged(username) => {
            state.username = username;
        }
        Message::PasswordChanged(password) => {
            state.password = password;
        }
        Message::SubmitLogin => {
            if state.username.trim().is_empty() || state.password.is_empty() {
                state.error_message = Some("Enter a username and password".to_string());
                return Task::none();
            }
            state.is_logging_in = true;
            state.error_message = None;

            let client = Arc::clone(&state.client);
            let username = state.username.trim().to_string();
            let password = state.password.clone();
            return Task::perform(
                async move {
                    client
                        .login(&username, &password)
                        .await
                        .map_err(|e| e.to_string())
                },
                Message::LoggedIn,
            );
        }
        Message::LoggedIn(result) => {
            state.is_logging_in = false;
            state.password.clear();
            match result {
                Ok(user) => {
                    state.display_text = format!("Signed in as {}", user.username);
                    state.user = Some(user);
                    state.error_message = None;
                    return state.load_active_tab();
                }
                Err(error) => state.report("Login failed", error),
            }
        }
        Message::UserLoaded(result) => match result {
            Ok(user) => state.user = Some(user),
            Err(error) => state.report("Failed to load user", error),
        },
        Message::Logout => {
            if let Err(e) = state.client.logout() {
                state.report("Logout failed", e.to_string());
                return Task::none();
            }
            let client = Arc::clone(&state.client);
            let config = state.config.clone();
            *state = AppState::new(client, config);
            state.display_text = "Signed out.".to_string();
        }

        Message::TabSelected(tab) => {
            state.tab = tab;
            state.error_message = None;
            return state.load_active_tab();
        }
        Message::UploadKindSelected(kind) => {
            state.upload_kind = kind;
            state.upload = UploadRequest::new(kind);
            return state.load_active_tab();
        }

        Message::WorkflowList(event) => {
            let ticket = state.workflows.handle(event);
            return state.workflows.fetch_maybe(ticket, Message::WorkflowsLoaded);
        }
        Message::RunList(event) => {
            let ticket = state.runs.handle(event);
            return state.runs.fetch_maybe(ticket, Message::RunsLoaded);
        }
        Message::LeaderboardList(event) => {
            let ticket = state.leaderboard.handle(event);
            return state.leaderboard.fetch_maybe(ticket, Message::LeaderboardLoaded);
        }
        Message::FileList(kind, event) => {
            let ticket = state.files_view_mut(kind).handle(event);
            return state.fetch_files(kind, ticket);
        }
        Message::WorkflowsLoaded(ticket, outcome) => {
            state.workflows.list.apply(&ticket, outcome);
        }
        Message::RunsLoaded(ticket, outcome) => {
            state.runs.list.apply(&ticket, outcome);
        }
        Message::LeaderboardLoaded(ticket, outcome) => {
            if state.leaderboard.list.apply(&ticket, outcome) {
                state.compare_selection.clear();
                state.comparison.clear();
            }
        }
        Message::FilesLoaded(kind, ticket, outcome) => {
            state.files_view_mut(kind).list.apply(&ticket, outcome);
        }

        Message::CreatorSelected(creator) => {
            let ticket = state.workflows.list.set_filter("created_by", Some(creator));
            return state.workflows.fetch(ticket, Message::WorkflowsLoaded);
        }
        Message::ClearCreator => {
            let ticket = state.workflows.list.set_filter("created_by", None);
            return state.workflows.fetch(ticket, Message::WorkflowsLoaded);
        }
        Message::SortKeySelected(key) => {
            state.sort_key = key;
            let order = state
                .workflows
                .list
                .sort()
                .map(|sort| sort.order)
                .unwrap_or_default();
            let ticket = state.workflows.list.set_sort(key.key(), order);
            return state.workflows.fetch(ticket, Message::WorkflowsLoaded);
        }
        Message::ToggleSortOrder => {
            let ticket = state.workflows.list.toggle_sort_order();
            return state.workflows.fetch(ticket, Message::WorkflowsLoaded);
        }

        Message::DeleteRequested {
            kind,
            id,
            is_folder,
        } => {
            let client = Arc::clone(&state.client);
            return Task::perform(
                async move {
                    client
                        .delete_item(kind, id, is_folder)
                        .await
                        .map_err(|e| e.to_string())
                },
                move |result| Message::Deleted(kind, id, result),
            );
        }
        Message::Deleted(kind, id, result) => {
            if let Err(error) = result {
                state.report("Delete failed", error);
                return Task::none();
            }
            state.display_text = format!("Deleted {} {}", kind, id);
            return match kind {
                ResourceKind::Workflows => {
                    let ticket = state.workflows.list.reconcile_after_delete(id);
                    state.workflows.fetch_maybe(ticket, Message::WorkflowsLoaded)
                }
                ResourceKind::Runs => {
                    if state.run_details.as_ref().is_some_and(|d| d.run.id == id) {
                        state.run_details = None;
                    }
                    let ticket = state.runs.list.reconcile_after_delete(id);
                    state.runs.fetch_maybe(ticket, Message::RunsLoaded)
                }
                ResourceKind::Files(upload_kind) => {
                    let ticket = state.files_view_mut(upload_kind).list.reconcile_after_delete(id);
                    state.fetch_files(upload_kind, ticket)
                }
                ResourceKind::Leaderboard => Task::none(),
            };
        }
        Message::ExecuteWorkflow(id) => {
            let client = Arc::clone(&state.client);
            return Task::perform(
                async move {
                    client
                        .execute_workflow(id)
                        .await
                        .map(|_| id)
                        .map_err(|e| e.to_string())
                },
                Message::Executed,
            );
        }
        Message::Executed(result) => match result {
            Ok(id) => {
                state.display_text = format!("Workflow {} executed!", id);
                state.error_message = None;
            }
            Err(error) => state.report("Execution failed", error),
        },
        Message::PinWorkflow(id) => {
            let client = Arc::clone(&state.client);
            return Task::perform(
                async move {
                    client
                        .pin_workflow(id)
                        .await
                        .map(|_| id)
                        .map_err(|e| e.to_string())
                },
                Message::Pinned,
            );
        }
        Message::Pinned(result) => match result {
            Ok(_) => {
                let ticket = state.workflows.list.refetch();
                return state.workflows.fetch(ticket, Message::WorkflowsLoaded);
            }
            Err(error) => state.report("Pin failed", error),
        },
        Message::ShowRun(id) => {
            let client = Arc::clone(&state.client);
            return Task::perform(
                async move {
                    load_run_details(client, id)
                        .await
                        .map_err(|e| e.to_string())
                },
                Message::RunDetailsLoaded,
            );
        }
        Message::RunDetailsLoaded(result) => match result {
            Ok(details) => state.run_details = Some(details),
            Err(error) => state.report("Failed to load run", error),
        },
        Message::CloseRunDetails => {
            state.run_details = None;
        }

        Message::ToggleCompare(row) => {
            if let Some(pos) = state.compare_selection.iter().position(|s| *s == row) {
                state.compare_selection.remove(pos);
            } else {
                state.compare_selection.push(row);
            }
        }
        Message::Compare => {
            let selected: Vec<&ModelPerformance> = state
                .leaderboard
                .list
                .items()
                .iter()
                .enumerate()
                .filter(|(row, _)| state.compare_selection.contains(row))
                .map(|(_, entry)| entry)
                .collect();
            match compare_models(&selected) {
                Ok(rows) => {
                    state.comparison = rows;
                    state.error_message = None;
                }
                Err(e) => state.error_message = Some(e.to_string()),
            }
        }
        Message::ClearComparison => {
            state.compare_selection.clear();
            state.comparison.clear();
        }

        Message::UploadModeSelected(mode) => {
            state.upload.mode = mode;
            state.upload.files.clear();
        }
        Message::UploadDescriptionChanged(description) => {
            state.upload.description = description;
        }
        Message::UploadFolderChanged(folder) => {
            state.upload.folder_name = folder;
        }
        Message::PickUploadFiles => {
            return Task::perform(pick_upload_files(state.upload.mode), Message::UploadFilesPicked);
        }
        Message::UploadFilesPicked(result) => match result {
            Ok(files) => {
                state.display_text = format!("{} file(s) selected", files.len());
                state.upload.files = files;
            }
            Err(error) => state.report("File selection failed", error),
        },
        Message::SubmitUpload => {
            let kind = state.upload_kind;
            state.upload.kind = Some(kind);
            if let Err(e) = state.upload.validate() {
                state.error_message = Some(e.to_string());
                return Task::none();
            }
            state.is_uploading = true;
            state.error_message = None;
            state.display_text = "Uploading…".to_string();

            let client = Arc::clone(&state.client);
            let request = state.upload.clone();
            return Task::perform(
                async move { client.upload(&request).await.map_err(|e| e.to_string()) },
                move |result| Message::UploadFinished(kind, result),
            );
        }
        Message::UploadFinished(kind, result) => {
            state.is_uploading = false;
            match result {
                Ok(()) => {
                    state.display_text = "Uploaded".to_string();
                    let mode = state.upload.mode;
                    state.upload = UploadRequest {
                        mode,
                        ..UploadRequest::new(kind)
                    };
                    let ticket = state.files_view_mut(kind).list.refetch();
                    return state.fetch_files(kind, Some(ticket));
                }
                Err(error) => {
                    state.display_text = "Failed".to_string();
                    state.report("Upload failed", error);
                }
            }
        }

        Message::DownloadRequested {
            relative_path,
            output,
        } => {
            let client = Arc::clone(&state.client);
            state.display_text = format!("Downloading {}...", relative_path);
            return Task::perform(
                async move {
                    let bytes = if output {
                        client.download_output(&relative_path).await
                    } else {
                        client.download_file(&relative_path).await
                    };
                    bytes
                        .map(|bytes| (download_file_name(&relative_path), bytes))
                        .map_err(|e| e.to_string())
                },
                Message::DownloadFetched,
            );
        }
        Message::DownloadFetched(result) => match result {
            Ok((file_name, bytes)) => {
                state.display_text = format!("Downloaded {} bytes - choose where to save", bytes.len());
                state.pending_download = Some(bytes);
                return Task::perform(
                    async move {
                        AsyncFileDialog::new()
                            .set_file_name(file_name)
                            .save_file()
                            .await
                            .map(|handle| handle.path().to_string_lossy().to_string())
                    },
                    Message::DownloadSaved,
                );
            }
            Err(error) => state.report("Download failed", error),
        },
        Message::DownloadSaved(file_path) => {
            let Some(path) = file_path else {
                state.display_text = "Save cancelled.".to_string();
                state.pending_download = None;
                return Task::none();
            };
            match state.pending_download.take() {
                Some(bytes) => match std::fs::write(&path, bytes) {
                    Ok(_) => {
                        state.display_text = format!("Saved to: {}", path);
                        state.error_message = None;
                    }
                    Err(e) => state.report("Failed to save download", e.to_string()),
                },
                None => state.error_message = Some("No download to save!".to_string()),
            }
        }
    }
    Task::none()
}

fn short_timestamp(value: Option<&str>) -> String {
    let Some(raw) = value else {
        return "N/A".to_string();
    };
    let Some(parsed) = parse_timestamp(raw) else {
        return raw.to_string();
    };
    time::format_description::parse("[year]-[month]-[day] [hour]:[minute]")
        .ok()
        .and_then(|format| parsed.format(&format).ok())
        .unwrap_or_else(|| raw.to_string())
}

fn cell<'a>(content: impl ToString) -> Element<'a, Message> {
    text(content.to_string())
        .size(14)
        .width(Length::Fixed(COLUMN_WIDTH))
        .into()
}

fn login_view(state: &AppState) -> Element<'_, Message> {
    let mut submit = button(if state.is_logging_in { "Signing in..." } else { "Login" }).padding(10);
    if !state.is_logging_in {
        submit = submit.on_press(Message::SubmitLogin);
    }

    let mut form = column![
        text("Login").size(24),
        text_input("Username", &state.username)
            .on_input(Message::UsernameChanged)
            .padding(8),
        text_input("Password", &state.password)
            .on_input(Message::PasswordChanged)
            .on_submit(Message::SubmitLogin)
            .secure(true)
            .padding(8),
        submit,
    ]
    .spacing(12)
    .width(Length::Fixed(300.0));

    if let Some(error) = &state.error_message {
        form = form.push(text(error.as_str()).color(iced::Color::from_rgb(0.8, 0.1, 0.1)));
    }

    container(form)
        .center_x(Length::Fill)
        .padding(100)
        .into()
}

fn workflows_view(state: &AppState) -> Element<'_, Message> {
    let list = &state.workflows.list;
    let order_label = match list.sort().map(|s| s.order).unwrap_or_default() {
        SortOrder::Asc => "▲",
        SortOrder::Desc => "▼",
    };

    let toolbar = row![
        text_input(WORKFLOW_SEARCH_PLACEHOLDER, &state.workflows.search)
            .on_input(|term| Message::WorkflowList(ListEvent::SearchChanged(term)))
            .width(Length::Fixed(250.0)),
        pick_list(
            list.creator_options(),
            list.filter("created_by").map(str::to_string),
            Message::CreatorSelected,
        )
        .placeholder("Filter by creator"),
        button("All creators").on_press_maybe(
            list.filter("created_by").is_some().then_some(Message::ClearCreator)
        ),
        pick_list(
            WorkflowSortKey::ALL.to_vec(),
            Some(state.sort_key),
            Message::SortKeySelected,
        ),
        button(order_label).on_press(Message::ToggleSortOrder),
        button("Refresh").on_press(Message::WorkflowList(ListEvent::Refresh)),
    ]
    .spacing(10);

    let body = list_body(list, "No workflows found.", |_, wf| {
        let name = if wf.pinned {
            format!("📌 {}", wf.name)
        } else {
            wf.name.clone()
        };
        column![
            row![
                cell(name),
                cell(wf.description.as_deref().unwrap_or("")),
                cell(&wf.created_by),
                cell(short_timestamp(wf.created_at.as_deref())),
                button("Execute").on_press(Message::ExecuteWorkflow(wf.id)),
                button(if wf.pinned { "Unpin" } else { "Pin" })
                    .on_press(Message::PinWorkflow(wf.id)),
                button("Delete").on_press(Message::DeleteRequested {
                    kind: ResourceKind::Workflows,
                    id: wf.id,
                    is_folder: false,
                }),
            ]
            .spacing(10),
            text(pipeline_graph(wf).chain_label()).size(12),
        ]
        .spacing(2)
        .into()
    });

    column![
        text("Workflows").size(22),
        toolbar,
        body,
        list_footer(list, &state.config.page_size_options, Message::WorkflowList),
    ]
    .spacing(12)
    .into()
}

fn run_details_view(details: &RunDetails) -> Element<'_, Message> {
    let run = &details.run;
    let mut panel = column![
        row![
            text(format!(
                "Run {}: {}",
                run.id,
                run.workflow.as_ref().map(|w| w.name.as_str()).unwrap_or("N/A")
            ))
            .size(18),
            button("Close").on_press(Message::CloseRunDetails),
        ]
        .spacing(10),
        text(format!(
            "Status: {}   Time to run: {}",
            run.status(),
            format_run_duration(run.start_time.as_deref(), run.end_time.as_deref())
        ))
        .size(14),
    ]
    .spacing(6);

    if let Some(workflow) = &run.workflow {
        panel = panel.push(text(pipeline_graph(workflow).chain_label()).size(12));
        for (i, step) in workflow.steps.iter().enumerate() {
            let output = step.result_file.clone();
            panel = panel.push(
                row![
                    cell(format!("Step {}", i + 1)),
                    cell(output.as_deref().unwrap_or("N/A")),
                    button("Download").on_press_maybe(output.map(|relative_path| {
                        Message::DownloadRequested {
                            relative_path,
                            output: true,
                        }
                    })),
                ]
                .spacing(10),
            );
        }
    }

    if !details.performance.is_empty() {
        panel = panel.push(text("Model performance").size(16));
        for entry in &details.performance {
            panel = panel.push(
                row![cell(entry.model_name()), cell(format!("{:.4}", entry.accuracy))].spacing(10),
            );
        }
    }

    container(panel).padding(10).into()
}

fn results_view(state: &AppState) -> Element<'_, Message> {
    let can_manage = state.can_manage_assets();
    let list = &state.runs.list;

    let body = list_body(list, "No results found.", move |_, run| {
        let workflow = run.workflow.as_ref();
        let duration = match run.status() {
            RunStatus::InProgress => "In progress".to_string(),
            _ => format_run_duration(run.start_time.as_deref(), run.end_time.as_deref()),
        };
        row![
            cell(workflow.map(|w| w.name.as_str()).unwrap_or("")),
            cell(
                workflow
                    .and_then(|w| w.input.as_ref())
                    .and_then(|input| input.name.as_deref())
                    .unwrap_or("N/A")
            ),
            cell(run.status()),
            cell(short_timestamp(workflow.and_then(|w| w.created_at.as_deref()))),
            cell(workflow.map(|w| w.created_by.as_str()).unwrap_or("")),
            cell(duration),
            button("View").on_press(Message::ShowRun(run.id)),
            button("Delete").on_press_maybe(can_manage.then_some(Message::DeleteRequested {
                kind: ResourceKind::Runs,
                id: run.id,
                is_folder: false,
            })),
        ]
        .spacing(10)
        .into()
    });

    let mut page = column![
        row![
            text("Results").size(22),
            button("Refresh").on_press(Message::RunList(ListEvent::Refresh)),
        ]
        .spacing(20),
    ]
    .spacing(12);
    if let Some(details) = &state.run_details {
        page = page.push(run_details_view(details));
    }
    page.push(body)
        .push(list_footer(list, &state.config.page_size_options, Message::RunList))
        .into()
}

fn leaderboard_view(state: &AppState) -> Element<'_, Message> {
    let list = &state.leaderboard.list;

    let body = list_body(list, "No leaderboard entries found.", move |index, entry| {
        let selected = state.compare_selection.contains(&index);
        let size = entry
            .model()
            .and_then(AssetFile::size_mb)
            .map(|mb| format!("{:.2} MB", mb))
            .unwrap_or_else(|| "N/A".to_string());
        row![
            cell(list.row_number(index)),
            cell(entry.model_name()),
            cell(format!("{:.4}", entry.accuracy)),
            cell(size),
            cell(&entry.workflow_run.run_by),
            button(if selected { "Selected" } else { "Select" })
                .on_press(Message::ToggleCompare(index)),
        ]
        .spacing(10)
        .into()
    });

    let mut page = column![
        row![
            text("Leaderboard").size(22),
            button("Compare").on_press_maybe(
                (state.compare_selection.len() >= flowdash_core::metrics::MIN_COMPARISON_ENTRIES)
                    .then_some(Message::Compare)
            ),
            button("Refresh").on_press(Message::LeaderboardList(ListEvent::Refresh)),
        ]
        .spacing(20),
        body,
        list_footer(list, &state.config.page_size_options, Message::LeaderboardList),
    ]
    .spacing(12);

    if !state.comparison.is_empty() {
        let mut table = column![
            row![
                text("Model Comparison").size(16),
                button("Clear").on_press(Message::ClearComparison),
            ]
            .spacing(10)
        ]
        .spacing(4);
        for model in &state.comparison {
            table = table.push(
                row![
                    cell(&model.model_name),
                    cell(format!("{:.4}", model.accuracy)),
                    cell(model.size_label()),
                    cell(
                        model
                            .seconds_taken
                            .map(|s| format!("{:.1} s", s))
                            .unwrap_or_else(|| "N/A".to_string())
                    ),
                ]
                .spacing(10),
            );
        }
        page = page.push(table);
    }

    page.into()
}

fn upload_form(state: &AppState) -> Element<'_, Message> {
    let kind = state.upload_kind;
    let mut form = column![text(format!("Upload {} files", kind)).size(16)].spacing(8);

    if kind == UploadKind::Input {
        form = form.push(
            row![
                button("File").on_press_maybe(
                    (state.upload.mode != UploadMode::File)
                        .then_some(Message::UploadModeSelected(UploadMode::File))
                ),
                button("Folder").on_press_maybe(
                    (state.upload.mode != UploadMode::Folder)
                        .then_some(Message::UploadModeSelected(UploadMode::Folder))
                ),
            ]
            .spacing(6),
        );
        if state.upload.mode == UploadMode::Folder {
            form = form.push(
                text_input("Folder name", &state.upload.folder_name)
                    .on_input(Message::UploadFolderChanged)
                    .width(Length::Fixed(300.0)),
            );
        }
    }

    form.push(
        text_input("Description", &state.upload.description)
            .on_input(Message::UploadDescriptionChanged)
            .width(Length::Fixed(300.0)),
    )
    .push(
        row![
            button(if state.upload.mode == UploadMode::Folder {
                "Choose folder..."
            } else {
                "Choose files..."
            })
            .on_press(Message::PickUploadFiles),
            text(format!("{} file(s) selected", state.upload.files.len())).size(14),
            button(if state.is_uploading { "Uploading…" } else { "Upload" })
                .on_press_maybe((!state.is_uploading).then_some(Message::SubmitUpload)),
        ]
        .spacing(10),
    )
    .into()
}

fn uploads_view(state: &AppState) -> Element<'_, Message> {
    let kind = state.upload_kind;
    let can_manage = state.can_manage_assets();
    let view = state.files_view(kind);
    let on_event = move |event| Message::FileList(kind, event);

    let kinds = UploadKind::ALL.into_iter().fold(row![].spacing(6), |bar, k| {
        bar.push(button(text(k.label())).on_press_maybe((k != kind).then_some(Message::UploadKindSelected(k))))
    });

    let body = list_body(&view.list, "No files found.", move |_, file| {
        let path = file.display_path().map(str::to_string);
        row![
            cell(file.display_name()),
            cell(file.description.as_deref().unwrap_or("")),
            cell(
                file.size_mb()
                    .map(|mb| format!("{:.2} MB", mb))
                    .unwrap_or_default()
            ),
            cell(short_timestamp(file.uploaded_at.as_deref())),
            button("Download").on_press_maybe(path.filter(|_| can_manage).map(|relative_path| {
                Message::DownloadRequested {
                    relative_path,
                    output: false,
                }
            })),
            button("Delete").on_press_maybe(can_manage.then_some(Message::DeleteRequested {
                kind: ResourceKind::Files(kind),
                id: file.id,
                is_folder: file.is_folder(),
            })),
        ]
        .spacing(10)
        .into()
    });

    column![
        text("Uploads").size(22),
        kinds,
        upload_form(state),
        row![
            text_input(FILE_SEARCH_PLACEHOLDER, &view.search)
                .on_input(move |term| on_event(ListEvent::SearchChanged(term)))
                .width(Length::Fixed(250.0)),
            button("Refresh").on_press(on_event(ListEvent::Refresh)),
        ]
        .spacing(10),
        body,
        list_footer(&view.list, &state.config.page_size_options, on_event),
    ]
    .spacing(12)
    .into()
}

fn status_line(state: &AppState) -> Element<'_, Message> {
    let last_call = state
        .client
        .call_history()
        .last()
        .map(|call| format!("Last call: {} {} → {}", call.method, call.url, call.status_code))
        .unwrap_or_default();

    let mut line = column![text(state.display_text.as_str()).size(14), text(last_call).size(12)].spacing(4);
    if let Some(error) = &state.error_message {
        line = line.push(
            text(format!("Error: {}", error))
                .size(14)
                .color(iced::Color::from_rgb(0.8, 0.1, 0.1)),
        );
    }
    line.into()
}

pub fn view(state: &AppState) -> Element<'_, Message> {
    if !state.is_signed_in() {
        return login_view(state);
    }

    let tabs = Tab::ALL.into_iter().fold(row![].spacing(8), |bar, tab| {
        bar.push(
            button(tab.label())
                .on_press_maybe((tab != state.tab).then_some(Message::TabSelected(tab)))
                .padding(8),
        )
    });
    let user_label = state
        .user
        .as_ref()
        .map(|user| match &user.role {
            Some(role) => format!("{} ({})", user.username, role),
            None => user.username.clone(),
        })
        .unwrap_or_default();

    let header = row![tabs, text(user_label).size(14), button("Logout").on_press(Message::Logout)]
        .spacing(20);

    let content = match state.tab {
        Tab::Workflows => workflows_view(state),
        Tab::Results => results_view(state),
        Tab::Leaderboard => leaderboard_view(state),
        Tab::Uploads => uploads_view(state),
    };

    column![header, content, status_line(state)]
        .spacing(15)
        .padding(20)
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowdash_core::MemoryTokenStore;

    fn offline_state() -> AppState {
        let config = DashboardConfig::default();
        let client = ApiClient::new(&config, Arc::new(MemoryTokenStore::new())).unwrap();
        AppState::new(Arc::new(client), config)
    }

    fn entry(accuracy: f64) -> ModelPerformance {
        // The backend may leave ids out, so every entry shares id 0.
        ModelPerformance {
            accuracy,
            ..Default::default()
        }
    }

    fn load_leaderboard(state: &mut AppState, entries: Vec<ModelPerformance>) {
        let ticket = state.leaderboard.list.refetch();
        let _ = update(state, Message::LeaderboardLoaded(ticket, Ok(RawListResponse::Flat(entries))));
    }

    #[test]
    fn test_leaderboard_is_ranked_best_first() {
        let mut state = offline_state();
        load_leaderboard(&mut state, vec![entry(0.2), entry(0.9), entry(0.5)]);
        let accuracies: Vec<f64> = state.leaderboard.list.items().iter().map(|e| e.accuracy).collect();
        assert_eq!(accuracies, vec![0.9, 0.5, 0.2]);
    }

    #[test]
    fn test_compare_selects_rows_not_ids() {
        let mut state = offline_state();
        load_leaderboard(&mut state, vec![entry(0.2), entry(0.9), entry(0.5)]);

        let _ = update(&mut state, Message::ToggleCompare(0));
        let _ = update(&mut state, Message::ToggleCompare(2));
        let _ = update(&mut state, Message::Compare);
        let accuracies: Vec<f64> = state.comparison.iter().map(|row| row.accuracy).collect();
        assert_eq!(accuracies, vec![0.9, 0.2]);

        let _ = update(&mut state, Message::ToggleCompare(2));
        assert_eq!(state.compare_selection, vec![0]);
    }

    #[test]
    fn test_leaderboard_refresh_shows_loading_and_clears_selection() {
        let mut state = offline_state();
        load_leaderboard(&mut state, vec![entry(0.2), entry(0.9)]);
        let _ = update(&mut state, Message::ToggleCompare(1));

        let _ = update(&mut state, Message::LeaderboardList(ListEvent::Refresh));
        assert!(state.leaderboard.list.is_loading());

        load_leaderboard(&mut state, vec![entry(0.4)]);
        assert!(state.compare_selection.is_empty());
        assert_eq!(state.leaderboard.list.items().len(), 1);
    }
}
