use clap::{Args, Parser, Subcommand, ValueEnum};
use flowdash_core::{
    ApiClient, AssetFile, DashboardConfig, FileTokenStore, LEADERBOARD_SORT_KEY, ListItem,
    ListSource, LocalQuery,
    ModelPerformance, PageToken, PagedListController, ResourceKind, ResourceSource, SortOrder,
    UploadKind, UploadMode, UploadPart, UploadRequest, Workflow, WorkflowRun, compare_models,
    download_file_name, format_run_duration, pipeline_graph,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// Largest page requested when a command needs a whole collection.
const FULL_PAGE_SIZE: usize = 1000;

#[derive(Parser)]
#[command(name = "flowdash-cli")]
#[command(about = "Command line access to the ML workflow dashboard")]
struct Cli {
    /// Print the HTTP calls made by this command when it finishes
    #[arg(long, global = true)]
    show_calls: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Resource {
    Workflows,
    Runs,
    Leaderboard,
    Files,
}

#[derive(Args)]
struct ListArgs {
    /// Page to show (clamped to the available pages)
    #[arg(short, long, default_value = "1")]
    page: usize,
    /// Rows per page (defaults to the configured page size)
    #[arg(long)]
    page_size: Option<usize>,
    /// Search term
    #[arg(short, long)]
    search: Option<String>,
    /// Only workflows created by this user
    #[arg(long)]
    creator: Option<String>,
    /// Sort key for workflows, e.g. created_at or name
    #[arg(long, default_value = "created_at")]
    sort: String,
    /// Sort order, asc or desc
    #[arg(long, default_value = "desc")]
    order: SortOrder,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session tokens
    Login {
        #[arg(short, long)]
        username: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List one page of a resource
    List {
        resource: Resource,
        /// Kind of uploaded file, for `files`
        #[arg(short, long, default_value = "input")]
        kind: UploadKind,
        #[command(flatten)]
        args: ListArgs,
    },
    /// Delete a workflow, run or uploaded file
    Delete {
        resource: Resource,
        id: u64,
        /// Kind of uploaded file, for `files`
        #[arg(short, long, default_value = "input")]
        kind: UploadKind,
        /// The input is a folder
        #[arg(long)]
        folder: bool,
    },
    /// Start a workflow run
    Execute { id: u64 },
    /// Toggle the pinned flag of a workflow
    Pin { id: u64 },
    /// Print the pipeline of a workflow
    Graph { id: u64 },
    /// Compare leaderboard entries side by side, by their rank in `list leaderboard`
    Compare {
        #[arg(required = true, num_args = 2..)]
        ranks: Vec<usize>,
    },
    /// Download an uploaded file or a run output
    Download {
        relative_path: String,
        /// Download from run outputs instead of uploads
        #[arg(long)]
        run_output: bool,
        /// Where to save (defaults to the file name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Upload files of one kind
    Upload {
        #[arg(short, long)]
        kind: UploadKind,
        /// Upload the files as one input folder with this name
        #[arg(long)]
        folder: Option<String>,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn connect() -> Result<(Arc<ApiClient>, DashboardConfig), Box<dyn std::error::Error>> {
    let config = DashboardConfig::load()?;
    let credentials = Arc::new(FileTokenStore::new()?);
    let client = ApiClient::new(&config, credentials)?;
    log::debug!("Using backend at {}", client.base_url());
    Ok((Arc::new(client), config))
}

fn read_password() -> io::Result<String> {
    print!("Password: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn nav_line<T>(list: &PagedListController<T>) -> String {
    let nav = list.nav();
    let tokens = nav
        .tokens
        .iter()
        .map(|token| match token {
            PageToken::Page(page) if *page == nav.current_page => format!("[{}]", page),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ");
    format!("{}  {}  ({} total)", nav.status_text(), tokens, list.total_count())
}

async fn load_page<T, S>(
    source: &S,
    args: &ListArgs,
    mut list: PagedListController<T>,
    with_query: bool,
) -> PagedListController<T>
where
    T: ListItem + LocalQuery,
    S: ListSource<T>,
{
    if with_query {
        list = list.with_sort(args.sort.clone(), args.order);
        list.set_filter("created_by", args.creator.clone());
    }
    list.set_filter("q", args.search.clone());

    list.refresh(source).await;
    if args.page > 1 {
        if let Some(ticket) = list.set_page(args.page) {
            list.load(ticket, source).await;
        }
    }
    list
}

fn exit_on_failure<T>(list: &PagedListController<T>) {
    if let Some(message) = list.error_message() {
        eprintln!("Failed to load: {}", message);
        std::process::exit(1);
    }
}

fn print_workflows(list: &PagedListController<Workflow>) {
    for wf in list.items() {
        println!(
            "{:>5}  {}{}  by {}  {}",
            wf.id,
            if wf.pinned { "[pinned] " } else { "" },
            wf.name,
            wf.created_by,
            wf.created_at.as_deref().unwrap_or("")
        );
    }
}

fn print_runs(list: &PagedListController<WorkflowRun>) {
    for run in list.items() {
        let name = run.workflow.as_ref().map(|w| w.name.as_str()).unwrap_or("N/A");
        println!(
            "{:>5}  {}  {}  {}",
            run.id,
            name,
            run.status(),
            format_run_duration(run.start_time.as_deref(), run.end_time.as_deref())
        );
    }
}

fn leaderboard_list(page_size: usize) -> PagedListController<ModelPerformance> {
    PagedListController::new(page_size).with_sort(LEADERBOARD_SORT_KEY, SortOrder::Desc)
}

fn print_leaderboard(list: &PagedListController<ModelPerformance>) {
    for (index, entry) in list.items().iter().enumerate() {
        println!(
            "#{:<4}  {}  accuracy {:.4}  run by {}",
            list.row_number(index),
            entry.model_name(),
            entry.accuracy,
            entry.workflow_run.run_by
        );
    }
}

fn print_files(list: &PagedListController<AssetFile>) {
    for file in list.items() {
        let size = file
            .size_mb()
            .map(|mb| format!("{:.2} MB", mb))
            .unwrap_or_default();
        println!(
            "{:>5}  {}{}  {}  {}",
            file.id,
            file.display_name(),
            if file.is_folder() { "/" } else { "" },
            size,
            file.description.as_deref().unwrap_or("")
        );
    }
}

async fn read_upload_parts(paths: &[PathBuf]) -> io::Result<Vec<UploadPart>> {
    let mut parts = Vec::with_capacity(paths.len());
    for path in paths {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        parts.push(UploadPart {
            file_name,
            bytes: tokio::fs::read(path).await?,
        });
    }
    Ok(parts)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let (client, config) = connect()?;

    match cli.command {
        Commands::Login { username, password } => {
            let password = match password {
                Some(password) => password,
                None => read_password()?,
            };
            match client.login(&username, &password).await {
                Ok(user) => println!(
                    "Logged in as {} ({})",
                    user.username,
                    user.role.as_deref().unwrap_or("no role")
                ),
                Err(e) => {
                    eprintln!("Login failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Logout => {
            client.logout()?;
            println!("Logged out.");
        }
        Commands::Whoami => match client.current_user().await {
            Ok(user) => println!(
                "{} ({})",
                user.username,
                user.role.as_deref().unwrap_or("no role")
            ),
            Err(e) => {
                eprintln!("Not signed in: {}", e);
                std::process::exit(1);
            }
        },
        Commands::List {
            resource,
            kind,
            args,
        } => {
            let page_size = args.page_size.unwrap_or(config.default_page_size);
            let client = Arc::clone(&client);
            let nav = match resource {
                Resource::Workflows => {
                    let list = load_page(
                        &ResourceSource::workflows(client),
                        &args,
                        PagedListController::new(page_size),
                        true,
                    )
                    .await;
                    exit_on_failure(&list);
                    print_workflows(&list);
                    nav_line(&list)
                }
                Resource::Runs => {
                    let list = load_page(
                        &ResourceSource::runs(client),
                        &args,
                        PagedListController::new(page_size),
                        false,
                    )
                    .await;
                    exit_on_failure(&list);
                    print_runs(&list);
                    nav_line(&list)
                }
                Resource::Leaderboard => {
                    let list = load_page(
                        &ResourceSource::leaderboard(client),
                        &args,
                        leaderboard_list(page_size),
                        false,
                    )
                    .await;
                    exit_on_failure(&list);
                    print_leaderboard(&list);
                    nav_line(&list)
                }
                Resource::Files => {
                    let list = load_page(
                        &ResourceSource::files(client, kind),
                        &args,
                        PagedListController::new(page_size),
                        false,
                    )
                    .await;
                    exit_on_failure(&list);
                    print_files(&list);
                    nav_line(&list)
                }
            };
            println!("{}", nav);
        }
        Commands::Delete {
            resource,
            id,
            kind,
            folder,
        } => {
            let target = match resource {
                Resource::Workflows => ResourceKind::Workflows,
                Resource::Runs => ResourceKind::Runs,
                Resource::Leaderboard => ResourceKind::Leaderboard,
                Resource::Files => ResourceKind::Files(kind),
            };
            if let Err(e) = client.delete_item(target, id, folder).await {
                eprintln!("Delete failed: {}", e);
                std::process::exit(1);
            }
            println!("Deleted {} {}", target, id);
        }
        Commands::Execute { id } => {
            client.execute_workflow(id).await?;
            println!("Workflow {} executed!", id);
        }
        Commands::Pin { id } => {
            client.pin_workflow(id).await?;
            println!("Toggled pin on workflow {}", id);
        }
        Commands::Graph { id } => {
            let workflow = client.get_workflow(id).await?;
            let graph = pipeline_graph(&workflow);
            println!("{}", workflow.name);
            for node in &graph.nodes {
                println!("  [{}] {}", node.id, node.label.replace('\n', " | "));
            }
            println!("{}", graph.chain_label());
        }
        Commands::Compare { ranks } => {
            let args = ListArgs {
                page: 1,
                page_size: Some(FULL_PAGE_SIZE),
                search: None,
                creator: None,
                sort: String::new(),
                order: SortOrder::default(),
            };
            let source = ResourceSource::leaderboard(Arc::clone(&client));
            let list = load_page(&source, &args, leaderboard_list(FULL_PAGE_SIZE), false).await;
            exit_on_failure(&list);

            let selected: Vec<&ModelPerformance> = list
                .items()
                .iter()
                .enumerate()
                .filter(|(index, _)| ranks.contains(&list.row_number(*index)))
                .map(|(_, entry)| entry)
                .collect();
            match compare_models(&selected) {
                Ok(rows) => {
                    println!("{:<30} {:>10} {:>12} {:>10}", "Model", "Accuracy", "Size", "Seconds");
                    for row in rows {
                        println!(
                            "{:<30} {:>10.4} {:>12} {:>10}",
                            row.model_name,
                            row.accuracy,
                            row.size_label(),
                            row.seconds_taken
                                .map(|s| format!("{:.1}", s))
                                .unwrap_or_else(|| "N/A".to_string())
                        );
                    }
                }
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Download {
            relative_path,
            run_output,
            output,
        } => {
            let bytes = if run_output {
                client.download_output(&relative_path).await?
            } else {
                client.download_file(&relative_path).await?
            };
            let output = output.unwrap_or_else(|| PathBuf::from(download_file_name(&relative_path)));
            tokio::fs::write(&output, &bytes).await?;
            println!("Saved {} bytes to {}", bytes.len(), output.display());
        }
        Commands::Upload {
            kind,
            folder,
            description,
            files,
        } => {
            let mode = if folder.is_some() {
                UploadMode::Folder
            } else {
                UploadMode::File
            };
            let request = UploadRequest {
                mode,
                description,
                folder_name: folder.unwrap_or_default(),
                files: read_upload_parts(&files).await?,
                ..UploadRequest::new(kind)
            };
            match client.upload(&request).await {
                Ok(()) => println!("Uploaded {} file(s) as {}", request.files.len(), kind),
                Err(e) => {
                    eprintln!("Upload failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }

    if cli.show_calls {
        for call in client.call_history() {
            println!(
                "{} {} {} -> {}{}",
                call.timestamp,
                call.method,
                call.url,
                call.status_code,
                if call.success { "" } else { " (failed)" }
            );
        }
    }

    Ok(())
}
