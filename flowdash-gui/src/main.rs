mod app;
mod list_view;

fn init_logging() {
    // RUST_LOG overrides, e.g. RUST_LOG=flowdash_core::list_controller=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowdash_core=info,flowdash_gui=info".into()),
        )
        .init();
}

fn main() -> iced::Result {
    init_logging();

    let (client, config) = match app::connect() {
        Ok(connection) => connection,
        Err(e) => {
            eprintln!("Failed to start dashboard: {}", e);
            std::process::exit(1);
        }
    };
    log::info!("Using backend at {}", client.base_url());

    iced::application("flowdash", app::update, app::view)
        .run_with(move || app::initialize(client, config))
}
