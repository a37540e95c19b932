use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .try_init();

    let args: Vec<String> = std::env::args().collect();
    if gaze_app::cli::handle_commands(&args)? {
        return Ok(());
    }

    gaze_app::cli::print_usage();
    Ok(())
}
