use clap::Parser;
use color_eyre::Result;
use rowpager_lib::error_display::user_message_from_report;
use rowpager_lib::{
    logging, open_source, run, source, AppConfig, Args, ConfigManager, OpenOptions, APP_NAME,
};

/// Handles flags that do their work and exit without opening the TUI.
fn handle_early_exit_flags(args: &Args) -> Result<Option<()>> {
    if args.generate_config {
        let manager = ConfigManager::new(APP_NAME)?;
        let path = manager.write_default_config(args.force)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(Some(()));
    }
    Ok(None)
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(()) = handle_early_exit_flags(&args)? {
        return Ok(());
    }

    color_eyre::install()?;

    let config = AppConfig::load(APP_NAME)?;
    let opts = OpenOptions::from_args_and_config(&args, &config);
    opts.validate()?;

    let log_path = logging::init(&config.logging, opts.log_level.as_deref(), APP_NAME)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting {}", APP_NAME);

    let data_source = source::resolve_sources(&args.sources, config.source.base_url.as_deref())?;
    let page_source = match open_source(&data_source, &opts) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to open source");
            eprintln!("Error: {}", user_message_from_report(&e, None));
            std::process::exit(1);
        }
    };

    let result = run(page_source, opts, &config);
    if let Err(e) = result {
        tracing::error!(error = %e, "exited with error");
        eprintln!("Error: {}", e);
        eprintln!("See {} for details.", log_path.display());
        std::process::exit(1);
    }
    Ok(())
}
