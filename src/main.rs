use clap::Parser;

mod args;
use args::Args;

#[tokio::main]
async fn main() {
    // Initialize logging, `info` unless RUST_LOG says otherwise
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command-line arguments
    let args = Args::parse();

    let bundler = match args.into_bundler() {
        Ok(bundler) => bundler,
        Err(e) => {
            ::log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    ::log::info!("Bundling fragments of {}", bundler.config().url);
    let start_time = std::time::Instant::now();

    match bundler.run().await {
        Ok(report) => {
            ::log::info!(
                "Bundled {} fragments, {} of {} CSS rules kept, {} images and {} fonts copied in {:.2} seconds",
                report.fragments,
                report.rules_after,
                report.rules_before,
                report.images_copied.len(),
                report.fonts_copied,
                start_time.elapsed().as_secs_f64()
            );
            if !report.images_skipped.is_empty() {
                ::log::warn!(
                    "Images referenced but not mirrored: {}",
                    report.images_skipped.join(", ")
                );
            }
        }
        Err(e) => {
            ::log::error!("Bundling failed: {}", e);
            std::process::exit(1);
        }
    }
}
