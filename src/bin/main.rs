use asterstudy::{cli, config, telemetry};

fn main() {
    let cli = cli::parse_from(std::env::args_os());
    let cfg = config::load_or_default(Some(&cli.study_dir()));

    let telemetry_cfg = telemetry::TelemetryConfig::new(cli.verbose, cfg.logging.clone());
    let _telemetry_guard = telemetry::init(telemetry_cfg);

    if let Err(e) = cli::run(cli, cfg) {
        tracing::error!("error: {}", e);
        std::process::exit(1);
    }
}
