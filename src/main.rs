use texchain::{AppConfig, LoggingConfig, init_logging, run};

fn main() {
    init_logging(LoggingConfig::default());

    if let Err(err) = run(AppConfig::new().title("texchain fluid field")) {
        log::error!("{err}");
        std::process::exit(1);
    }
}
