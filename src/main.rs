use cvdctl::logging::{self, LogFormat};

fn main() -> anyhow::Result<()> {
    let format = if std::env::var("CVD_LOG_JSON").is_ok() {
        LogFormat::Json
    } else {
        LogFormat::Human
    };
    logging::init(format);

    if let Err(e) = cvd_cli::run() {
        cvd_cli::ui::error(&e.to_string());
        std::process::exit(1);
    }
    Ok(())
}
