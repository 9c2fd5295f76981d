mod application;
mod presentation;

use snaphold_core::error::Result;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let code = application::run()?;
    std::process::exit(code);
}
