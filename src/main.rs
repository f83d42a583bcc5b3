// src/main.rs

use assetdag::cli::Command;
use assetdag::{cli, logging, run};

/// Exit status of `build` when some planned task did not succeed.
const EXIT_BUILD_FAILED: i32 = 2;

#[tokio::main]
async fn main() {
    let code = match run_main().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("assetdag error: {err:?}");
            1
        }
    };
    std::process::exit(code);
}

async fn run_main() -> anyhow::Result<i32> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;

    let one_shot = matches!(args.command, Command::Build(_));
    let summary = run(args).await?;

    // Failed rebuilds in watch mode are reported as they happen; an
    // interrupted watch session still exits cleanly.
    if one_shot && !summary.all_succeeded() {
        Ok(EXIT_BUILD_FAILED)
    } else {
        Ok(0)
    }
}
