use anyhow::Result;
use clap::Parser;
use pipeline_engine::cli::{execute_run, Cli, Commands, RunOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            tasks,
            workers,
            queue_capacity,
            result_capacity,
            fan_in,
            policy,
            stage_failure_policy,
            stages,
            fail_every,
            panic_every,
            work_ms,
            cancel_after_ms,
            config,
            quiet,
        } => {
            let options = RunOptions {
                tasks,
                workers,
                queue_capacity,
                result_capacity,
                fan_in,
                policy,
                stage_failure_policy,
                stages,
                fail_every,
                panic_every,
                work_ms,
                cancel_after_ms,
                config,
                quiet,
            };
            if let Err(error) = execute_run(options).await {
                eprintln!("❌ エラー: {error:#}");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
