//! appsleuth CLI

// The report goes to stdout
#![allow(clippy::print_stdout, clippy::print_stderr)]

use appsleuth::cli::{self, Cli};
use appsleuth::tracing::{TracingConfig, init_tracing};
use appsleuth::{FactStore, Resolver, RunContext};
use miette::IntoDiagnostic;

fn main() -> miette::Result<()> {
    let cli = cli::parse();
    init_tracing(TracingConfig {
        format: cli.log_format,
        level: cli.log_level.into(),
        filter: None,
    })?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> miette::Result<()> {
    let ctx = RunContext::new(cli.run_config())?;
    let resolver = Resolver::new(ctx);

    let mut facts = FactStore::new();
    let outcome = resolver.resolve_into(&mut facts, &cli.input).await;

    let report = cli::render(&facts, cli.format).into_diagnostic()?;
    println!("{report}");

    outcome?;
    Ok(())
}
