use crate::{LoadArgs, config::SinkConfig, pipeline::Loader, sinks::postgres::PostgresSink};
use anyhow::Result;
use tracing::info;

pub async fn run(args: LoadArgs) -> Result<()> {
    let config = SinkConfig::from(&args);
    let sink = PostgresSink::connect(&config).await?;

    // The sink (and with it the connection) is dropped when the loader goes
    // out of scope, on success and on error alike.
    let mut loader = Loader::new(sink);
    let report = loader.run(&args.data_dir).await?;

    info!(
        "Load finished: {} files found, {} loaded, {} skipped, {} failed, {} rows committed",
        report.files_found,
        report.files_loaded,
        report.files_skipped,
        report.files_failed,
        report.rows_committed
    );
    Ok(())
}
