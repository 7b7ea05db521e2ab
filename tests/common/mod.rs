use heartline::args::TopLevelCmd;
use heartline::run_headless;
use tokio_util::sync::CancellationToken;

// The app gets its own multi-threaded runtime, since the sinks
// park a blocking thread that a test runtime would share.
#[allow(dead_code)]
pub fn headless_thread(
    arg_config: TopLevelCmd,
    parent_token: CancellationToken,
) -> Result<(), heartline::errors::AppError> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
        .block_on(async move {
            run_headless(arg_config, parent_token).await?;
            Ok(())
        })
}
