use heartline::args::TopLevelCmd;
use heartline::{run_headless, run_tui, AppResult};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> AppResult<()> {
    let arg_config: TopLevelCmd = argh::from_env();

    if arg_config.headless {
        let parent_token = CancellationToken::new();
        let ctrl_c_token = parent_token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c_token.cancel();
            }
        });
        run_headless(arg_config, parent_token).await?;
        Ok(())
    } else {
        run_tui(arg_config).await
    }
}
