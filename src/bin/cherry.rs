use anyhow::Result;
use cherry_security::{AppContext, config::Settings, run};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    let ctx: Arc<AppContext> = AppContext::bootstrap(settings).await?;
    run(ctx).await
}
