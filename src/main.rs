use anyhow::Result;
use clap::Parser;
use gramps_chat::cli::App;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let app = App::parse();
    app.init_tracing();
    app.run().await
}
