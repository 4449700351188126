use clap::Parser;
use typst_gateway::{logging, Cli};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(cli.verbose);

    typst_gateway::run(cli).await
}
