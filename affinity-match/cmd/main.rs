use affinity_match::service::ApplicationBootstrap;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1);
    ApplicationBootstrap::run(config_path.as_deref()).await
}
