#[tokio::main]
async fn main() -> anyhow::Result<()> {
    coin_catalog_lib::run().await
}
