#[cfg(feature = "server")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    innovaforge::server::run().await
}
