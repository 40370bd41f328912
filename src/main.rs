#[tokio::main]
async fn main() -> anyhow::Result<()> {
    edgebuild::bootstrapper::run().await
}
