use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    pop_verifier::app::run().await
}
