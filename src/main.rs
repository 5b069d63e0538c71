#[tokio::main]
async fn main() -> anyhow::Result<()> {
    minecraft_server_manager_lib::run().await
}
