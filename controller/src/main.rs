mod actuator;
mod advisory;
mod host;
mod optimizer;
mod readings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
