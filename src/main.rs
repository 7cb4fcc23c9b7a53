#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = prephall_rust::run().await {
        eprintln!("prephall-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
