//! send-mail - Entry Point

#[tokio::main]
async fn main() -> eyre::Result<()> {
    send_mail::run().await
}
