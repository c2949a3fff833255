//! Prints messages from the publisher example, branching on message name.
//!
//! Run with:
//!   cargo run -p ipcpipe --example subscriber

use ipcpipe::{PipeAccess, Pipeline, PipelineSettings};

const CHANNEL: &str = "ipcpipe-demo";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let (builder, mut messages) = Pipeline::builder(CHANNEL, PipeAccess::READ)
        .settings(PipelineSettings::default().with_discard_past_messages(true))
        .messages(16);
    let pipe = builder.build()?;

    println!(
        "[{}] listening on \"{}\"...",
        pipe.created_at(),
        pipe.channel_name()
    );

    while let Some(message) = messages.recv().await {
        let payload = message.payload;
        let base = match payload.envelope() {
            Ok(base) => base,
            Err(err) => {
                eprintln!("#{} unreadable envelope: {err}", message.seq);
                continue;
            }
        };

        match base.name() {
            Some("myIntegerMessage") => match payload.value::<i32>() {
                Ok(value) => println!("[{}] int \"myIntegerMessage\": {value}", base.sent_at()),
                Err(err) => eprintln!("#{} bad int payload: {err}", message.seq),
            },
            name => println!("[{}] received: {}", base.sent_at(), name.unwrap_or("N/A")),
        }
    }

    Ok(())
}
