//! Publishes a random integer or text message every second.
//!
//! Run with:
//!   cargo run -p ipcpipe --example publisher
//!
//! In another terminal:
//!   cargo run -p ipcpipe --example subscriber

use std::thread;
use std::time::Duration;

use ipcpipe::{PipeAccess, Pipeline};
use rand::Rng;

const CHANNEL: &str = "ipcpipe-demo";
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let pipe = Pipeline::open(CHANNEL, PipeAccess::WRITE)?;
    let mut rng = rand::rng();

    loop {
        eprintln!("[{}] sending on {}", pipe.created_at(), pipe.channel_name());

        let response = if rng.random::<f64>() > 0.6 {
            let len = rng.random_range(5..64);
            let text: String = (0..len)
                .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
                .collect();
            pipe.send_text("textMessage", &text)?
        } else {
            pipe.send_value("myIntegerMessage", rng.random_range(0..i32::MAX))?
        };

        if !response.is_success() {
            eprintln!("channel full, message dropped");
        }
        thread::sleep(Duration::from_secs(1));
    }
}
