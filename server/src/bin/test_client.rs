use futures_util::{SinkExt, StreamExt};
use shared::{Inbound, Outbound, DEFAULT_PORT};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("ws://127.0.0.1:{}", DEFAULT_PORT));

    println!("Connecting to {}", url);
    let (ws, _) = connect_async(url.as_str()).await?;
    let (mut sink, mut stream) = ws.split();

    sink.send(Message::Text(Inbound::RequestState.encode())).await?;

    // Print server output as it arrives
    let printer = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            };
            match Outbound::decode(&text) {
                Ok(Outbound::Print { content }) => print!("{}", content),
                Ok(Outbound::ClearChoices) => println!("----"),
                Ok(Outbound::Choice { index, label }) => println!("  [{}] {}", index, label),
                Err(e) => println!("Unreadable message ({}): {}", e, text),
            }
        }
        println!("Connection closed");
    });

    // Each line typed is sent as a key press
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let key = line.trim();
        if key.is_empty() {
            continue;
        }
        let message = Inbound::KeyPress {
            key: key.to_string(),
        };
        if sink.send(Message::Text(message.encode())).await.is_err() {
            break;
        }
    }

    let _ = sink.close().await;
    let _ = printer.await;
    Ok(())
}
