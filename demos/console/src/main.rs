//! Prints a room's chat to stdout, one JSON object per message.
//!
//! ```text
//! BLIVECHAT_MODE=direct    BLIVECHAT_ROOM_ID=21396545
//! BLIVECHAT_MODE=open      BLIVECHAT_AUTH_CODE=... BLIVECHAT_APP_ID=...
//! BLIVECHAT_MODE=relay     BLIVECHAT_RELAY_URL=ws://localhost:12450/api/chat BLIVECHAT_ROOM_ID=...
//! BLIVECHAT_MODE=synthetic
//! ```
//!
//! `BLIVECHAT_API` is a comma-separated list of backend base URLs used by
//! the direct and open modes. Logs go to stderr, filtered by `RUST_LOG`.

use std::sync::Arc;

use blivechat::prelude::*;
use tracing::{error, info};

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

struct Printer;

impl Printer {
    fn print(&self, msg: ChatMessage) {
        match serde_json::to_string(&msg) {
            Ok(line) => println!("{line}"),
            Err(e) => error!(error = %e, "cannot print message"),
        }
    }
}

impl MessageHandler for Printer {
    fn on_add_text(&mut self, msg: TextMessage) {
        self.print(ChatMessage::AddText(msg));
    }

    fn on_add_gift(&mut self, msg: GiftMessage) {
        self.print(ChatMessage::AddGift(msg));
    }

    fn on_add_member(&mut self, msg: MembershipMessage) {
        self.print(ChatMessage::AddMember(msg));
    }

    fn on_add_super_chat(&mut self, msg: SuperChatMessage) {
        self.print(ChatMessage::AddSuperChat(msg));
    }

    fn on_del_super_chat(&mut self, msg: SuperChatDelete) {
        self.print(ChatMessage::DelSuperChat(msg));
    }

    fn on_update_translation(&mut self, msg: TranslationUpdate) {
        self.print(ChatMessage::UpdateTranslation(msg));
    }

    fn on_fatal_error(&mut self, error: FatalError) {
        error!(%error, "client gave up");
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn required(name: &str) -> Result<String, String> {
    var(name).ok_or_else(|| format!("{name} is not set"))
}

fn number(name: &str) -> Result<u64, String> {
    required(name)?
        .parse()
        .map_err(|e| format!("{name} is not a number: {e}"))
}

fn api() -> Result<Arc<HttpLiveApi>, Box<dyn std::error::Error>> {
    let mut config = ApiConfig::default();
    if let Some(urls) = var("BLIVECHAT_API") {
        config.base_urls = urls.split(',').map(|u| u.trim().to_owned()).collect();
    }
    Ok(Arc::new(HttpLiveApi::new(config)?))
}

fn start() -> Result<ChatClient, Box<dyn std::error::Error>> {
    let builder = ChatClient::builder();
    let mode = var("BLIVECHAT_MODE").unwrap_or_else(|| "synthetic".into());
    let client = match mode.as_str() {
        "direct" => builder.direct_web(
            DirectWebConfig::new(number("BLIVECHAT_ROOM_ID")?),
            api()?,
            WebSocketConnector,
            Printer,
        ),
        "open" => builder.open_live(
            OpenLiveConfig::new(required("BLIVECHAT_AUTH_CODE")?, number("BLIVECHAT_APP_ID")?),
            api()?,
            WebSocketConnector,
            Printer,
        ),
        "relay" => {
            let room = match var("BLIVECHAT_AUTH_CODE") {
                Some(code) => RoomKey::AuthCode(code),
                None => RoomKey::RoomId(number("BLIVECHAT_ROOM_ID")?),
            };
            builder.relay(
                RelayConfig::new(required("BLIVECHAT_RELAY_URL")?, room),
                WebSocketConnector,
                Printer,
            )
        }
        "synthetic" => builder.synthetic(SyntheticConfig::default(), Printer),
        other => return Err(format!("unknown BLIVECHAT_MODE {other:?}").into()),
    };
    info!(mode = %mode, "client started");
    Ok(client)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let client = start()?;
    let mut stats = client.watch_stats();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, stopping");
            client.stop();
        }
        _ = stats.wait_for(|s| s.state == LinkState::Terminated) => {}
    }
    let summary = client.stats();
    client.join().await?;
    info!(
        connections = summary.connections_opened,
        reconnects = summary.reconnects_scheduled,
        messages = summary.messages_delivered,
        "done"
    );
    Ok(())
}
