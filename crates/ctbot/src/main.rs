use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ctbot_core::{
    config::Config,
    transport::Transport,
    types::{CallbackQuery, ContactMessage, LocationMessage, TextMessage},
    Bot, Outcome,
};
use ctbot_http::HttpTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ctbot_core::logging::init("ctbot")?;

    let cfg = Config::load()?;
    let transport = HttpTransport::from_config(&cfg)?;
    let mut bot = Bot::new(&cfg, transport)?;

    let me = bot
        .get_me()
        .await
        .context("getMe failed; check TELEGRAM_BOT_TOKEN and network access")?;
    info!(
        id = me.id.0,
        username = me.username.as_deref().unwrap_or("?"),
        "ctbot started"
    );

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        });
    }

    loop {
        let outcome = tokio::select! {
            _ = shutdown.cancelled() => break,
            outcome = bot.get_new_message_blocking() => outcome,
        };
        handle(&mut bot, outcome).await;
    }

    info!("ctbot stopped");
    Ok(())
}

async fn handle<T: Transport>(bot: &mut Bot<T>, outcome: Outcome) {
    match outcome {
        Outcome::Text(msg) => echo_text(bot, msg).await,
        Outcome::CallbackQuery(query) => answer_query(bot, query).await,
        Outcome::Location(msg) => describe_location(bot, msg).await,
        Outcome::Contact(msg) => describe_contact(bot, msg).await,
        Outcome::NoData | Outcome::Ack(_) | Outcome::UserProfile(_) => {}
    }
}

async fn echo_text<T: Transport>(bot: &mut Bot<T>, msg: TextMessage) {
    info!(
        chat = %msg.meta.chat.id,
        from = msg.meta.sender.username.as_deref().unwrap_or("?"),
        sent_at = ?msg.meta.sent_at(),
        "text message"
    );
    if bot.send_message(msg.meta.chat.id, &msg.text, None).await.is_none() {
        warn!(chat = %msg.meta.chat.id, "echo failed");
    }
}

async fn answer_query<T: Transport>(bot: &mut Bot<T>, query: CallbackQuery) {
    info!(query = %query.id, data = ?query.data, "callback query");
    let text = query.data.as_deref().unwrap_or("");
    if !bot.answer_callback_query(&query.id, Some(text), false).await {
        warn!(query = %query.id, "answerCallbackQuery failed");
    }
}

async fn describe_location<T: Transport>(bot: &mut Bot<T>, msg: LocationMessage) {
    let reply = format!(
        "Latitude: {:.6}\nLongitude: {:.6}",
        msg.location.latitude, msg.location.longitude
    );
    if bot.send_message(msg.meta.chat.id, &reply, None).await.is_none() {
        warn!(chat = %msg.meta.chat.id, "location reply failed");
    }
}

async fn describe_contact<T: Transport>(bot: &mut Bot<T>, msg: ContactMessage) {
    let c = &msg.contact;
    let name = [c.first_name.as_deref(), c.last_name.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    let reply = format!(
        "Contact: {name}\nPhone: {}",
        c.phone_number.as_deref().unwrap_or("-")
    );
    if bot.send_message(msg.meta.chat.id, &reply, None).await.is_none() {
        warn!(chat = %msg.meta.chat.id, "contact reply failed");
    }
}
