//! Join a study room's chat and print realtime traffic
//!
//! Connects to the broker and the notification feed, subscribes to one
//! room's topic, posts a greeting once connected and logs everything that
//! arrives until Ctrl-C.
//!
//! Run with: STUDYMATE_LOG_MODE=development cargo run -p studymate-sdk --example study_room -- 42

use std::time::Duration;

use studymate_sdk::{ConnectionState, NotificationEventKind, RealtimeSession, SdkConfig, SdkError};

#[tokio::main]
async fn main() -> Result<(), SdkError> {
    studymate_sdk::logging::init_logging_from_env()?;

    let room_id: u64 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(1);

    let session = RealtimeSession::new(SdkConfig::from_env()?)?;
    let rooms = session.broker().addresses();

    session.broker().set_on_state_change(|state| println!("broker: {state}"));
    session.notifications().set_on_state_change(|state| println!("notifications: {state}"));

    let _chat = session.broker().subscribe(
        &rooms.room_topic(room_id),
        |message| println!("room message: {}", message.body),
        None,
    )?;

    session.notifications().on_notification(|notification| {
        println!(
            "notification {:?} from {}: {}",
            notification.kind,
            notification.nickname.as_deref().unwrap_or("?"),
            notification.message.as_deref().unwrap_or("")
        );
    });
    session
        .notifications()
        .add_listener(NotificationEventKind::ReconnectFailed, |event| {
            println!("notification feed gave up: {event:?}");
        });

    session.start();

    let greeter = session.clone();
    tokio::spawn(async move {
        while greeter.broker().state() != ConnectionState::Connected {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        let sent = greeter.broker().send_json(
            &rooms.room_chat(room_id),
            &serde_json::json!({ "content": "hello from the SDK example" }),
            None,
        );
        println!("greeting sent: {sent}");
    });

    let _ = tokio::signal::ctrl_c().await;
    session.logout().await;
    Ok(())
}
