//! Processor attached to each socket browsing the lobby.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::{
    dto::message::{Event, IncomingChat, Message, RoomRef},
    error::ServiceError,
    realtime::{Channel, ChannelError, TopicChannel, topics::LOBBY_TOPIC},
    services::room_broadcasts::to_lobby,
    state::{SharedState, user::User},
};

/// Greet the user, send the current room list and relay lobby traffic until either side closes.
pub async fn serve(
    state: SharedState,
    user: User,
    client: Arc<dyn Channel>,
) -> Result<(), ServiceError> {
    let greeting = Message::system_chat(format!("{} has connected", user.name));
    to_lobby(&state, greeting.clone());
    client.send(greeting).await?;

    let topic = state.topics().channel(LOBBY_TOPIC);
    for summary in state.rooms().list().await? {
        let update = Message::new(Event::RoomUpdated, &summary).map_err(ChannelError::from)?;
        client.send(update).await?;
    }
    info!(user_id = %user.id, "lobby client connected");

    LobbyEventsProcessor {
        state,
        user,
        client,
        topic,
    }
    .run()
    .await;
    Ok(())
}

/// Serves one lobby socket.
pub struct LobbyEventsProcessor {
    state: SharedState,
    user: User,
    client: Arc<dyn Channel>,
    topic: TopicChannel,
}

impl LobbyEventsProcessor {
    /// Forward lobby updates until either side closes.
    pub async fn run(self) {
        tokio::join!(self.listen_client(), self.listen_topic());
    }

    async fn listen_client(&self) {
        let mut incoming = self.client.receive();
        while let Some(message) = incoming.next().await {
            if let Err(err) = self.on_client_message(message) {
                debug!(user_id = %self.user.id, error = %err, "lobby message rejected");
                if self.client.send(Message::error(&err)).await.is_err() {
                    break;
                }
            }
        }
        to_lobby(
            &self.state,
            Message::system_chat(format!("{} has disconnected", self.user.name)),
        );
        if let Err(err) = self.topic.close() {
            debug!(user_id = %self.user.id, error = %err, "lobby topic already closed");
        }
        info!(user_id = %self.user.id, "lobby client disconnected");
    }

    fn on_client_message(&self, message: Message) -> Result<(), ServiceError> {
        if message.event != Event::Chat {
            return Err(ServiceError::InvalidInput(format!(
                "unsupported lobby event {:?}",
                message.event
            )));
        }
        let IncomingChat { text } = message
            .payload()
            .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;
        to_lobby(&self.state, Message::chat(self.user.clone(), text));
        Ok(())
    }

    async fn listen_topic(&self) {
        let mut events = self.topic.receive();
        while let Some(message) = events.next().await {
            let event = message.event;
            if !matches!(event, Event::Chat | Event::RoomUpdated | Event::RoomDeleted) {
                continue;
            }
            if let Err(err) = self.relay(message).await {
                warn!(user_id = %self.user.id, ?event, error = %err, "failed to relay lobby event");
            }
        }
        if let Err(err) = self.client.close() {
            debug!(user_id = %self.user.id, error = %err, "lobby client already closed");
        }
    }

    async fn relay(&self, message: Message) -> Result<(), ServiceError> {
        let outgoing = match message.event {
            Event::RoomUpdated => {
                let RoomRef { id } = message.payload().map_err(ChannelError::from)?;
                let room = self.state.rooms().get_by_id(id).await?;
                Message::new(Event::RoomUpdated, &room.project(&self.user.id))
                    .map_err(ChannelError::from)?
            }
            _ => message,
        };
        self.client.send(outgoing).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        dto::message::{ChatPayload, ErrorPayload},
        realtime::testing::{ClientHandle, client_pair},
        services::room_broadcasts::{broadcast_room_deleted, broadcast_room_updated_everywhere},
        state::{
            fixtures::{room_with_players, user},
            testing::test_state,
        },
    };

    async fn browse(state: &SharedState, id: &str) -> ClientHandle {
        let (channel, mut handle) = client_pair();
        tokio::spawn(serve(state.clone(), user(id), channel));
        let greeting: ChatPayload = handle.next_of(Event::Chat).await.payload().unwrap();
        assert_eq!(greeting.text, format!("{id} name has connected"));
        handle
    }

    #[tokio::test]
    async fn newcomer_receives_every_live_room() {
        let (state, _) = test_state().await;
        let first = room_with_players(1);
        let second = room_with_players(2);
        state.rooms().set(&first).await.unwrap();
        state.rooms().set(&second).await.unwrap();

        let mut client = browse(&state, "u1").await;

        let mut seen = vec![
            client.next_of(Event::RoomUpdated).await.payload["id"].clone(),
            client.next_of(Event::RoomUpdated).await.payload["id"].clone(),
        ];
        seen.sort_by_key(|id| id.to_string());
        let mut expected = vec![json!(first.id), json!(second.id)];
        expected.sort_by_key(|id| id.to_string());
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn chat_is_relayed_with_sender() {
        let (state, _) = test_state().await;
        let mut watcher = browse(&state, "u1").await;
        let talker = browse(&state, "u2").await;

        talker.push(
            serde_json::from_value(json!({ "event": "chat", "payload": { "text": "anyone?" } }))
                .unwrap(),
        );

        let chat = loop {
            let chat: ChatPayload = watcher.next_of(Event::Chat).await.payload().unwrap();
            if chat.from.is_some() {
                break chat;
            }
        };
        assert_eq!(chat.from, Some(user("u2")));
        assert_eq!(chat.text, "anyone?");
    }

    #[tokio::test]
    async fn game_actions_are_refused_in_the_lobby() {
        let (state, _) = test_state().await;
        let mut client = browse(&state, "u1").await;

        client.push(Message::signal(Event::StartGame));

        let error: ErrorPayload = client.next_of(Event::Error).await.payload().unwrap();
        assert!(error.error.starts_with("invalid input"));
    }

    #[tokio::test]
    async fn room_updates_are_projected_per_viewer() {
        let (state, _) = test_state().await;
        let room = room_with_players(1);
        state.rooms().set(&room).await.unwrap();
        let mut stranger = browse(&state, "u1").await;
        stranger.next_of(Event::RoomUpdated).await;
        let mut member = browse(&state, "p1").await;
        member.next_of(Event::RoomUpdated).await;

        broadcast_room_updated_everywhere(&state, room.id);

        let lobby_view = stranger.next_of(Event::RoomUpdated).await;
        assert_eq!(lobby_view.payload["status"], json!("Waiting for start"));
        let member_view = member.next_of(Event::RoomUpdated).await;
        assert!(member_view.payload.get("currentRoundQuestions").is_some());

        broadcast_room_deleted(&state, room.id);
        let deleted = stranger.next_of(Event::RoomDeleted).await;
        assert_eq!(deleted.payload["id"], json!(room.id));
    }

    #[tokio::test]
    async fn leaving_is_announced() {
        let (state, _) = test_state().await;
        let mut watcher = browse(&state, "u1").await;
        let mut leaver = browse(&state, "u2").await;

        leaver.disconnect();

        loop {
            let chat: ChatPayload = watcher.next_of(Event::Chat).await.payload().unwrap();
            if chat.text == "u2 name has disconnected" {
                break;
            }
        }
    }

    #[tokio::test]
    async fn lobby_shutdown_closes_clients() {
        let (state, _) = test_state().await;
        let mut client = browse(&state, "u1").await;

        state.topics().shutdown(LOBBY_TOPIC);

        client.wait_closed().await;
    }
}
