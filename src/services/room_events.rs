//! Processor attached to each room member's socket, and the per-room scheduler.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::message::{Event, Message, RoomRef},
    error::ServiceError,
    realtime::{
        Channel, ChannelError, TopicChannel,
        topics::{internal_topic, room_topic},
    },
    services::{
        client_events, continuations,
        room_broadcasts::{broadcast_room_updated, to_internal, to_room},
        room_service,
    },
    state::{SharedState, pack::Pack, user::User},
};

/// Start the room's scheduler, the single consumer acting on its internal topic.
///
/// Each signal runs its continuation in a separate task. `room_deleted` shuts the room's topics
/// down, which ends every member processor, and stops the scheduler.
pub fn spawn_scheduler(state: SharedState, room_id: Uuid) -> JoinHandle<()> {
    let internal = state.topics().channel(internal_topic(room_id));
    tokio::spawn(async move {
        let mut signals = internal.receive();
        while let Some(message) = signals.next().await {
            if message.event == Event::RoomDeleted {
                state.topics().shutdown(&room_topic(room_id));
                state.topics().shutdown(&internal_topic(room_id));
                break;
            }
            continuations::spawn(state.clone(), room_id, message);
        }
        debug!(room_id = %room_id, "room scheduler stopped");
    })
}

/// Attach a member's socket to the room and process it until either side goes away.
pub async fn serve(
    state: SharedState,
    room_id: Uuid,
    user: User,
    client: Arc<dyn Channel>,
) -> Result<(), ServiceError> {
    let room = state.rooms().get_by_id(room_id).await?;
    if !room.is_user_in(&user.id) {
        return Err(ServiceError::Forbidden("user is not in the room".into()));
    }
    let pack = state.packs().get(room.pack_preview.id.clone()).await?;

    let room = room_service::connect(&state, &user, room_id).await?;
    let own_view =
        Message::new(Event::RoomUpdated, &room.project(&user.id)).map_err(ChannelError::from)?;
    client.send(own_view).await?;
    broadcast_room_updated(&state, room_id);

    let greeting = Message::system_chat(format!("{} has connected", user.name));
    client.send(greeting.clone()).await?;
    to_room(&state, room_id, greeting);
    info!(room_id = %room_id, user_id = %user.id, "member connected");

    let topic = state.topics().channel(room_topic(room_id));
    RoomEventsProcessor {
        state,
        room_id,
        user,
        pack,
        client,
        topic,
    }
    .run()
    .await;
    Ok(())
}

/// Bridges one member's socket and the room topic.
pub struct RoomEventsProcessor {
    state: SharedState,
    room_id: Uuid,
    user: User,
    pack: Pack,
    client: Arc<dyn Channel>,
    topic: TopicChannel,
}

impl RoomEventsProcessor {
    /// Pump the socket until it closes, then report the disconnect.
    pub async fn run(self) {
        tokio::join!(self.listen_client(), self.listen_topic());
    }

    async fn listen_client(&self) {
        let mut incoming = self.client.receive();
        while let Some(message) = incoming.next().await {
            let event = message.event;
            let result =
                client_events::handle(&self.state, self.room_id, &self.user, &self.pack, message)
                    .await;
            if let Err(err) = result {
                debug!(
                    room_id = %self.room_id,
                    user_id = %self.user.id,
                    ?event,
                    error = %err,
                    "client action rejected"
                );
                if self.client.send(Message::error(&err)).await.is_err() {
                    break;
                }
            }
        }
        self.on_client_closed().await;
    }

    async fn on_client_closed(&self) {
        let disconnected = self
            .state
            .rooms()
            .safe_set(self.room_id, |room| {
                room.set_connected(&self.user.id, false);
                Ok::<_, ServiceError>(())
            })
            .await;
        match disconnected {
            Ok(_) => {
                broadcast_room_updated(&self.state, self.room_id);
                to_room(
                    &self.state,
                    self.room_id,
                    Message::system_chat(format!("{} has disconnected", self.user.name)),
                );
                to_internal(
                    &self.state,
                    self.room_id,
                    Message::user_disconnected(self.user.id.clone()),
                );
            }
            Err(ServiceError::NotFound(_)) => {
                debug!(room_id = %self.room_id, "room already gone on disconnect");
            }
            Err(err) => {
                warn!(
                    room_id = %self.room_id,
                    user_id = %self.user.id,
                    error = %err,
                    "failed to mark member disconnected"
                );
            }
        }
        if let Err(err) = self.topic.close() {
            debug!(room_id = %self.room_id, error = %err, "room topic already closed");
        }
        info!(room_id = %self.room_id, user_id = %self.user.id, "member disconnected");
    }

    async fn listen_topic(&self) {
        let mut events = self.topic.receive();
        while let Some(message) = events.next().await {
            if !message.event.is_client_facing() {
                continue;
            }
            let event = message.event;
            if let Err(err) = self.relay(message).await {
                warn!(
                    room_id = %self.room_id,
                    user_id = %self.user.id,
                    ?event,
                    error = %err,
                    "failed to relay room event"
                );
            }
        }
        if let Err(err) = self.client.close() {
            debug!(
                room_id = %self.room_id,
                user_id = %self.user.id,
                error = %err,
                "room client already closed"
            );
        }
    }

    /// Forward a topic event, re-projecting room updates for this member.
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
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::sleep;

    use super::*;
    use crate::{
        dao::room_repository::RoomRepository,
        dto::message::{ChatPayload, ErrorPayload},
        realtime::{
            testing::{ClientHandle, client_pair},
            topics::LOBBY_TOPIC,
        },
        services::room_broadcasts::broadcast_room_deleted,
        state::{
            fixtures::{room_with_players, sample_pack, user},
            room::{Room, RoomState},
            testing::test_state,
        },
    };

    /// Seat everyone disconnected, as they are before their sockets attach.
    fn offline(mut room: Room) -> Room {
        if let Some(host) = room.host.as_mut() {
            host.is_connected = false;
        }
        for player in &mut room.players {
            player.is_connected = false;
        }
        room
    }

    async fn attach(state: &SharedState, room_id: Uuid, id: &str) -> ClientHandle {
        let (channel, mut handle) = client_pair();
        tokio::spawn(serve(state.clone(), room_id, user(id), channel));
        let own = handle.next_of(Event::RoomUpdated).await;
        assert_eq!(own.payload["id"], json!(room_id));
        handle
    }

    #[tokio::test]
    async fn member_gets_own_projection_and_greeting() {
        let (state, _) = test_state().await;
        let room = offline(room_with_players(1));
        state.rooms().set(&room).await.unwrap();

        let (channel, mut host) = client_pair();
        tokio::spawn(serve(state.clone(), room.id, user("host"), channel));

        let own = host.next().await;
        assert_eq!(own.event, Event::RoomUpdated);
        assert_eq!(own.payload["host"]["isConnected"], json!(true));
        assert!(own.payload.get("currentRoundQuestions").is_some());
        let greeting: ChatPayload = host.next().await.payload().unwrap();
        assert_eq!(greeting.from, None);
        assert_eq!(greeting.text, "host name has connected");
    }

    #[tokio::test]
    async fn stranger_is_rejected() {
        let (state, _) = test_state().await;
        let room = offline(room_with_players(1));
        state.rooms().set(&room).await.unwrap();
        let (channel, _handle) = client_pair();

        let result = serve(state.clone(), room.id, user("p9"), channel).await;

        assert!(matches!(result, Err(ServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn room_events_reach_members_but_internal_signals_do_not() {
        let (state, _) = test_state().await;
        let room = offline(room_with_players(1));
        state.rooms().set(&room).await.unwrap();
        let mut host = attach(&state, room.id, "host").await;
        let mut player = attach(&state, room.id, "p1").await;

        player.push(
            serde_json::from_value(json!({ "event": "chat", "payload": { "text": "hi" } }))
                .unwrap(),
        );
        // Greetings come first.
        let chat = loop {
            let chat: ChatPayload = host.next_of(Event::Chat).await.payload().unwrap();
            if chat.from.is_some() {
                break chat;
            }
        };
        assert_eq!(chat.from, Some(user("p1")));
        assert_eq!(chat.text, "hi");

        to_room(&state, room.id, Message::signal(Event::AnswerStarted));
        to_room(&state, room.id, Message::system_chat("marker".into()));
        loop {
            let message = player.next().await;
            assert_ne!(message.event, Event::AnswerStarted);
            if message.payload["text"] == json!("marker") {
                break;
            }
        }
    }

    #[tokio::test]
    async fn rejected_action_is_answered_with_error() {
        let (state, _) = test_state().await;
        let room = offline(room_with_players(1));
        state.rooms().set(&room).await.unwrap();
        let mut player = attach(&state, room.id, "p1").await;

        player.push(Message::signal(Event::StartGame));

        let error: ErrorPayload = player.next_of(Event::Error).await.payload().unwrap();
        assert_eq!(error.error, "not allowed to start game");
        assert!(!player.is_closed());
    }

    #[tokio::test]
    async fn disconnect_is_announced_and_signalled() {
        let (state, _) = test_state().await;
        let room = offline(room_with_players(1));
        state.rooms().set(&room).await.unwrap();
        let internal = state.topics().channel(internal_topic(room.id));
        let mut signals = internal.receive();
        let mut host = attach(&state, room.id, "host").await;
        let mut player = attach(&state, room.id, "p1").await;

        player.disconnect();

        loop {
            let chat: ChatPayload = host.next_of(Event::Chat).await.payload().unwrap();
            if chat.text == "p1 name has disconnected" {
                break;
            }
        }
        let signal = signals.next().await.unwrap();
        assert_eq!(signal.event, Event::UserDisconnected);
        assert_eq!(signal.payload["userId"], json!("p1"));
        let stored = state.rooms().get_by_id(room.id).await.unwrap();
        assert!(!stored.player("p1").unwrap().is_connected);
        assert!(stored.host.unwrap().is_connected);
    }

    #[tokio::test]
    async fn room_deletion_closes_every_member() {
        let (state, _) = test_state().await;
        let room = offline(room_with_players(1));
        state.rooms().set(&room).await.unwrap();
        spawn_scheduler(state.clone(), room.id);
        let mut host = attach(&state, room.id, "host").await;

        broadcast_room_deleted(&state, room.id);

        let deleted = host.next_of(Event::RoomDeleted).await;
        assert_eq!(deleted.payload["id"], json!(room.id));
        host.wait_closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_game_expires_and_is_archived() {
        let (state, archive) = test_state().await;
        let pack = sample_pack();
        let mut room = offline(room_with_players(1));
        room.players[0].is_connected = true;
        room.start_game("host", &pack).unwrap();
        room.players[0].is_connected = false;
        state.rooms().set(&room).await.unwrap();
        spawn_scheduler(state.clone(), room.id);
        let lobby = state.topics().channel(LOBBY_TOPIC);
        let mut lobby_events = lobby.receive();
        let mut host = attach(&state, room.id, "host").await;

        host.disconnect();
        sleep(Duration::from_secs(302)).await;

        assert!(state.rooms().get_by_id(room.id).await.is_err());
        loop {
            let message = lobby_events.next().await.unwrap();
            if message.event == Event::RoomDeleted {
                break;
            }
        }
        let archived = archive.list_created_by("host".into()).await.unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].state, RoomState::SelectingQuestion);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_before_expiry_keeps_the_room() {
        let (state, _) = test_state().await;
        let room = offline(room_with_players(1));
        state.rooms().set(&room).await.unwrap();
        spawn_scheduler(state.clone(), room.id);
        let mut host = attach(&state, room.id, "host").await;

        host.disconnect();
        sleep(Duration::from_secs(100)).await;
        let _host = attach(&state, room.id, "host").await;
        sleep(Duration::from_secs(300)).await;

        let stored = state.rooms().get_by_id(room.id).await.unwrap();
        assert!(stored.host.unwrap().is_connected);
    }
}
