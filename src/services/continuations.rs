//! Deferred continuations driving every timed phase of a room.
//!
//! When a phase starts, its continuation reads the room once to capture the deadline and a
//! fingerprint of the state the deadline belongs to, then sleeps. On waking it re-checks the
//! phase and the fingerprint under the room lock. A mismatch means another action already moved
//! the room on; the continuation then gives up with [`DeferredError::Cancelled`], which is not a
//! failure.

use std::{future::Future, time::Duration};

use thiserror::Error;
use time::OffsetDateTime;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::storage::StorageError,
    dto::message::{Event, Message, QuestionEndedPayload, UserDisconnectedPayload},
    error::ServiceError,
    services::room_broadcasts::{
        broadcast_room_deleted, broadcast_room_updated, broadcast_room_updated_everywhere,
        to_internal, to_room,
    },
    state::{
        SharedState,
        pack::Question,
        room::{Room, RoomError, RoomState},
        user::SYSTEM,
    },
};

/// Why a continuation did nothing.
#[derive(Debug, Error)]
pub enum DeferredError {
    /// The room moved on before the deadline.
    #[error("continuation superseded")]
    Cancelled,
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<StorageError> for DeferredError {
    fn from(err: StorageError) -> Self {
        DeferredError::Service(err.into())
    }
}

impl From<RoomError> for DeferredError {
    fn from(err: RoomError) -> Self {
        DeferredError::Service(err.into())
    }
}

impl From<serde_json::Error> for DeferredError {
    fn from(err: serde_json::Error) -> Self {
        DeferredError::Service(ServiceError::InvalidInput(err.to_string()))
    }
}

/// Internal signal implied by a room moving from `before` to its current state.
///
/// `ended` is the question that was in play before the transition; it is only used when the room
/// returns to the board.
pub fn next_signal(before: RoomState, room: &Room, ended: Option<Question>) -> Option<Message> {
    if before == room.state {
        return None;
    }
    let event = match room.state {
        RoomState::SelectingQuestion if before == RoomState::WaitingForStart => Event::RoundStarted,
        RoomState::SelectingQuestion => return ended.map(Message::question_ended),
        RoomState::RevealingQuestion => Event::RevealingStarted,
        RoomState::ShowingQuestion => Event::QuestionStarted,
        RoomState::Answering => Event::AnswerStarted,
        RoomState::Passing => Event::PassingStarted,
        RoomState::Betting => Event::BettingStarted,
        RoomState::FinalRoundBetting => Event::FinalRoundBettingStarted,
        RoomState::ShowingFinalRoundQuestion => Event::FinalRoundQuestionStarted,
        RoomState::GameOver => Event::GameEnded,
        RoomState::WaitingForStart
        | RoomState::SelectingFinalRoundCategory
        | RoomState::ValidatingFinalRoundAnswers => return None,
    };
    Some(Message::signal(event))
}

/// Announce a transition: `room_updated` to the members (and the lobby once the game is over),
/// then whatever scheduling signal the new state implies.
pub fn publish_transition(
    state: &SharedState,
    before: RoomState,
    room: &Room,
    ended: Option<Question>,
) {
    if room.state == RoomState::GameOver && before != RoomState::GameOver {
        broadcast_room_updated_everywhere(state, room.id);
    } else {
        broadcast_room_updated(state, room.id);
    }
    if let Some(signal) = next_signal(before, room, ended) {
        to_internal(state, room.id, signal);
    }
}

/// Run the continuation for an internal signal in its own task.
pub fn spawn(state: SharedState, room_id: Uuid, message: Message) {
    tokio::spawn(async move {
        let event = message.event;
        match run(&state, room_id, message).await {
            Ok(()) => {}
            Err(DeferredError::Cancelled) => {
                debug!(room_id = %room_id, ?event, "continuation superseded");
            }
            Err(DeferredError::Service(err)) => {
                warn!(room_id = %room_id, ?event, error = %err, "continuation failed");
            }
        }
    });
}

async fn run(state: &SharedState, room_id: Uuid, message: Message) -> Result<(), DeferredError> {
    match message.event {
        Event::RoundStarted => on_round_started(state, room_id).await,
        Event::RevealingStarted => on_revealing_started(state, room_id).await,
        Event::QuestionStarted => on_question_started(state, room_id).await,
        Event::AnswerStarted => on_answer_started(state, room_id).await,
        Event::PassingStarted => on_passing_started(state, room_id).await,
        Event::BettingStarted => on_betting_started(state, room_id).await,
        Event::QuestionEnded => {
            let QuestionEndedPayload { question } = message.payload()?;
            on_question_ended(state, room_id, question).await
        }
        Event::FinalRoundBettingStarted => on_final_round_betting_started(state, room_id).await,
        Event::FinalRoundQuestionStarted => on_final_round_question_started(state, room_id).await,
        Event::GameEnded => on_game_ended(state, room_id).await,
        Event::UserDisconnected => {
            let UserDisconnectedPayload { user_id } = message.payload()?;
            on_user_disconnected(state, room_id, user_id).await
        }
        other => {
            debug!(room_id = %room_id, event = ?other, "no continuation for event");
            Ok(())
        }
    }
}

/// Bound the work done after a deadline so a stuck store never holds the lock for long.
async fn bounded<T>(
    state: &SharedState,
    work: impl Future<Output = Result<T, DeferredError>>,
) -> Result<T, DeferredError> {
    match timeout(state.config().continuation_timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::Timeout.into()),
    }
}

async fn sleep_until(state: &SharedState, deadline: OffsetDateTime) {
    let remaining = Duration::try_from(deadline - state.now()).unwrap_or(Duration::ZERO);
    sleep(remaining).await;
}

/// Re-check the room under its lock and apply the automatic advance if it is still current.
///
/// Returns the updated room and the question that was in play before the advance.
async fn advance<C, A>(
    state: &SharedState,
    room_id: Uuid,
    expected: RoomState,
    still_current: C,
    apply: A,
) -> Result<(Room, Option<Question>), DeferredError>
where
    C: FnOnce(&Room) -> bool,
    A: FnOnce(&mut Room) -> Result<(), RoomError>,
{
    let mut ended = None;
    let room = state
        .rooms()
        .safe_set(room_id, |room| {
            if room.state != expected || !still_current(&*room) {
                return Err(DeferredError::Cancelled);
            }
            ended = room
                .current_question
                .as_ref()
                .map(|current| current.question.clone());
            apply(room)?;
            Ok(())
        })
        .await?;
    Ok((room, ended))
}

/// Load the room, failing with `Cancelled` if it already left `expected`.
async fn room_in(
    state: &SharedState,
    room_id: Uuid,
    expected: RoomState,
) -> Result<Room, DeferredError> {
    let room = state.rooms().get_by_id(room_id).await?;
    if room.state != expected {
        return Err(DeferredError::Cancelled);
    }
    Ok(room)
}

async fn on_round_started(state: &SharedState, room_id: Uuid) -> Result<(), DeferredError> {
    let room = state.rooms().get_by_id(room_id).await?;
    let pack = state.packs().get(room.pack_preview.id.clone()).await?;
    let Some(round) = room
        .current_round_name
        .as_deref()
        .and_then(|name| pack.round(name))
    else {
        return Err(DeferredError::Cancelled);
    };
    to_room(state, room_id, Message::round_demo(round));
    Ok(())
}

async fn on_revealing_started(state: &SharedState, room_id: Uuid) -> Result<(), DeferredError> {
    let room = room_in(state, room_id, RoomState::RevealingQuestion).await?;
    let starts_at = room
        .current_question
        .as_ref()
        .and_then(|current| current.timer_starts_at);
    let Some(deadline) = starts_at else {
        return Err(DeferredError::Cancelled);
    };
    let board = room.current_round_questions;
    sleep_until(state, deadline).await;

    bounded(state, async {
        let (room, ended) = advance(
            state,
            room_id,
            RoomState::RevealingQuestion,
            |room| {
                room.current_round_questions == board
                    && room
                        .current_question
                        .as_ref()
                        .and_then(|current| current.timer_starts_at)
                        == starts_at
            },
            Room::start_regular_question,
        )
        .await?;
        publish_transition(state, RoomState::RevealingQuestion, &room, ended);
        Ok(())
    })
    .await
}

async fn on_question_started(state: &SharedState, room_id: Uuid) -> Result<(), DeferredError> {
    let room = room_in(state, room_id, RoomState::ShowingQuestion).await?;
    let ends_at = room
        .current_question
        .as_ref()
        .and_then(|current| current.timer_ends_at);
    let Some(deadline) = ends_at else {
        return Err(DeferredError::Cancelled);
    };
    let board = room.current_round_questions;
    sleep_until(state, deadline).await;

    bounded(state, async {
        let (room, ended) = advance(
            state,
            room_id,
            RoomState::ShowingQuestion,
            |room| {
                room.current_round_questions == board
                    && room
                        .current_question
                        .as_ref()
                        .and_then(|current| current.timer_ends_at)
                        == ends_at
            },
            |room| {
                room.end_question();
                Ok(())
            },
        )
        .await?;
        publish_transition(state, RoomState::ShowingQuestion, &room, ended);
        Ok(())
    })
    .await
}

async fn on_answer_started(state: &SharedState, room_id: Uuid) -> Result<(), DeferredError> {
    let room = room_in(state, room_id, RoomState::Answering).await?;
    let Some(answering) = room.answering_player else {
        return Err(DeferredError::Cancelled);
    };
    let board = room.current_round_questions;
    sleep_until(state, answering.timer_ends_at).await;

    bounded(state, async {
        let now = state.now();
        let (room, ended) = advance(
            state,
            room_id,
            RoomState::Answering,
            |room| {
                room.answering_player.as_ref() == Some(&answering)
                    && room.current_round_questions == board
            },
            |room| room.validate_answer(SYSTEM, false, now),
        )
        .await?;
        publish_transition(state, RoomState::Answering, &room, ended);
        Ok(())
    })
    .await
}

async fn on_passing_started(state: &SharedState, room_id: Uuid) -> Result<(), DeferredError> {
    let room = room_in(state, room_id, RoomState::Passing).await?;
    let board = room.current_round_questions;
    sleep(state.config().pass_timeout).await;

    bounded(state, async {
        let now = state.now();
        let (room, ended) = advance(
            state,
            room_id,
            RoomState::Passing,
            |room| room.current_round_questions == board,
            |room| {
                room.pass_question_auto(now);
                Ok(())
            },
        )
        .await?;
        publish_transition(state, RoomState::Passing, &room, ended);
        Ok(())
    })
    .await
}

async fn on_betting_started(state: &SharedState, room_id: Uuid) -> Result<(), DeferredError> {
    let room = room_in(state, room_id, RoomState::Betting).await?;
    let board = room.current_round_questions;
    sleep(state.config().bet_timeout).await;

    bounded(state, async {
        let now = state.now();
        let (room, ended) = advance(
            state,
            room_id,
            RoomState::Betting,
            |room| room.current_round_questions == board,
            |room| {
                room.place_bets_auto(now);
                Ok(())
            },
        )
        .await?;
        publish_transition(state, RoomState::Betting, &room, ended);
        Ok(())
    })
    .await
}

/// Reveal the answer and move on to the next round, the final round or the end of the game when
/// the board is exhausted.
async fn on_question_ended(
    state: &SharedState,
    room_id: Uuid,
    question: Question,
) -> Result<(), DeferredError> {
    let demo = Message::correct_answer_demo(
        question.correct_answer(),
        state.config().correct_answer_demo.as_secs(),
    );
    let room = match room_in(state, room_id, RoomState::SelectingQuestion).await {
        Ok(room) => room,
        Err(DeferredError::Cancelled) => return demo_only(state, room_id, demo),
        Err(err) => return Err(err),
    };
    let pack = state.packs().get(room.pack_preview.id.clone()).await?;

    bounded(state, async {
        let mut round_before = None;
        let advanced = state
            .rooms()
            .safe_set(room_id, |room| {
                if room.state != RoomState::SelectingQuestion {
                    return Err(DeferredError::Cancelled);
                }
                round_before = room.current_round_name.clone();
                if !room.any_available_questions()
                    && !room.start_next_regular_round(&pack)
                    && !room.start_final_round(&pack)
                {
                    room.end_game();
                }
                Ok(())
            })
            .await;
        let room = match advanced {
            Ok(room) => room,
            Err(DeferredError::Cancelled) => return demo_only(state, room_id, demo),
            Err(err) => return Err(err),
        };

        if room.state == RoomState::GameOver {
            broadcast_room_updated_everywhere(state, room_id);
        } else {
            broadcast_room_updated(state, room_id);
        }
        to_room(state, room_id, demo);

        let signal = match room.state {
            RoomState::SelectingQuestion if room.current_round_name != round_before => {
                Some(Event::RoundStarted)
            }
            RoomState::FinalRoundBetting => Some(Event::FinalRoundBettingStarted),
            RoomState::GameOver => Some(Event::GameEnded),
            _ => None,
        };
        if let Some(event) = signal {
            to_internal(state, room_id, Message::signal(event));
        }
        Ok(())
    })
    .await
}

/// The next question was picked before the board was checked; the answer is still shown.
fn demo_only(state: &SharedState, room_id: Uuid, demo: Message) -> Result<(), DeferredError> {
    to_room(state, room_id, demo);
    Err(DeferredError::Cancelled)
}

async fn on_final_round_betting_started(
    state: &SharedState,
    room_id: Uuid,
) -> Result<(), DeferredError> {
    let room = room_in(state, room_id, RoomState::FinalRoundBetting).await?;
    let final_round = room.final_round_state;
    sleep(state.config().final_bet_timeout).await;

    bounded(state, async {
        let now = state.now();
        let (room, ended) = advance(
            state,
            room_id,
            RoomState::FinalRoundBetting,
            |room| room.final_round_state == final_round,
            |room| {
                room.place_final_round_bets_auto(now);
                Ok(())
            },
        )
        .await?;
        publish_transition(state, RoomState::FinalRoundBetting, &room, ended);
        Ok(())
    })
    .await
}

async fn on_final_round_question_started(
    state: &SharedState,
    room_id: Uuid,
) -> Result<(), DeferredError> {
    let room = room_in(state, room_id, RoomState::ShowingFinalRoundQuestion).await?;
    let ends_at = room
        .final_round_state
        .as_ref()
        .and_then(|final_round| final_round.timer_ends_at);
    let Some(deadline) = ends_at else {
        return Err(DeferredError::Cancelled);
    };
    sleep_until(state, deadline).await;

    bounded(state, async {
        let (room, ended) = advance(
            state,
            room_id,
            RoomState::ShowingFinalRoundQuestion,
            |room| {
                room.final_round_state
                    .as_ref()
                    .and_then(|final_round| final_round.timer_ends_at)
                    == ends_at
            },
            |room| {
                room.end_final_round_question();
                Ok(())
            },
        )
        .await?;
        publish_transition(state, RoomState::ShowingFinalRoundQuestion, &room, ended);
        Ok(())
    })
    .await
}

/// Archive the finished room, keep it around for the idle TTL, then delete it.
async fn on_game_ended(state: &SharedState, room_id: Uuid) -> Result<(), DeferredError> {
    let room = room_in(state, room_id, RoomState::GameOver).await?;
    archive_room(state, room).await;

    sleep(state.config().idle_room_ttl).await;
    bounded(state, async {
        state.rooms().delete(room_id).await?;
        Ok(())
    })
    .await?;
    info!(room_id = %room_id, "finished room deleted");
    broadcast_room_deleted(state, room_id);
    Ok(())
}

/// Let an abandoned room expire, announcing its deletion if nobody came back in time.
async fn on_user_disconnected(
    state: &SharedState,
    room_id: Uuid,
    user_id: String,
) -> Result<(), DeferredError> {
    let room = state.rooms().get_by_id(room_id).await?;
    if room.anyone_connected() {
        return Ok(());
    }

    let ttl = state.config().idle_room_ttl;
    state.rooms().expire(room_id, ttl).await?;
    info!(room_id = %room_id, user_id = %user_id, ttl_secs = ttl.as_secs(), "room abandoned; expiring");
    sleep(ttl + state.config().expire_grace_period).await;

    match state.rooms().get_by_id(room_id).await {
        Ok(_) => {
            debug!(room_id = %room_id, "room revived before expiry");
            Ok(())
        }
        Err(StorageError::NotFound { .. }) => {
            if !matches!(room.state, RoomState::WaitingForStart | RoomState::GameOver) {
                archive_room(state, room).await;
            }
            info!(room_id = %room_id, "abandoned room expired");
            broadcast_room_deleted(state, room_id);
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

async fn archive_room(state: &SharedState, room: Room) {
    let room_id = room.id;
    let result = match state.require_archive().await {
        Ok(archive) => archive.archive(room).await.map_err(ServiceError::from),
        Err(err) => Err(err),
    };
    match result {
        Ok(()) => info!(room_id = %room_id, "room archived"),
        Err(err) => warn!(room_id = %room_id, error = %err, "failed to archive room"),
    }
}

#[cfg(test)]
mod tests {
    use futures::{FutureExt, StreamExt, stream::BoxStream};

    use super::*;
    use crate::{
        dao::room_repository::RoomRepository,
        dto::message::{CorrectAnswerDemoPayload, RoundDemoPayload},
        realtime::{
            Channel,
            topics::{LOBBY_TOPIC, internal_topic, room_topic},
        },
        services::room_events::spawn_scheduler,
        state::{
            fixtures::{room_with_players, sample_pack},
            testing::test_state,
        },
    };

    async fn install(state: &SharedState, room: &Room) {
        state.rooms().set(room).await.unwrap();
        spawn_scheduler(state.clone(), room.id);
    }

    async fn stored(state: &SharedState, id: Uuid) -> Room {
        state.rooms().get_by_id(id).await.unwrap()
    }

    async fn next_of(events: &mut BoxStream<'static, Message>, event: Event) -> Message {
        loop {
            let message = events.next().await.unwrap();
            if message.event == event {
                return message;
            }
        }
    }

    fn started_room(players: usize) -> Room {
        let mut room = room_with_players(players);
        room.start_game("host", &sample_pack()).unwrap();
        room
    }

    #[test]
    fn signal_follows_the_new_state() {
        let pack = sample_pack();
        let mut room = room_with_players(1);
        assert!(next_signal(RoomState::WaitingForStart, &room, None).is_none());

        room.start_game("host", &pack).unwrap();
        let signal = next_signal(RoomState::WaitingForStart, &room, None).unwrap();
        assert_eq!(signal.event, Event::RoundStarted);

        let question = pack.question("Warm-up", "History", 0).unwrap().clone();
        let signal = next_signal(RoomState::Answering, &room, Some(question)).unwrap();
        assert_eq!(signal.event, Event::QuestionEnded);
        assert_eq!(signal.payload["question"]["answers"][0], "Caesar");

        room.end_game();
        let signal = next_signal(RoomState::ValidatingFinalRoundAnswers, &room, None).unwrap();
        assert_eq!(signal.event, Event::GameEnded);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_question_is_revealed_shown_and_closed() {
        let (state, _) = test_state().await;
        let mut room = started_room(2);
        let selector = room.current_player.clone().unwrap();
        room.select_question(&selector, &sample_pack(), "History", 0, state.now())
            .unwrap();
        install(&state, &room).await;
        let topic = state.topics().channel(room_topic(room.id));
        let mut events = topic.receive();

        to_internal(&state, room.id, Message::signal(Event::RevealingStarted));
        sleep(Duration::from_secs(2)).await;
        let showing = stored(&state, room.id).await;
        assert_eq!(showing.state, RoomState::ShowingQuestion);

        sleep(Duration::from_secs(10)).await;
        let selecting = stored(&state, room.id).await;
        assert_eq!(selecting.state, RoomState::SelectingQuestion);
        assert!(selecting.current_question.is_none());
        assert!(selecting.current_round_questions["History"][0].has_been_played);
        let demo: CorrectAnswerDemoPayload = next_of(&mut events, Event::CorrectAnswerDemo)
            .await
            .payload()
            .unwrap();
        assert_eq!(demo.answers, vec!["Caesar".to_string()]);
        assert_eq!(demo.duration, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_answer_deadline_is_ignored() {
        let (state, _) = test_state().await;
        let pack = sample_pack();
        let mut room = started_room(2);
        let selector = room.current_player.clone().unwrap();
        room.select_question(&selector, &pack, "History", 0, state.now())
            .unwrap();
        sleep(Duration::from_secs(2)).await;
        room.start_regular_question().unwrap();
        room.submit_answer("p1", state.now()).unwrap();
        install(&state, &room).await;
        to_internal(&state, room.id, Message::signal(Event::AnswerStarted));

        sleep(Duration::from_secs(2)).await;
        let now = state.now();
        state
            .rooms()
            .safe_set(room.id, |room| {
                room.validate_answer("host", false, now)?;
                room.submit_answer("p2", now)?;
                Ok::<_, DeferredError>(())
            })
            .await
            .unwrap();
        to_internal(&state, room.id, Message::signal(Event::AnswerStarted));
        let topic = state.topics().channel(room_topic(room.id));
        let mut room_events = topic.receive();
        let internal = state.topics().channel(internal_topic(room.id));
        let mut signals = internal.receive();

        // p1's deadline has passed, but p2 is answering now.
        sleep(Duration::from_secs(4)).await;
        let answering = stored(&state, room.id).await;
        assert_eq!(answering.state, RoomState::Answering);
        assert_eq!(answering.answering_player.as_ref().unwrap().id, "p2");
        assert_eq!(answering.player("p1").unwrap().score, -100);
        assert_eq!(answering.player("p2").unwrap().score, 0);
        assert!(room_events.next().now_or_never().is_none());
        assert!(signals.next().now_or_never().is_none());

        sleep(Duration::from_secs(2)).await;
        let ended = stored(&state, room.id).await;
        assert_eq!(ended.state, RoomState::SelectingQuestion);
        assert_eq!(ended.player("p1").unwrap().score, -100);
        assert_eq!(ended.player("p2").unwrap().score, -100);
        next_of(&mut room_events, Event::RoomUpdated).await;
        next_of(&mut signals, Event::QuestionEnded).await;
    }

    #[tokio::test(start_paused = true)]
    async fn reveal_deadline_moved_by_a_false_start_is_ignored() {
        let (state, _) = test_state().await;
        let mut room = started_room(2);
        room.options.false_start_allowed = true;
        let selector = room.current_player.clone().unwrap();
        room.select_question(&selector, &sample_pack(), "History", 0, state.now())
            .unwrap();
        let first_reveal_end = room.current_question.as_ref().unwrap().timer_starts_at;
        install(&state, &room).await;
        to_internal(&state, room.id, Message::signal(Event::RevealingStarted));

        // p1 buzzes early and is wrong; the reveal resumes 400ms later than planned.
        sleep(Duration::from_millis(200)).await;
        let buzzed = state.now();
        sleep(Duration::from_millis(400)).await;
        let validated = state.now();
        let resumed = state
            .rooms()
            .safe_set(room.id, |room| {
                room.submit_answer("p1", buzzed)?;
                room.validate_answer("host", false, validated)?;
                Ok::<_, DeferredError>(())
            })
            .await
            .unwrap();
        assert_eq!(resumed.state, RoomState::RevealingQuestion);
        let shifted_reveal_end = resumed.current_question.as_ref().unwrap().timer_starts_at;
        assert_eq!(
            shifted_reveal_end,
            first_reveal_end.map(|end| end + Duration::from_millis(400))
        );
        to_internal(&state, room.id, Message::signal(Event::RevealingStarted));
        let topic = state.topics().channel(room_topic(room.id));
        let mut room_events = topic.receive();

        // The first deadline passes while the room is still revealing.
        sleep(Duration::from_millis(700)).await;
        let revealing = stored(&state, room.id).await;
        assert_eq!(revealing.state, RoomState::RevealingQuestion);
        assert_eq!(
            revealing.current_question.as_ref().unwrap().timer_starts_at,
            shifted_reveal_end
        );
        assert!(room_events.next().now_or_never().is_none());

        sleep(Duration::from_millis(400)).await;
        let showing = stored(&state, room.id).await;
        assert_eq!(showing.state, RoomState::ShowingQuestion);
        next_of(&mut room_events, Event::RoomUpdated).await;
    }

    #[tokio::test]
    async fn answer_is_shown_even_when_the_next_question_was_picked_first() {
        let (state, _) = test_state().await;
        let pack = sample_pack();
        let mut room = started_room(2);
        let selector = room.current_player.clone().unwrap();
        room.select_question(&selector, &pack, "Science", 0, state.now())
            .unwrap();
        install(&state, &room).await;
        let topic = state.topics().channel(room_topic(room.id));
        let mut events = topic.receive();

        let question = pack.question("Warm-up", "History", 0).unwrap().clone();
        to_internal(&state, room.id, Message::question_ended(question));

        let demo: CorrectAnswerDemoPayload = next_of(&mut events, Event::CorrectAnswerDemo)
            .await
            .payload()
            .unwrap();
        assert_eq!(demo.answers, vec!["Caesar".to_string()]);
        assert_eq!(stored(&state, room.id).await, room);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_bets_count_as_zero_and_top_bettor_answers() {
        let (state, _) = test_state().await;
        let mut room = started_room(2);
        room.players[0].score = 100;
        room.players[1].score = 50;
        let selector = room.current_player.clone().unwrap();
        room.select_question(&selector, &sample_pack(), "History", 1, state.now())
            .unwrap();
        room.place_bet("p1", 60, state.now()).unwrap();
        assert_eq!(room.state, RoomState::Betting);
        install(&state, &room).await;

        to_internal(&state, room.id, Message::signal(Event::BettingStarted));
        sleep(Duration::from_secs(31)).await;
        let answering = stored(&state, room.id).await;
        assert_eq!(answering.state, RoomState::Answering);
        assert_eq!(answering.answering_player.as_ref().unwrap().id, "p1");
        assert_eq!(answering.player("p2").unwrap().bet_amount, Some(0));

        // The auction answer runs on its own deadline.
        sleep(Duration::from_secs(7)).await;
        let ended = stored(&state, room.id).await;
        assert_eq!(ended.state, RoomState::SelectingQuestion);
        assert_eq!(ended.player("p1").unwrap().score, 40);
        assert_eq!(ended.player("p2").unwrap().score, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn unpassed_cat_in_bag_goes_to_someone_else() {
        let (state, _) = test_state().await;
        let mut room = started_room(3);
        let selector = room.current_player.clone().unwrap();
        room.select_question(&selector, &sample_pack(), "History", 2, state.now())
            .unwrap();
        assert_eq!(room.state, RoomState::Passing);
        install(&state, &room).await;

        to_internal(&state, room.id, Message::signal(Event::PassingStarted));
        sleep(Duration::from_secs(31)).await;

        let passed = stored(&state, room.id).await;
        assert_eq!(passed.state, RoomState::Answering);
        assert_ne!(passed.answering_player.as_ref().unwrap().id, selector);
    }

    #[tokio::test]
    async fn exhausted_board_moves_to_the_next_round() {
        let (state, _) = test_state().await;
        let pack = sample_pack();
        let mut room = started_room(1);
        for question in room.current_round_questions.values_mut().flatten() {
            question.has_been_played = true;
        }
        install(&state, &room).await;
        let topic = state.topics().channel(room_topic(room.id));
        let mut events = topic.receive();

        let question = pack.question("Warm-up", "Science", 1).unwrap().clone();
        to_internal(&state, room.id, Message::question_ended(question));

        let demo: CorrectAnswerDemoPayload = next_of(&mut events, Event::CorrectAnswerDemo)
            .await
            .payload()
            .unwrap();
        assert_eq!(demo.answers, vec!["299792".to_string()]);
        let round: RoundDemoPayload = next_of(&mut events, Event::RoundDemo)
            .await
            .payload()
            .unwrap();
        assert_eq!(round.name, "Deep Dive");
        assert_eq!(round.categories, vec!["Music".to_string()]);
        let next = stored(&state, room.id).await;
        assert_eq!(next.state, RoomState::SelectingQuestion);
        assert_eq!(next.current_round_name.as_deref(), Some("Deep Dive"));
    }

    #[tokio::test(start_paused = true)]
    async fn final_bets_timing_out_at_zero_end_the_game() {
        let (state, archive) = test_state().await;
        let pack = sample_pack();
        let mut room = started_room(2);
        room.players[0].score = 100;
        assert!(room.start_final_round(&pack));
        room.remove_final_round_category(&pack, "host", "Art").unwrap();
        room.remove_final_round_category(&pack, "host", "Film").unwrap();
        assert_eq!(room.state, RoomState::FinalRoundBetting);
        install(&state, &room).await;
        let lobby = state.topics().channel(LOBBY_TOPIC);
        let mut lobby_events = lobby.receive();

        to_internal(&state, room.id, Message::signal(Event::FinalRoundBettingStarted));
        sleep(Duration::from_secs(31)).await;

        let over = stored(&state, room.id).await;
        assert_eq!(over.state, RoomState::GameOver);
        assert_eq!(over.player("p1").unwrap().score, 100);
        let archived = archive.list_created_by("host".into()).await.unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].state, RoomState::GameOver);
        let update = next_of(&mut lobby_events, Event::RoomUpdated).await;
        assert_eq!(update.payload["id"], serde_json::json!(room.id));

        sleep(Duration::from_secs(300)).await;
        assert!(state.rooms().get_by_id(room.id).await.is_err());
        next_of(&mut lobby_events, Event::RoomDeleted).await;
    }

    #[tokio::test(start_paused = true)]
    async fn final_question_closes_when_time_runs_out() {
        let (state, _) = test_state().await;
        let pack = sample_pack();
        let mut room = started_room(2);
        room.players[0].score = 100;
        room.start_final_round(&pack);
        room.remove_final_round_category(&pack, "host", "Art").unwrap();
        room.remove_final_round_category(&pack, "host", "Space").unwrap();
        room.place_final_round_bet("p1", 50, state.now()).unwrap();
        assert_eq!(room.state, RoomState::ShowingFinalRoundQuestion);
        install(&state, &room).await;

        to_internal(&state, room.id, Message::signal(Event::FinalRoundQuestionStarted));
        sleep(Duration::from_secs(29)).await;
        assert_eq!(
            stored(&state, room.id).await.state,
            RoomState::ShowingFinalRoundQuestion
        );

        sleep(Duration::from_secs(2)).await;
        let validating = stored(&state, room.id).await;
        assert_eq!(validating.state, RoomState::ValidatingFinalRoundAnswers);
        assert_eq!(validating.current_player.as_deref(), Some("p1"));
    }

    #[tokio::test(start_paused = true)]
    async fn connected_members_keep_the_room_alive() {
        let (state, _) = test_state().await;
        let room = room_with_players(1);
        install(&state, &room).await;

        to_internal(&state, room.id, Message::user_disconnected("p1".into()));
        sleep(Duration::from_secs(400)).await;

        assert_eq!(stored(&state, room.id).await, room);
    }
}
