use uuid::Uuid;

use super::{
    pack::{Category, FinalRound, FinalRoundCategory, FinalRoundQuestion, Pack, Question, QuestionType, Round},
    room::{PrivacyType, Room, RoomOptions},
    user::{Host, Player, User},
};

pub(crate) fn user(id: &str) -> User {
    User {
        id: id.into(),
        name: format!("{id} name"),
        avatar: None,
    }
}

fn question(index: usize, value: i64, kind: QuestionType, text: &str, answer: &str) -> Question {
    Question {
        index,
        value,
        attachment: None,
        kind,
        text: text.into(),
        answers: vec![answer.into()],
        comment: Some(format!("{answer} is right")),
    }
}

fn final_category(name: &str, text: &str, answer: &str) -> FinalRoundCategory {
    FinalRoundCategory {
        name: name.into(),
        question: FinalRoundQuestion {
            text: text.into(),
            attachment: None,
            answers: vec![answer.into()],
            comment: None,
        },
    }
}

/// Two regular rounds and a three-category final.
pub(crate) fn sample_pack() -> Pack {
    Pack {
        id: "pack-1".into(),
        name: "Sample pack".into(),
        rounds: vec![
            Round {
                name: "Warm-up".into(),
                categories: vec![
                    Category {
                        name: "History".into(),
                        questions: vec![
                            question(0, 100, QuestionType::Regular, "Who crossed the Rubicon in 49 BC?", "Caesar"),
                            question(1, 200, QuestionType::Auction, "Year the Berlin Wall fell?", "1989"),
                            question(2, 300, QuestionType::CatInBag, "First emperor of Rome?", "Augustus"),
                        ],
                    },
                    Category {
                        name: "Science".into(),
                        questions: vec![
                            question(0, 200, QuestionType::Regular, "Chemical symbol for gold?", "Au"),
                            question(1, 400, QuestionType::Regular, "Speed of light in vacuum, km/s?", "299792"),
                        ],
                    },
                ],
            },
            Round {
                name: "Deep Dive".into(),
                categories: vec![Category {
                    name: "Music".into(),
                    questions: vec![question(0, 500, QuestionType::Regular, "Composer of the Goldberg Variations?", "Bach")],
                }],
            },
        ],
        final_round: FinalRound {
            categories: vec![
                final_category("Art", "Painter of the Night Watch?", "Rembrandt"),
                final_category("Space", "Planet with Olympus Mons?", "Mars"),
                final_category("Film", "Director of Stalker (1979)?", "Tarkovsky"),
            ],
        },
    }
}

pub(crate) fn room_options() -> RoomOptions {
    RoomOptions {
        max_players: 10,
        privacy: PrivacyType::Public,
        password: None,
        question_thinking_time: 10,
        answer_thinking_time: 5,
        question_thinking_time_final: 30,
        false_start_allowed: false,
    }
}

/// Room created by `host` with a connected host and `players` connected players `p1..pN`.
pub(crate) fn room_with_players(players: usize) -> Room {
    let pack = sample_pack();
    let mut room = Room::new(
        Uuid::new_v4(),
        "Friday quiz".into(),
        pack.preview(),
        room_options(),
        "host".into(),
    );
    let mut host = Host::new(user("host"));
    host.is_connected = true;
    room.host = Some(host);
    room.players = (1..=players)
        .map(|n| {
            let mut player = Player::new(user(&format!("p{n}")));
            player.is_connected = true;
            player
        })
        .collect();
    room
}
