//! Immutable question packs played in a room.

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::room::{BoardQuestion, CurrentRoundQuestions, RoomError};

/// Characters a player is expected to read per second while a question is revealed.
const READING_SYMBOLS_PER_SECOND: f64 = 30.0;

/// Question pack: ordered regular rounds followed by the final round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pack {
    /// Unique pack identifier.
    pub id: String,
    /// Title shown to players.
    pub name: String,
    /// Regular rounds in play order.
    pub rounds: Vec<Round>,
    /// Round played after the last regular one.
    pub final_round: FinalRound,
}

/// Reference to a pack stored on a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct PackPreview {
    /// Pack identifier.
    pub id: String,
    /// Pack title.
    pub name: String,
}

/// Regular round: a board of categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Round {
    /// Round name, unique within the pack.
    pub name: String,
    /// Board columns.
    pub categories: Vec<Category>,
}

/// Column of questions on a round board.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    /// Category name, unique within the round.
    pub name: String,
    /// Questions by ascending value.
    pub questions: Vec<Question>,
}

/// Kind of media an attachment holds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Still picture.
    Image,
    /// Sound clip.
    Audio,
    /// Video clip.
    Video,
}

/// Media shown alongside a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// How clients should render the content.
    pub media_type: MediaType,
    /// Where clients fetch the media.
    pub content_url: String,
    /// Playback length in seconds, added to the reveal window.
    #[serde(default)]
    pub duration: u64,
}

/// How a question is routed once selected from the board.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum QuestionType {
    /// Every player may answer once the reveal ends.
    Regular,
    /// Players with a positive score bet; the top bettor answers alone.
    Auction,
    /// The selector hands the question to another player.
    CatInBag,
}

/// Board question with its answer key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Position within its category.
    pub index: usize,
    /// Points won or lost.
    pub value: i64,
    /// Media played during the reveal.
    #[serde(default)]
    pub attachment: Option<Attachment>,
    /// Routing once selected.
    #[serde(rename = "type")]
    pub kind: QuestionType,
    /// Question as read to players.
    pub text: String,
    /// Accepted answers.
    pub answers: Vec<String>,
    /// Trivia shown with the answer.
    #[serde(default)]
    pub comment: Option<String>,
}

impl Question {
    /// Time needed to read the text and play the attachment before answering opens.
    pub fn revealing_duration(&self) -> Duration {
        let text = Duration::from_secs_f64(self.text.len() as f64 / READING_SYMBOLS_PER_SECOND);
        let attachment = self
            .attachment
            .as_ref()
            .map(|attachment| Duration::from_secs(attachment.duration))
            .unwrap_or_default();
        text + attachment
    }

    /// Answer key revealed once the question is over.
    pub fn correct_answer(&self) -> CorrectAnswer {
        CorrectAnswer {
            answers: self.answers.clone(),
            comment: self.comment.clone(),
        }
    }
}

/// Categories of the final round, one question each.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalRound {
    /// Candidates struck out until one is left.
    pub categories: Vec<FinalRoundCategory>,
}

impl FinalRound {
    /// Every final category, all still available.
    pub fn available_categories(&self) -> IndexMap<String, bool> {
        self.categories
            .iter()
            .map(|category| (category.name.clone(), true))
            .collect()
    }

    /// Question of the named final category.
    pub fn question(&self, category: &str) -> Option<&FinalRoundQuestion> {
        self.categories
            .iter()
            .find(|candidate| candidate.name == category)
            .map(|candidate| &candidate.question)
    }
}

/// Final round category and its single question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalRoundCategory {
    /// Category name.
    pub name: String,
    /// Question played if the category survives.
    pub question: FinalRoundQuestion,
}

/// Question of the final round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalRoundQuestion {
    /// Question as read to finalists.
    pub text: String,
    /// Media shown with the question.
    #[serde(default)]
    pub attachment: Option<Attachment>,
    /// Accepted answers.
    pub answers: Vec<String>,
    /// Trivia shown with the answer.
    #[serde(default)]
    pub comment: Option<String>,
}

impl FinalRoundQuestion {
    /// Answer key revealed once every finalist is judged.
    pub fn correct_answer(&self) -> CorrectAnswer {
        CorrectAnswer {
            answers: self.answers.clone(),
            comment: self.comment.clone(),
        }
    }
}

/// Answer key revealed to everyone once a question is over.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorrectAnswer {
    /// Accepted answers.
    pub answers: Vec<String>,
    /// Trivia shown with the answers.
    pub comment: Option<String>,
}

impl Pack {
    /// Reference stored on rooms and listings.
    pub fn preview(&self) -> PackPreview {
        PackPreview {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }

    /// Position of the named round.
    pub fn round_index(&self, name: &str) -> Option<usize> {
        self.rounds.iter().position(|round| round.name == name)
    }

    /// Round by name.
    pub fn round(&self, name: &str) -> Option<&Round> {
        self.rounds.iter().find(|round| round.name == name)
    }

    /// Look up a board question of the given round.
    pub fn question(
        &self,
        round_name: &str,
        category_name: &str,
        index: usize,
    ) -> Result<&Question, RoomError> {
        let round = self
            .round(round_name)
            .ok_or_else(|| RoomError::NotFound(format!("no round \"{round_name}\"")))?;
        let category = round
            .categories
            .iter()
            .find(|category| category.name == category_name)
            .ok_or_else(|| {
                RoomError::NotFound(format!(
                    "no category \"{category_name}\" in round \"{round_name}\""
                ))
            })?;
        category
            .questions
            .iter()
            .find(|question| question.index == index)
            .ok_or_else(|| {
                RoomError::NotFound(format!(
                    "no question with index \"{index}\" in category \"{category_name}\" in round \"{round_name}\""
                ))
            })
    }
}

impl Round {
    /// Fresh board for this round, nothing played yet.
    pub fn board(&self) -> CurrentRoundQuestions {
        self.categories
            .iter()
            .map(|category| {
                let questions = category
                    .questions
                    .iter()
                    .map(|question| BoardQuestion {
                        index: question.index,
                        value: question.value,
                        has_been_played: false,
                    })
                    .collect();
                (category.name.clone(), questions)
            })
            .collect()
    }

    /// Category names in board order.
    pub fn category_names(&self) -> Vec<String> {
        self.categories
            .iter()
            .map(|category| category.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(text: &str, attachment: Option<Attachment>) -> Question {
        Question {
            index: 0,
            value: 100,
            attachment,
            kind: QuestionType::Regular,
            text: text.into(),
            answers: vec!["answer".into()],
            comment: None,
        }
    }

    #[test]
    fn revealing_duration_counts_text_and_attachment() {
        let plain = question(&"a".repeat(60), None);
        assert_eq!(plain.revealing_duration(), Duration::from_secs(2));

        let with_media = question(
            &"a".repeat(30),
            Some(Attachment {
                media_type: MediaType::Audio,
                content_url: "https://example.org/a.mp3".into(),
                duration: 4,
            }),
        );
        assert_eq!(with_media.revealing_duration(), Duration::from_secs(5));
    }

    #[test]
    fn question_type_uses_camel_case_tags() {
        let kind: QuestionType = serde_json::from_str("\"catInBag\"").unwrap();
        assert_eq!(kind, QuestionType::CatInBag);
        assert_eq!(
            serde_json::to_string(&QuestionType::Auction).unwrap(),
            "\"auction\""
        );
    }
}
