//! Static quiz bank loaded once at startup.

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::dao::models::{BatchId, QuestionId};

/// Minimum number of answer options a question must offer.
pub const MIN_OPTIONS: usize = 2;

/// Reasons a quiz bank is rejected.
#[derive(Debug, Error)]
pub enum ContentError {
    /// The bank file could not be read.
    #[error("failed to read quiz bank `{path}`")]
    Read {
        /// Path that was tried.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The bank is not valid JSON of the expected shape.
    #[error("failed to parse quiz bank")]
    Parse(#[from] serde_json::Error),
    /// `quiz_batches` is empty.
    #[error("quiz bank contains no batches")]
    NoBatches,
    /// A batch has no questions.
    #[error("batch `{batch_id}` contains no questions")]
    EmptyBatch {
        /// The empty batch.
        batch_id: BatchId,
    },
    /// Two batches share an id.
    #[error("batch id `{batch_id}` appears more than once")]
    DuplicateBatch {
        /// The repeated id.
        batch_id: BatchId,
    },
    /// Question ids must be unique across the whole bank.
    #[error("question id `{question_id}` appears more than once")]
    DuplicateQuestion {
        /// The repeated id.
        question_id: QuestionId,
    },
    /// A question offers fewer than two options.
    #[error("question `{question_id}` has {count} option(s), at least {MIN_OPTIONS} required")]
    TooFewOptions {
        /// The question.
        question_id: QuestionId,
        /// Options it has.
        count: usize,
    },
    /// `correct_answer` does not index an option.
    #[error("question `{question_id}` marks option {index} correct but has {count} option(s)")]
    CorrectAnswerOutOfRange {
        /// The question.
        question_id: QuestionId,
        /// Index given as correct.
        index: usize,
        /// Options it has.
        count: usize,
    },
}

/// One multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Unique across the bank.
    pub id: QuestionId,
    /// Owning batch.
    pub batch_id: BatchId,
    /// Question text.
    pub prompt: String,
    /// Answer options, in display order.
    pub options: Vec<String>,
    /// Index into `options` of the right answer.
    pub correct_index: usize,
    /// Shown once the user has answered.
    pub explanation: String,
}

/// Named group of questions delivered in sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizBatch {
    /// Unique batch identifier.
    pub batch_id: BatchId,
    /// Human readable title.
    pub title: String,
    /// Questions in delivery order.
    pub questions: Vec<Question>,
}

#[derive(Debug, Deserialize)]
struct RawBank {
    quiz_batches: Vec<RawBatch>,
}

#[derive(Debug, Deserialize)]
struct RawBatch {
    batch_id: BatchId,
    #[serde(default)]
    title: String,
    questions: Vec<RawQuestion>,
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    id: QuestionId,
    question: String,
    options: Vec<String>,
    correct_answer: usize,
    #[serde(default)]
    explanation: String,
}

impl From<RawBatch> for QuizBatch {
    fn from(raw: RawBatch) -> Self {
        let batch_id = raw.batch_id;
        let questions = raw
            .questions
            .into_iter()
            .map(|question| Question {
                id: question.id,
                batch_id: batch_id.clone(),
                prompt: question.question,
                options: question.options,
                correct_index: question.correct_answer,
                explanation: question.explanation,
            })
            .collect();
        Self {
            batch_id,
            title: raw.title,
            questions,
        }
    }
}

/// Immutable, validated index over every batch and question.
#[derive(Debug, Clone)]
pub struct QuizCatalog {
    batches: IndexMap<BatchId, QuizBatch>,
    questions: HashMap<QuestionId, (usize, usize)>,
}

impl QuizCatalog {
    /// Read and validate the bank at `path`.
    pub fn load(path: &Path) -> Result<Self, ContentError> {
        let contents = fs::read_to_string(path).map_err(|source| ContentError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_json(&contents)?;
        info!(
            path = %path.display(),
            batches = catalog.batch_count(),
            questions = catalog.question_count(),
            "loaded quiz bank"
        );
        Ok(catalog)
    }

    /// Parse and validate a bank in the `{"quiz_batches": [...]}` format.
    pub fn from_json(contents: &str) -> Result<Self, ContentError> {
        let raw: RawBank = serde_json::from_str(contents)?;
        Self::from_batches(raw.quiz_batches.into_iter().map(Into::into).collect())
    }

    /// Validate already-built batches.
    pub fn from_batches(batches: Vec<QuizBatch>) -> Result<Self, ContentError> {
        if batches.is_empty() {
            return Err(ContentError::NoBatches);
        }

        let mut seen_questions = HashSet::new();
        let mut indexed = IndexMap::with_capacity(batches.len());
        let mut questions = HashMap::new();

        for batch in batches {
            if batch.questions.is_empty() {
                return Err(ContentError::EmptyBatch {
                    batch_id: batch.batch_id,
                });
            }
            if indexed.contains_key(&batch.batch_id) {
                return Err(ContentError::DuplicateBatch {
                    batch_id: batch.batch_id,
                });
            }

            let batch_index = indexed.len();
            for (question_index, question) in batch.questions.iter().enumerate() {
                validate_question(question)?;
                if !seen_questions.insert(question.id) {
                    return Err(ContentError::DuplicateQuestion {
                        question_id: question.id,
                    });
                }
                questions.insert(question.id, (batch_index, question_index));
            }
            indexed.insert(batch.batch_id.clone(), batch);
        }

        Ok(Self {
            batches: indexed,
            questions,
        })
    }

    /// Look a question up by id.
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        let (batch_index, question_index) = *self.questions.get(&id)?;
        self.batches
            .get_index(batch_index)
            .and_then(|(_, batch)| batch.questions.get(question_index))
    }

    /// Batch by id.
    pub fn batch(&self, id: &str) -> Option<&QuizBatch> {
        self.batches.get(id)
    }

    /// Batch ids in load order.
    pub fn batch_ids(&self) -> impl Iterator<Item = &BatchId> {
        self.batches.keys()
    }

    /// Number of batches loaded.
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Number of questions across all batches.
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }
}

fn validate_question(question: &Question) -> Result<(), ContentError> {
    let count = question.options.len();
    if count < MIN_OPTIONS {
        return Err(ContentError::TooFewOptions {
            question_id: question.id,
            count,
        });
    }
    if question.correct_index >= count {
        return Err(ContentError::CorrectAnswerOutOfRange {
            question_id: question.id,
            index: question.correct_index,
            count,
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Catalog with `batches` batches of `per_batch` questions each, ids `B1..` and `1..`.
    pub(crate) fn sample_catalog(batches: usize, per_batch: usize) -> QuizCatalog {
        let mut next_id = 0;
        let batches = (1..=batches)
            .map(|b| {
                let batch_id = format!("B{b}");
                let questions = (0..per_batch)
                    .map(|_| {
                        next_id += 1;
                        Question {
                            id: next_id,
                            batch_id: batch_id.clone(),
                            prompt: format!("Question {next_id}?"),
                            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                            correct_index: 1,
                            explanation: format!("Because {next_id}."),
                        }
                    })
                    .collect();
                QuizBatch {
                    batch_id: batch_id.clone(),
                    title: format!("Batch {b}"),
                    questions,
                }
            })
            .collect();
        QuizCatalog::from_batches(batches).unwrap()
    }

    #[test]
    fn parses_bank_format() {
        let json = r#"{
            "quiz_batches": [
                {
                    "batch_id": "grammar",
                    "title": "Grammar",
                    "questions": [
                        {"id": 7, "question": "Pick one", "options": ["x", "y", "z", "w"],
                         "correct_answer": 2, "explanation": "z it is"}
                    ]
                }
            ]
        }"#;

        let catalog = QuizCatalog::from_json(json).unwrap();

        let question = catalog.question(7).unwrap();
        assert_eq!(question.batch_id, "grammar");
        assert_eq!(question.correct_index, 2);
        assert_eq!(catalog.batch("grammar").unwrap().title, "Grammar");
        assert!(catalog.question(8).is_none());
    }

    #[test]
    fn rejects_empty_bank_and_batches() {
        assert!(matches!(
            QuizCatalog::from_json(r#"{"quiz_batches": []}"#),
            Err(ContentError::NoBatches)
        ));
        assert!(matches!(
            QuizCatalog::from_json(r#"{"quiz_batches": [{"batch_id": "b", "questions": []}]}"#),
            Err(ContentError::EmptyBatch { .. })
        ));
    }

    #[test]
    fn rejects_invalid_questions() {
        let mut catalog_batches = vec![QuizBatch {
            batch_id: "b".into(),
            title: String::new(),
            questions: vec![Question {
                id: 1,
                batch_id: "b".into(),
                prompt: "?".into(),
                options: vec!["only".into()],
                correct_index: 0,
                explanation: String::new(),
            }],
        }];
        assert!(matches!(
            QuizCatalog::from_batches(catalog_batches.clone()),
            Err(ContentError::TooFewOptions { count: 1, .. })
        ));

        catalog_batches[0].questions[0].options.push("second".into());
        catalog_batches[0].questions[0].correct_index = 2;
        assert!(matches!(
            QuizCatalog::from_batches(catalog_batches.clone()),
            Err(ContentError::CorrectAnswerOutOfRange { index: 2, .. })
        ));

        catalog_batches[0].questions[0].correct_index = 0;
        let duplicate = catalog_batches[0].questions[0].clone();
        catalog_batches[0].questions.push(duplicate);
        assert!(matches!(
            QuizCatalog::from_batches(catalog_batches),
            Err(ContentError::DuplicateQuestion { question_id: 1 })
        ));
    }

    #[test]
    fn sample_catalog_indexes_every_question() {
        let catalog = sample_catalog(3, 2);
        assert_eq!(catalog.batch_count(), 3);
        assert_eq!(catalog.question_count(), 6);
        assert_eq!(catalog.question(4).unwrap().batch_id, "B2");
    }
}
