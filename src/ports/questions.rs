//! # Question Bank
//!
//! `QuestionSource` backed by a TOML file of question records:
//!
//! ```toml
//! [[questions]]
//! id = "be-sr-1"
//! job_role = "Backend Engineer"
//! job_level = "Senior"
//! question_type = "Behavioral"
//! text = "Tell me about a time you led a difficult migration."
//! ```
//!
//! Role, level, and type are matched case-insensitively. File order is kept.

use crate::ports::QuestionSource;
use crate::session::{Question, SessionMetadata};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
struct BankEntry {
    id: String,
    job_role: String,
    job_level: String,
    question_type: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct BankFile {
    #[serde(default)]
    questions: Vec<BankEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    entries: Vec<BankEntry>,
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

impl QuestionBank {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: BankFile = toml::from_str(contents).context("invalid question bank")?;
        Ok(Self { entries: file.questions })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("cannot read question bank {}", path.display()))?;
        let bank = Self::from_toml_str(&contents)?;
        info!("Loaded {} questions from {}", bank.len(), path.display());
        Ok(bank)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn matching(&self, metadata: &SessionMetadata) -> Vec<Question> {
        let role = normalize(&metadata.job_role);
        let level = normalize(&metadata.job_level);
        let kind = normalize(&metadata.question_type);

        self.entries
            .iter()
            .filter(|e| normalize(&e.job_role) == role && normalize(&e.job_level) == level)
            .filter(|e| normalize(&e.question_type) == kind)
            .map(|e| Question::new(e.id.clone(), e.text.clone()))
            .collect()
    }
}

#[async_trait]
impl QuestionSource for QuestionBank {
    async fn fetch_questions(&self, metadata: &SessionMetadata) -> Result<Vec<Question>> {
        Ok(self.matching(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANK: &str = r#"
        [[questions]]
        id = "a"
        job_role = "Backend Engineer"
        job_level = "Senior"
        question_type = "Behavioral"
        text = "First?"

        [[questions]]
        id = "b"
        job_role = "Backend Engineer"
        job_level = "Junior"
        question_type = "Behavioral"
        text = "Other level?"

        [[questions]]
        id = "c"
        job_role = "backend engineer"
        job_level = "SENIOR"
        question_type = "behavioral"
        text = "Second?"
    "#;

    fn metadata(role: &str, level: &str, kind: &str) -> SessionMetadata {
        SessionMetadata {
            candidate_name: "Ada".to_string(),
            job_role: role.to_string(),
            job_level: level.to_string(),
            question_type: kind.to_string(),
            custom_instruction: None,
        }
    }

    #[test]
    fn test_case_insensitive_match_keeps_order() {
        let bank = QuestionBank::from_toml_str(BANK).unwrap();
        assert_eq!(bank.len(), 3);

        let found = bank.matching(&metadata(" Backend Engineer", "senior", "BEHAVIORAL"));
        let ids: Vec<_> = found.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_no_match_is_empty() {
        let bank = QuestionBank::from_toml_str(BANK).unwrap();
        let found = bank.fetch_questions(&metadata("Designer", "Senior", "Behavioral")).await.unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(QuestionBank::from_toml_str("[[questions]]\nid = 1").is_err());
    }

    #[test]
    fn test_bundled_bank_parses() {
        let contents = include_str!("../../questions.toml");
        let bank = QuestionBank::from_toml_str(contents).unwrap();
        assert!(!bank.is_empty());
    }
}
