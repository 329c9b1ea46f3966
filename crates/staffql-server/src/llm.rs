//! Natural language to SQL translation through an Ollama generate endpoint

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LlmConfig;

/// Instructions, column descriptions and worked examples sent ahead of every question
const PROMPT_PREAMBLE: &str = r#"
Tu es un assistant SQL pour une base DuckDB. Ta tâche est de transformer les questions en langage naturel en requêtes SQL valides.

Voici les colonnes disponibles :
- datenais (date) : date de naissance
- educ (float) : nombre d'années d'éducation
- sexe (string) : m = masculin, f = féminin
- salact (float) : salaire actuel
- saldeb (float) : salaire de debut de carrière
- exp (float) : nombre de mois d'expérience

Exemples :
- "Quels sont les employés de plus de 50 ans ?" => SELECT * FROM data WHERE age > 50
- "Les salariés ayant plus de 10 ans d'ancienneté" => SELECT * FROM data WHERE exp > 10 * 12
- "Quel est le salaire moyen des employés ?" => SELECT AVG(salact) FROM data
- "Quel est le salaire moyen des employés de sexe masculin ?" => SELECT AVG(salact) FROM data WHERE sexe = 'm'
- "Quel est le salaire moyen des employés de sexe féminin ?" => SELECT AVG(salact) FROM data WHERE sexe = 'f'


N’inclus jamais de texte naturel, uniquement du SQL.
"#;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("LLM request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("LLM endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),
}

/// Turns a question into a candidate SQL string
///
/// The output is untrusted: callers must screen it exactly like user SQL.
#[async_trait]
pub trait SqlTranslator: Send + Sync {
    async fn translate(&self, question: &str, limit: Option<i64>) -> Result<String, TranslateError>;
}

/// Build the full prompt for `question`
///
/// The limit hint is left out when there is no non-zero limit to suggest.
pub fn build_prompt(question: &str, limit: Option<i64>) -> String {
    let mut prompt = String::from(PROMPT_PREAMBLE);
    if let Some(limit) = limit.filter(|l| *l != 0) {
        prompt.push_str(&format!("Ajoute LIMIT {} à la fin si nécessaire.\n", limit));
    }
    prompt.push_str(&format!("\nMaintenant, question : {}\nRequête SQL :\n", question));
    prompt
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// [`SqlTranslator`] backed by Ollama's `/api/generate`, non-streaming
pub struct OllamaTranslator {
    api_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaTranslator {
    pub fn new(api_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(&config.api_url, &config.model)
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl SqlTranslator for OllamaTranslator {
    async fn translate(&self, question: &str, limit: Option<i64>) -> Result<String, TranslateError> {
        let prompt = build_prompt(question, limit);
        let request = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            stream: false,
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&request)
            .send()
            .await
            .map_err(TranslateError::Request)?;

        let status = response.status();
        let body = response.text().await.map_err(TranslateError::Request)?;
        if !status.is_success() {
            return Err(TranslateError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&body).map_err(|e| TranslateError::MalformedResponse(e.to_string()))?;

        tracing::info!(model = %self.model, "LLM response: {}", parsed.response.trim());
        Ok(parsed.response.trim().to_string())
    }
}
