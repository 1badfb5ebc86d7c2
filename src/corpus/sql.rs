use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use super::{Corpus, CorpusExtractor, DataSourceError, Document};
use crate::core::config::settings::DatabaseSettings;
use crate::core::config::AppPaths;

const FAQ_QUERY: &str = "SELECT CAST(question AS TEXT) AS question, CAST(answer AS TEXT) AS answer
     FROM faq_table";

const TICKET_QUERY: &str = "SELECT CAST(ticket_id AS TEXT) AS ticket_id,
        CAST(customer_query AS TEXT) AS customer_query,
        CAST(resolution AS TEXT) AS resolution
     FROM tickets
     WHERE status = 'resolved'";

pub fn render_faq(question: &str, answer: &str) -> String {
    format!("Question: {}\nAnswer: {}", question, answer)
}

pub fn render_ticket(ticket_id: &str, query: &str, resolution: &str) -> String {
    format!(
        "Ticket: {}\nQuery: {}\nResolution: {}",
        ticket_id, query, resolution
    )
}

/// Reads FAQ pairs and resolved tickets from their SQL databases.
///
/// A fresh read-only connection is opened for every extraction, so an
/// unreachable store surfaces when a build runs rather than at start-up.
#[derive(Debug, Clone)]
pub struct SqlCorpusExtractor {
    faq_url: String,
    ticketing_url: String,
}

impl SqlCorpusExtractor {
    pub fn new(faq_url: impl Into<String>, ticketing_url: impl Into<String>) -> Self {
        Self {
            faq_url: faq_url.into(),
            ticketing_url: ticketing_url.into(),
        }
    }

    pub fn from_settings(settings: &DatabaseSettings, paths: &AppPaths) -> Self {
        Self::new(settings.faq_url(paths), settings.ticketing_url(paths))
    }

    fn url_for(&self, corpus: Corpus) -> &str {
        match corpus {
            Corpus::Faq => &self.faq_url,
            Corpus::Ticket => &self.ticketing_url,
        }
    }

    async fn connect(&self, corpus: Corpus) -> Result<SqlitePool, DataSourceError> {
        let unreachable = |err: sqlx::Error| DataSourceError::Unreachable {
            corpus,
            message: err.to_string(),
        };

        let options = SqliteConnectOptions::from_str(self.url_for(corpus))
            .map_err(unreachable)?
            .read_only(true);

        SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(unreachable)
    }
}

#[async_trait]
impl CorpusExtractor for SqlCorpusExtractor {
    async fn extract(&self, corpus: Corpus) -> Result<Vec<Document>, DataSourceError> {
        let pool = self.connect(corpus).await?;

        let query = match corpus {
            Corpus::Faq => FAQ_QUERY,
            Corpus::Ticket => TICKET_QUERY,
        };

        let result = sqlx::query(query).fetch_all(&pool).await;
        pool.close().await;

        let rows = result.map_err(|err| DataSourceError::Query {
            corpus,
            message: err.to_string(),
        })?;

        let documents = rows
            .iter()
            .map(|row| render_row(corpus, row).map(|content| Document::new(corpus, content)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| DataSourceError::Query {
                corpus,
                message: err.to_string(),
            })?;

        tracing::info!(
            corpus = %corpus,
            documents = documents.len(),
            "Extracted corpus documents"
        );
        Ok(documents)
    }
}

fn render_row(corpus: Corpus, row: &SqliteRow) -> Result<String, sqlx::Error> {
    let text = |column: &str| -> Result<String, sqlx::Error> {
        Ok(row
            .try_get::<Option<String>, _>(column)?
            .unwrap_or_default())
    };

    Ok(match corpus {
        Corpus::Faq => render_faq(&text("question")?, &text("answer")?),
        Corpus::Ticket => render_ticket(
            &text("ticket_id")?,
            &text("customer_query")?,
            &text("resolution")?,
        ),
    })
}
