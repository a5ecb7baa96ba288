//! Supabase REST API client using service_role key

use reqwest::Client;
use serde::Serialize;

use crate::config::Config;

/// Supabase client for server-side inserts
/// Uses service_role key which bypasses RLS - handle with care!
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_role_key: String,
}

impl SupabaseClient {
    pub fn new(base_url: impl Into<String>, service_role_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_role_key: service_role_key.into(),
        }
    }

    /// Client for the configured project, if both URL and key are set
    pub fn from_config(config: &Config) -> Option<Self> {
        match (&config.supabase_url, &config.supabase_service_role_key) {
            (Some(url), Some(key)) => Some(Self::new(url.clone(), key.clone())),
            _ => None,
        }
    }

    /// Get the REST API URL for a table
    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Get the REST API URL for a stored procedure
    pub fn rpc_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, function)
    }

    /// Make an authenticated POST request (insert), discarding the inserted row
    pub async fn insert<T: Serialize>(&self, table: &str, data: &T) -> Result<(), SupabaseError> {
        self.post(&self.rest_url(table), data).await
    }

    /// Call a Postgres function; arguments are passed as named JSON fields
    pub async fn rpc<T: Serialize>(&self, function: &str, args: &T) -> Result<(), SupabaseError> {
        self.post(&self.rpc_url(function), args).await
    }

    async fn post<T: Serialize>(&self, url: &str, data: &T) -> Result<(), SupabaseError> {
        let response = self
            .client
            .post(url)
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SupabaseError::Api { status: status.as_u16(), body });
        }

        Ok(())
    }
}

/// Supabase errors
#[derive(Debug, thiserror::Error)]
pub enum SupabaseError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_url_strips_trailing_slash() {
        let client = SupabaseClient::new("https://example.supabase.co/", "key");
        assert_eq!(client.rest_url("kills"), "https://example.supabase.co/rest/v1/kills");
        assert_eq!(
            client.rpc_url("record_player_stats"),
            "https://example.supabase.co/rest/v1/rpc/record_player_stats"
        );
    }
}
