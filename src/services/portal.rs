// src/services/portal.rs

//! Grade portal access.
//!
//! Every fetch runs in a fresh cookie session, so accounts never share a
//! login.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use scraper::Html;

use crate::error::{AppError, Result};
use crate::models::{Account, PortalConfig};
use crate::services::parse_selector;
use crate::utils::create_session_client;

const POST_CONTROLLER: &str = r"\Objects\Webinfo_Object";
const LOGIN_ACTION: &str = "login";
const NONCE_FIELD: &str = "_nonce";
const SECURE_FIELD: &str = "_f_secure";

/// Source of raw grade report pages.
#[async_trait]
pub trait PortalClient: Send + Sync {
    /// Log in as `account` and return the HTML of its grade overview.
    async fn fetch_report(&self, account: &Account) -> Result<String>;
}

/// Values of the named `<input>` fields of a page, empty when missing.
///
/// The first input with a given name wins.
pub fn extract_hidden_inputs(html: &str, names: &[&str]) -> Result<Vec<(String, String)>> {
    let document = Html::parse_document(html);
    let inputs = parse_selector("input[name]")?;

    let fields = names
        .iter()
        .map(|name| {
            let value = document
                .select(&inputs)
                .find(|input| input.value().attr("name") == Some(*name))
                .and_then(|input| input.value().attr("value"))
                .unwrap_or_default();
            (name.to_string(), value.to_string())
        })
        .collect();
    Ok(fields)
}

/// Client for the Fuxnoten web info portal.
#[derive(Debug, Clone)]
pub struct FuxnotenClient {
    config: PortalConfig,
}

impl FuxnotenClient {
    pub fn new(config: &PortalConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn referrer(&self) -> String {
        format!("{}/", self.config.login_url.trim_end_matches('/'))
    }

    async fn get(&self, client: &Client, url: &str, label: &str, username: &str) -> Result<Response> {
        if self.config.show_requests {
            log::info!("HTTP GET {url} (username={username})");
        }
        let response = client
            .get(url)
            .header(reqwest::header::REFERER, &self.config.login_url)
            .send()
            .await?;
        log::info!("{label} response ({})", response.status().as_u16());
        Ok(response)
    }

    /// Read a response body, logging it when response logging is enabled.
    async fn body(&self, response: Response, label: &str) -> Result<String> {
        let body = response.text().await?;
        if self.config.show_responses {
            log::info!("{label} body: {body}");
        }
        Ok(body)
    }

    async fn fetch_local(&self, client: &Client) -> Result<String> {
        let url = &self.config.debug_local_url;
        let response = self.get(client, url, "Local page", "-").await?;
        ensure_ok(&response)?;
        self.body(response, "Local page").await
    }

    async fn login(&self, client: &Client, username: &str, password: &str) -> Result<()> {
        let login_url = &self.config.login_url;

        let response = self.get(client, login_url, "Login page", username).await?;
        let page = self.body(response, "Login page").await?;
        let hidden = extract_hidden_inputs(&page, &[NONCE_FIELD, SECURE_FIELD])?;

        let referrer = self.referrer();
        let mut form: Vec<(&str, &str)> = vec![
            ("user", username),
            ("password", password),
            ("fuxnoten_post_controller", POST_CONTROLLER),
            ("acount_action", LOGIN_ACTION),
            ("_referrer", &referrer),
        ];
        form.extend(hidden.iter().map(|(name, value)| (name.as_str(), value.as_str())));

        if self.config.show_requests {
            log::info!("HTTP POST {login_url} (username={username})");
        }
        let response = client
            .post(login_url)
            .header(reqwest::header::REFERER, login_url)
            .form(&form)
            .send()
            .await?;
        let status = response.status();
        let final_url = response.url().clone();
        log::info!("Login POST response ({})", status.as_u16());
        self.body(response, "Login POST").await?;

        if status != StatusCode::OK || !final_url.path().contains(&self.config.success_path) {
            return Err(AppError::Login {
                status: status.as_u16(),
                url: final_url.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PortalClient for FuxnotenClient {
    async fn fetch_report(&self, account: &Account) -> Result<String> {
        let client = create_session_client(&self.config)?;

        if self.config.debug_local {
            return self.fetch_local(&client).await;
        }

        let (Some(username), Some(password)) = (&account.username, &account.password) else {
            return Err(AppError::config(format!(
                "account '{}' has no credentials",
                account.name
            )));
        };

        self.login(&client, username, password).await?;

        let grades_url = &self.config.grades_url;
        let response = self.get(&client, grades_url, "Grade overview", username).await?;
        ensure_ok(&response)?;
        self.body(response, "Grade overview").await
    }
}

fn ensure_ok(response: &Response) -> Result<()> {
    let status = response.status();
    if status != StatusCode::OK {
        return Err(AppError::Portal {
            status: status.as_u16(),
            url: response.url().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_PAGE: &str = r#"
        <form method="post" action="/webinfo">
          <input type="text" name="user">
          <input type="password" name="password">
          <input type="hidden" name="_nonce" value="4f5e7a657d0a88f5">
          <input type="hidden" name="_f_secure" value="">
          <input type="hidden" name="_nonce" value="second">
        </form>
    "#;

    #[test]
    fn test_extract_hidden_inputs() {
        let fields = extract_hidden_inputs(LOGIN_PAGE, &[NONCE_FIELD, SECURE_FIELD]).unwrap();
        assert_eq!(
            fields,
            vec![
                ("_nonce".to_string(), "4f5e7a657d0a88f5".to_string()),
                ("_f_secure".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_missing_inputs_are_empty() {
        let fields = extract_hidden_inputs("<p>Wartung</p>", &[NONCE_FIELD]).unwrap();
        assert_eq!(fields, vec![("_nonce".to_string(), String::new())]);
    }

    #[test]
    fn test_referrer_has_trailing_slash() {
        let mut config = PortalConfig::default();
        config.login_url = "https://portal.example/webinfo".into();
        assert_eq!(FuxnotenClient::new(&config).referrer(), "https://portal.example/webinfo/");

        config.login_url = "https://portal.example/webinfo/".into();
        assert_eq!(FuxnotenClient::new(&config).referrer(), "https://portal.example/webinfo/");
    }

    #[tokio::test]
    async fn test_missing_credentials_rejected() {
        let client = FuxnotenClient::new(&PortalConfig::default());
        let account = Account {
            name: "Anna".into(),
            username: Some("anna".into()),
            password: None,
        };
        let err = client.fetch_report(&account).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
