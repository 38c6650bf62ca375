//! OAuth2 authorization-code and refresh-token grants.
//!
//! Stateless functions over the account's token endpoint: client
//! credentials go in an HTTP Basic header, grants in a form-encoded body,
//! and successful responses normalize into a [`TokenSet`] stamped with the
//! moment it was issued.

use chrono::Utc;
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicTokenResponse, BasicTokenType};
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl,
    RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
};

use ledgerbridge_common::{Error, Result};

use crate::config::{NetSuiteConfig, REST_SCOPE};
use crate::tokens::TokenSet;

/// Access-token lifetime assumed when the server omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

fn oauth_client(config: &NetSuiteConfig) -> Result<BasicClient> {
    let client = BasicClient::new(
        ClientId::new(config.client_id.clone()),
        Some(ClientSecret::new(config.client_secret.clone())),
        AuthUrl::new(config.authorize_endpoint())
            .map_err(|e| Error::Config(format!("Invalid authorize endpoint: {}", e)))?,
        Some(
            TokenUrl::new(config.token_endpoint())
                .map_err(|e| Error::Config(format!("Invalid token endpoint: {}", e)))?,
        ),
    )
    .set_redirect_uri(
        RedirectUrl::new(config.redirect_uri.clone())
            .map_err(|e| Error::Config(format!("Invalid redirect URI: {}", e)))?,
    )
    .set_auth_type(AuthType::BasicAuth);

    Ok(client)
}

/// Build the URL the user visits to grant access.
///
/// Encodes `response_type=code`, the client id, the redirect URI, the fixed
/// scope set, and the caller-supplied anti-CSRF `state`.
pub fn authorize_url(config: &NetSuiteConfig, state: &str) -> Result<String> {
    let client = oauth_client(config)?;
    let state = state.to_string();

    let (url, _csrf) = client
        .authorize_url(move || CsrfToken::new(state))
        .add_scope(Scope::new(REST_SCOPE.to_string()))
        .url();

    Ok(url.to_string())
}

/// Exchange an authorization code for a token set.
///
/// # Errors
/// - Returns the server's error payload on a rejected grant
pub async fn exchange_code(config: &NetSuiteConfig, code: &str) -> Result<TokenSet> {
    let client = oauth_client(config)?;

    let response = client
        .exchange_code(AuthorizationCode::new(code.to_string()))
        .request_async(async_http_client)
        .await
        .map_err(|e| grant_error("Token exchange failed", e))?;

    token_set_from_response(&response, None)
}

/// Obtain a fresh token set from a refresh token.
///
/// A response that omits a new refresh token keeps the one that was sent.
///
/// # Errors
/// - Returns the server's error payload on a rejected grant (the refresh
///   token was revoked or expired; re-authorization is required)
pub async fn refresh(config: &NetSuiteConfig, refresh_token: &str) -> Result<TokenSet> {
    let client = oauth_client(config)?;

    let response = client
        .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
        .request_async(async_http_client)
        .await
        .map_err(|e| grant_error("Token refresh failed", e))?;

    token_set_from_response(&response, Some(refresh_token))
}

/// Normalize a provider token response, stamping `issued_at = now`.
fn token_set_from_response(
    response: &BasicTokenResponse,
    previous_refresh_token: Option<&str>,
) -> Result<TokenSet> {
    let access_token = response.access_token().secret().clone();

    let refresh_token = response
        .refresh_token()
        .map(|t| t.secret().clone())
        .or_else(|| previous_refresh_token.map(|t| t.to_string()))
        .ok_or_else(|| Error::OAuth("No refresh token in token response".to_string()))?;

    let expires_in = response
        .expires_in()
        .map(|d| d.as_secs())
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);

    let token_type = match response.token_type() {
        BasicTokenType::Bearer => "Bearer".to_string(),
        other => format!("{:?}", other),
    };

    Ok(TokenSet {
        access_token,
        refresh_token,
        expires_in,
        token_type,
        issued_at: Utc::now(),
    })
}

/// Flatten a grant failure into one OAuth error, keeping the server's
/// payload when there is one.
fn grant_error<RE>(action: &str, err: RequestTokenError<RE, BasicErrorResponse>) -> Error
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => {
            Error::OAuth(format!("{}: {}", action, response))
        }
        RequestTokenError::Request(e) => Error::OAuth(format!("{}: request error: {}", action, e)),
        RequestTokenError::Parse(e, body) => Error::OAuth(format!(
            "{}: unparseable token response: {} ({})",
            action,
            e,
            String::from_utf8_lossy(&body)
        )),
        RequestTokenError::Other(message) => Error::OAuth(format!("{}: {}", action, message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerbridge_common::AccountId;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> NetSuiteConfig {
        NetSuiteConfig::new(
            AccountId::new("1234567").unwrap(),
            "client-id",
            "client-secret",
            "https://localhost/callback",
            "seal-key",
        )
        .unwrap()
    }

    #[test]
    fn test_authorize_url_parameters() {
        let config = test_config();
        let url = authorize_url(&config, "anti-csrf-state").unwrap();

        assert!(url.starts_with("https://1234567.app.netsuite.com/app/login/oauth2/authorize.nl"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("state=anti-csrf-state"));
        assert!(url.contains("scope=rest_webservices"));
    }

    #[tokio::test]
    async fn test_exchange_code_normalizes_token_set() {
        let server = MockServer::start().await;
        let config = test_config().with_rest_base(server.uri());

        Mock::given(method("POST"))
            .and(path("/services/rest/auth/oauth2/v1/token"))
            .and(header_exists("authorization"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "access-1",
                "refresh_token": "refresh-1",
                "expires_in": 1800,
                "token_type": "bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let before = Utc::now();
        let tokens = exchange_code(&config, "the-code").await.unwrap();

        assert_eq!(tokens.access_token, "access-1");
        assert_eq!(tokens.refresh_token, "refresh-1");
        assert_eq!(tokens.expires_in, 1800);
        assert!(tokens.issued_at >= before);
    }

    #[tokio::test]
    async fn test_refresh_keeps_old_refresh_token_when_omitted() {
        let server = MockServer::start().await;
        let config = test_config().with_rest_base(server.uri());

        Mock::given(method("POST"))
            .and(path("/services/rest/auth/oauth2/v1/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "access-2",
                "expires_in": 3600,
                "token_type": "bearer"
            })))
            .mount(&server)
            .await;

        let tokens = refresh(&config, "refresh-old").await.unwrap();

        assert_eq!(tokens.access_token, "access-2");
        assert_eq!(tokens.refresh_token, "refresh-old");
    }

    #[tokio::test]
    async fn test_rejected_grant_surfaces_server_payload() {
        let server = MockServer::start().await;
        let config = test_config().with_rest_base(server.uri());

        Mock::given(method("POST"))
            .and(path("/services/rest/auth/oauth2/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant"
            })))
            .mount(&server)
            .await;

        let err = refresh(&config, "revoked").await.unwrap_err();
        match err {
            Error::OAuth(message) => assert!(message.contains("invalid_grant"), "{}", message),
            other => panic!("expected OAuth error, got {:?}", other),
        }
    }
}
