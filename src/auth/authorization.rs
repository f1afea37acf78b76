//! OAuth2/OIDC authorization-code flow with PKCE and nonce verification.
//!
//! The browser/redirect leg is external: an [`AuthorizationBroker`] takes the
//! fully-formed authorization URL, suspends until the provider redirects
//! back, and returns the code. Everything before and after that leg (request
//! binding, state/nonce checks, the token exchange) happens here.

use crate::{
    auth::{pkce, token::Session},
    config::AppConfig,
    error::{Error, Result},
};
use log::{debug, info};
#[cfg(feature = "mock")]
use mockall::automock;
use serde::Deserialize;
use trait_variant::make;
use url::Url;

/// Authorization URL plus the per-request secrets that must survive until
/// the redirect comes back.
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
}

/// What the identity provider hands back via the redirect URL.
#[derive(Clone, Debug)]
pub struct RedirectResponse {
    pub code: String,
    pub state: String,
}

/// External user-agent leg of the login: open the authorization URL and wait
/// for the redirect. Cancellation by the user surfaces as an error.
#[make(Send)]
#[cfg_attr(feature = "mock", automock)]
pub trait AuthorizationBroker {
    async fn authorize(&self, authorization_url: &str) -> anyhow::Result<RedirectResponse>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Drives the authorization-code exchange against the configured issuer.
#[derive(Clone, Default)]
pub struct AuthorizationFlow {
    http: reqwest::Client,
}

impl AuthorizationFlow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the full login sequence and yield a fresh [`Session`].
    ///
    /// Fails with [`Error::Authorization`] on user cancellation, network
    /// failure, token-exchange rejection, or a state/nonce mismatch. No
    /// partial session state escapes on failure.
    pub async fn login<Broker>(&self, broker: &Broker) -> Result<Session>
    where
        Broker: AuthorizationBroker,
    {
        let request = self.authorization_request();
        debug!("authorization request state={}", request.state);

        let redirect = broker
            .authorize(&request.url)
            .await
            .map_err(|e| Error::Authorization(format!("{e:#}")))?;

        let code = verify_redirect(&request, &redirect)?;
        let tokens = self.exchange_code(&code, &request.code_verifier).await?;
        let session = session_from_tokens(&request, tokens)?;

        info!("login succeeded");
        Ok(session)
    }

    /// Build the authorization URL with PKCE, state and nonce parameters.
    pub fn authorization_request(&self) -> AuthorizationRequest {
        let auth = &AppConfig::get().auth;
        let state = pkce::generate_state();
        let nonce = pkce::generate_nonce();
        let code_verifier = pkce::generate_code_verifier();
        let code_challenge = pkce::generate_code_challenge(&code_verifier);
        let scope = auth.scopes.join(" ");

        let mut url = Url::parse(&format!("{}/authorize", auth.issuer))
            .expect("invalid issuer url in configuration");
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &auth.client_id)
            .append_pair("redirect_uri", &auth.redirect_url)
            .append_pair("scope", &scope)
            .append_pair("audience", &auth.audience)
            .append_pair("state", &state)
            .append_pair("nonce", &nonce)
            .append_pair("code_challenge", &code_challenge)
            .append_pair("code_challenge_method", "S256");

        AuthorizationRequest {
            url: url.into(),
            state,
            nonce,
            code_verifier,
        }
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenResponse> {
        let auth = &AppConfig::get().auth;
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", auth.redirect_url.as_str()),
            ("client_id", auth.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];

        let response = self
            .http
            .post(format!("{}/oauth/token", auth.issuer))
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Authorization(format!("token exchange failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Authorization(format!(
                "token exchange rejected with status {status}: {body}"
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::Authorization(format!("invalid token response: {e}")))
    }
}

/// Check the redirect against the pending request and extract the code.
fn verify_redirect(request: &AuthorizationRequest, redirect: &RedirectResponse) -> Result<String> {
    if redirect.state != request.state {
        return Err(Error::Authorization(
            "state mismatch in authorization redirect".to_string(),
        ));
    }

    if redirect.code.is_empty() {
        return Err(Error::Authorization(
            "authorization redirect carried no code".to_string(),
        ));
    }

    Ok(redirect.code.clone())
}

/// Bind the token response back to the request (nonce check) and build the
/// session bundle.
fn session_from_tokens(request: &AuthorizationRequest, tokens: TokenResponse) -> Result<Session> {
    let claims = crate::auth::token::Claims::decode(&tokens.id_token)
        .map_err(|e| Error::Authorization(format!("undecodable id token: {e}")))?;

    if claims.nonce.as_deref() != Some(request.nonce.as_str()) {
        return Err(Error::Authorization(
            "nonce mismatch in id token".to_string(),
        ));
    }

    Ok(Session::new(
        tokens.access_token,
        tokens.id_token,
        tokens.refresh_token,
        tokens.expires_in.map(std::time::Duration::from_secs),
    ))
}
