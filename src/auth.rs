//! Auth0 sign-in through OpenID Connect.
//!
//! Endpoints come from the provider's discovery document, the login carries
//! PKCE and a nonce, and the ID token is verified (signature against the
//! provider's JWKS, issuer, audience, expiry, nonce) before any of its claims
//! reach the session.

use std::sync::Arc;

use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, IssuerUrl, Nonce, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse,
    core::{CoreAuthenticationFlow, CoreClient, CoreProviderMetadata},
    url::Url,
};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::{
    config::AuthConfig,
    errors::{Error, Result},
    session::{PendingLogin, SignedInUser},
};

#[derive(Clone)]
pub struct Auth0Client {
    config: AuthConfig,
    http: reqwest::Client,
    metadata: Arc<OnceCell<CoreProviderMetadata>>,
}

fn oidc(err: impl std::fmt::Display) -> Error {
    Error::Oidc(err.to_string())
}

impl Auth0Client {
    pub fn new(config: AuthConfig) -> Result<Self> {
        // Following redirects on token requests opens the door to SSRF.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            config,
            http,
            metadata: Arc::new(OnceCell::new()),
        })
    }

    /// Discovery runs once, on the first login.
    async fn metadata(&self) -> Result<CoreProviderMetadata> {
        let metadata = self
            .metadata
            .get_or_try_init(|| async {
                let issuer = IssuerUrl::new(self.config.issuer_url.clone()).map_err(oidc)?;
                debug!(issuer = %issuer.as_str(), "discovering provider metadata");
                CoreProviderMetadata::discover_async(issuer, &self.http)
                    .await
                    .map_err(oidc)
            })
            .await?;
        Ok(metadata.clone())
    }

    fn credentials(&self) -> (ClientId, Option<ClientSecret>) {
        (
            ClientId::new(self.config.client_id.clone()),
            Some(ClientSecret::new(self.config.client_secret.clone())),
        )
    }

    /// Where to send the browser to start a login, plus the secrets the
    /// callback has to present again.
    pub async fn begin_login(&self, redirect_uri: &str) -> Result<(Url, PendingLogin)> {
        let (client_id, client_secret) = self.credentials();
        let client =
            CoreClient::from_provider_metadata(self.metadata().await?, client_id, client_secret)
                .set_redirect_uri(RedirectUrl::new(redirect_uri.to_string()).map_err(oidc)?);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (url, state, nonce) = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .add_scope(Scope::new("profile".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .set_pkce_challenge(pkce_challenge)
            .url();

        let pending = PendingLogin {
            state: state.secret().clone(),
            nonce: nonce.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        };
        Ok((url, pending))
    }

    /// Trades the authorization code for tokens and returns the claims of
    /// the verified ID token.
    pub async fn finish_login(
        &self,
        code: &str,
        pending: PendingLogin,
        redirect_uri: &str,
    ) -> Result<SignedInUser> {
        let (client_id, client_secret) = self.credentials();
        let client =
            CoreClient::from_provider_metadata(self.metadata().await?, client_id, client_secret)
                .set_redirect_uri(RedirectUrl::new(redirect_uri.to_string()).map_err(oidc)?);

        let token = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(oidc)?
            .set_pkce_verifier(PkceCodeVerifier::new(pending.pkce_verifier))
            .request_async(&self.http)
            .await
            .map_err(oidc)?;

        let id_token = token
            .id_token()
            .ok_or_else(|| Error::IdToken("token response has no id_token".into()))?;
        let claims = id_token
            .claims(&client.id_token_verifier(), &Nonce::new(pending.nonce))
            .map_err(|e| Error::IdToken(e.to_string()))?;

        let user = SignedInUser {
            subject: claims.subject().as_str().to_owned(),
            name: claims
                .name()
                .and_then(|name| name.get(None))
                .map(|name| name.as_str().to_owned()),
            email: claims.email().map(|email| email.as_str().to_owned()),
        };
        info!(subject = %user.subject, "login completed");
        Ok(user)
    }

    /// The provider's logout endpoint, which sends the browser back to
    /// `return_to` afterwards.
    pub fn logout_url(&self, return_to: &str) -> Result<Url> {
        let base = Url::parse(&self.config.issuer_url)
            .and_then(|issuer| issuer.join("v2/logout"))
            .map_err(|e| Error::InvalidConfig {
                key: "AUTH0_DOMAIN",
                reason: e.to_string(),
            })?;
        Url::parse_with_params(
            base.as_str(),
            &[
                ("returnTo", return_to),
                ("client_id", self.config.client_id.as_str()),
            ],
        )
        .map_err(oidc)
    }
}
